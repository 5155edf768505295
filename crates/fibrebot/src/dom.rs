//! The target application's DOM contract
//!
//! Every element the workflow touches is named here. The application
//! renders ids of the form `<view>.<V|S|TD>.R<row>.<FIELD>`; a rename on
//! its side surfaces as a wait timeout on ours.

macro_rules! project_list {
    ($field:literal) => {
        concat!("id:TBI_LAB_PROJEC_162148FIEL.", $field)
    };
}

macro_rules! record_field {
    ($field:literal) => {
        concat!(
            "id:TBI_LAB_PROJEC_162148FIEL_FIBRE_ANAL_BLBA_FIBRE_ANALYSIS_UX.V.R1.",
            $field
        )
    };
}

/// Ids on the Analysis tab of a fibre analysis record.
macro_rules! analysis_field {
    ($field:literal) => {
        concat!(
            "id:TBI_LAB_PROJEC_162148FIEL_FIBRE_ANAL_BLBA_FIBRE_ANALYSIS_UX.V.R1.ANALYSIS.",
            $field
        )
    };
}

pub(crate) use analysis_field;

// Login
pub const LOGIN_USERNAME: &str = "id:LOGIN_UX.V.R1.USERID";
pub const LOGIN_PASSWORD: &str = "id:LOGIN_UX.V.R1.PASSWORD";
pub const LOGIN_SUBMIT: &str = "id:LOGIN_UX.V.R1.LOGIN_BTN";
pub const POST_LOGIN_URL_FRAGMENT: &str = "TabbedUI_MainMenu";

// Menus
pub const LAB_BUTTON: &str = "id:tb1FRAME_12.A";
pub const LAB_PROJECT_LIST_BUTTON: &str =
    "xpath://button[contains(text(), 'Lab Project List')]";
/// Full-page lock the application raises while a request is in flight
pub const UI_LOCK_OVERLAY: &str = "id:AUILockUIPage";

// Project search
pub const CLEAR_SEARCH_LINK: &str = "link:Clear Search Criteria";
pub const PROJECT_SEARCH_INPUT: &str = project_list!("S.PROJECT_NUMBER");
pub const PROJECT_SEARCH_BUTTON: &str = project_list!("SEARCHBTN");
/// First result row's project number, rendered as `<prefix>-<number>`
pub const PROJECT_ECHO: &str = project_list!("V.R1.PROJECT_NUMBER");
pub const VIEW_FIBRE_ANALYSIS_BUTTON: &str = project_list!("V.R1._UNBOUND_BUTTON_1");
pub const CREATING_RECORDS_INDICATOR: &str =
    "xpath://div[contains(text(), 'Creating Fibre Analysis records')]";

// Fibre analysis records
pub const RECORD_COUNT: &str = "id:TBI_LAB_PROJEC_162148FIEL_FIBRE_ANAL_BLBA.RECORDCOUNT.TOP";
pub const NEXT_RECORD: &str = record_field!("FOOTER_CONTROLS.Next.ICON");
pub const SAVE_RECORD: &str = record_field!("FOOTER_CONTROLS.Save.ICON");

/// Where the open record's sample number may be rendered, most reliable
/// first. The field id has moved between application releases.
pub const SAMPLE_ID_CANDIDATES: &[&str] = &[
    record_field!("SAMPLE_ID"),
    record_field!("SAMPLE_NUMBER"),
    record_field!("SAMPLE_NO"),
    "xpath://span[contains(@id, 'FIBRE_ANALYSIS_UX.V.R1.') and contains(@id, 'SAMPLE')]",
];

pub const SAMPLE_SIZE_FIELD: &str = record_field!("SAMPLE_SIZE");
pub const START_TIME_FIELD: &str = record_field!("ANALYSIS_START_TIME");
pub const END_TIME_FIELD: &str = record_field!("ANALYSIS_END_TIME");
pub const SURVEYOR_ASSESSMENT_FIELD: &str = record_field!("SURVEYOR_ASSESSMENT");
pub const LAB_ASSESSMENT_SELECT: &str = record_field!("LAB_ASSESSMENT");

pub const ANALYSIS_TAB: &str = "xpath://a[normalize-space(text())='Analysis']";
pub const ANALYSIS_TAB_BODY: &str = analysis_field!("BODY");

/// Dismissal control of the application's generic modal dialog
pub const POPUP_OK_BUTTON: &str = "xpath://div[contains(@class, 'modal')]//button[normalize-space(text())='OK']";
