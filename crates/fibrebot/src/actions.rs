//! Per-category click sequences replayed on the Analysis tab
//!
//! Tables are declared as raw `(action, selector)` pairs and only become
//! usable after [`ActionTables::load`] has validated every entry. An action
//! is either `click` or `select=<option text>`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::dataset::AnalysisCategory;
use crate::dom::analysis_field;
use crate::errors::AutomationError;
use crate::selector::Selector;

/// Bumped whenever a table changes so logs show which replay ran.
pub const ACTION_TABLE_VERSION: u32 = 3;

pub const MIN_BRANCH_LEN: usize = 13;
pub const MAX_BRANCH_LEN: usize = 26;

type RawTable = &'static [(&'static str, &'static str)];

const NAD_ACTIONS: RawTable = &[
    ("select=No Asbestos Detected", analysis_field!("RESULT")),
    ("click", analysis_field!("STEREO_EXAMINED.CHECKBOX")),
    ("select=Homogeneous", analysis_field!("SAMPLE_TEXTURE")),
    ("select=Grey", analysis_field!("SAMPLE_COLOUR")),
    ("click", analysis_field!("ORGANIC_FIBRES.CHECKBOX")),
    ("select=Trace", analysis_field!("ORGANIC_FIBRES.AMOUNT")),
    ("click", analysis_field!("MMMF.CHECKBOX")),
    ("select=None Detected", analysis_field!("MMMF.AMOUNT")),
    ("click", analysis_field!("PLM_EXAMINED.CHECKBOX")),
    ("select=1.550", analysis_field!("RI_LIQUID")),
    ("click", analysis_field!("NO_RESPIRABLE_FIBRES.CHECKBOX")),
    ("select=Analyst", analysis_field!("REPORTED_BY")),
    ("click", analysis_field!("RESULT_CONFIRMED.CHECKBOX")),
    ("click", analysis_field!("APPLY_RESULT.BUTTON")),
];

const CHRYSOTILE_ACTIONS: RawTable = &[
    ("select=Asbestos Detected", analysis_field!("RESULT")),
    ("click", analysis_field!("STEREO_EXAMINED.CHECKBOX")),
    ("select=Heterogeneous", analysis_field!("SAMPLE_TEXTURE")),
    ("select=Grey", analysis_field!("SAMPLE_COLOUR")),
    ("click", analysis_field!("CHRYSOTILE.CHECKBOX")),
    ("select=Wavy fibre bundles", analysis_field!("CHRYSOTILE.MORPHOLOGY")),
    ("select=Colourless", analysis_field!("CHRYSOTILE.COLOUR")),
    ("select=None", analysis_field!("CHRYSOTILE.PLEOCHROISM")),
    ("select=Low", analysis_field!("CHRYSOTILE.BIREFRINGENCE")),
    ("select=Parallel", analysis_field!("CHRYSOTILE.EXTINCTION")),
    ("select=Positive (length slow)", analysis_field!("CHRYSOTILE.ELONGATION")),
    ("click", analysis_field!("PLM_EXAMINED.CHECKBOX")),
    ("select=1.550", analysis_field!("RI_LIQUID")),
    ("select=Magenta", analysis_field!("CHRYSOTILE.DS_PARALLEL")),
    ("select=Blue", analysis_field!("CHRYSOTILE.DS_PERPENDICULAR")),
    ("click", analysis_field!("ORGANIC_FIBRES.CHECKBOX")),
    ("select=Trace", analysis_field!("ORGANIC_FIBRES.AMOUNT")),
    ("select=Analyst", analysis_field!("REPORTED_BY")),
    ("click", analysis_field!("RESULT_CONFIRMED.CHECKBOX")),
    ("click", analysis_field!("APPLY_RESULT.BUTTON")),
];

const AMOSITE_ACTIONS: RawTable = &[
    ("select=Asbestos Detected", analysis_field!("RESULT")),
    ("click", analysis_field!("STEREO_EXAMINED.CHECKBOX")),
    ("select=Heterogeneous", analysis_field!("SAMPLE_TEXTURE")),
    ("select=Brown", analysis_field!("SAMPLE_COLOUR")),
    ("click", analysis_field!("AMOSITE.CHECKBOX")),
    ("select=Straight fibres", analysis_field!("AMOSITE.MORPHOLOGY")),
    ("select=Colourless to brown", analysis_field!("AMOSITE.COLOUR")),
    ("select=Weak", analysis_field!("AMOSITE.PLEOCHROISM")),
    ("select=Moderate", analysis_field!("AMOSITE.BIREFRINGENCE")),
    ("select=Parallel", analysis_field!("AMOSITE.EXTINCTION")),
    ("select=Positive (length slow)", analysis_field!("AMOSITE.ELONGATION")),
    ("click", analysis_field!("PLM_EXAMINED.CHECKBOX")),
    ("select=1.680", analysis_field!("RI_LIQUID")),
    ("select=Gold", analysis_field!("AMOSITE.DS_PARALLEL")),
    ("select=Blue", analysis_field!("AMOSITE.DS_PERPENDICULAR")),
    ("click", analysis_field!("MMMF.CHECKBOX")),
    ("select=Trace", analysis_field!("MMMF.AMOUNT")),
    ("click", analysis_field!("ORGANIC_FIBRES.CHECKBOX")),
    ("select=Trace", analysis_field!("ORGANIC_FIBRES.AMOUNT")),
    ("select=Analyst", analysis_field!("REPORTED_BY")),
    ("click", analysis_field!("RESULT_CONFIRMED.CHECKBOX")),
    ("click", analysis_field!("APPLY_RESULT.BUTTON")),
];

const CROCIDOLITE_ACTIONS: RawTable = &[
    ("select=Asbestos Detected", analysis_field!("RESULT")),
    ("click", analysis_field!("STEREO_EXAMINED.CHECKBOX")),
    ("select=Heterogeneous", analysis_field!("SAMPLE_TEXTURE")),
    ("select=Blue-grey", analysis_field!("SAMPLE_COLOUR")),
    ("click", analysis_field!("CROCIDOLITE.CHECKBOX")),
    ("select=Straight to curved fibres", analysis_field!("CROCIDOLITE.MORPHOLOGY")),
    ("select=Blue", analysis_field!("CROCIDOLITE.COLOUR")),
    ("select=Blue / grey", analysis_field!("CROCIDOLITE.PLEOCHROISM")),
    ("select=Low (masked by colour)", analysis_field!("CROCIDOLITE.BIREFRINGENCE")),
    ("select=Parallel", analysis_field!("CROCIDOLITE.EXTINCTION")),
    ("select=Negative (length fast)", analysis_field!("CROCIDOLITE.ELONGATION")),
    ("click", analysis_field!("PLM_EXAMINED.CHECKBOX")),
    ("select=1.700", analysis_field!("RI_LIQUID")),
    ("select=Red-magenta", analysis_field!("CROCIDOLITE.DS_PARALLEL")),
    ("select=Blue-magenta", analysis_field!("CROCIDOLITE.DS_PERPENDICULAR")),
    ("click", analysis_field!("CHRYSOTILE_SCREEN.CHECKBOX")),
    ("select=Not Detected", analysis_field!("CHRYSOTILE_SCREEN.RESULT")),
    ("click", analysis_field!("ORGANIC_FIBRES.CHECKBOX")),
    ("select=Trace", analysis_field!("ORGANIC_FIBRES.AMOUNT")),
    ("select=Analyst", analysis_field!("REPORTED_BY")),
    ("click", analysis_field!("RESULT_CONFIRMED.CHECKBOX")),
    ("click", analysis_field!("APPLY_RESULT.BUTTON")),
];

/// The categories that have a replay branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Nad,
    Chrysotile,
    Amosite,
    Crocidolite,
}

impl Branch {
    pub const ALL: [Branch; 4] = [
        Branch::Nad,
        Branch::Chrysotile,
        Branch::Amosite,
        Branch::Crocidolite,
    ];

    /// Map a sheet category to its branch. `Unknown` has none.
    pub fn for_category(category: &AnalysisCategory) -> Result<Self, AutomationError> {
        match category {
            AnalysisCategory::Nad => Ok(Branch::Nad),
            AnalysisCategory::Chrysotile => Ok(Branch::Chrysotile),
            AnalysisCategory::Amosite => Ok(Branch::Amosite),
            AnalysisCategory::Crocidolite => Ok(Branch::Crocidolite),
            AnalysisCategory::Unknown(raw) => Err(AutomationError::Classification(raw.clone())),
        }
    }

    fn raw(&self) -> RawTable {
        match self {
            Branch::Nad => NAD_ACTIONS,
            Branch::Chrysotile => CHRYSOTILE_ACTIONS,
            Branch::Amosite => AMOSITE_ACTIONS,
            Branch::Crocidolite => CROCIDOLITE_ACTIONS,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Branch::Nad => "NAD",
            Branch::Chrysotile => "Chrysotile",
            Branch::Amosite => "Amosite",
            Branch::Crocidolite => "Crocidolite",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Click,
    /// Pick the option with this visible text
    Select(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiAction {
    pub kind: ActionKind,
    pub selector: Selector,
}

impl fmt::Display for UiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Click => write!(f, "click {}", self.selector),
            ActionKind::Select(option) => write!(f, "select '{}' in {}", option, self.selector),
        }
    }
}

impl UiAction {
    fn parse(action: &str, selector: &str) -> Result<Self, String> {
        let selector = Selector::from(selector);
        if let Selector::Invalid(reason) = &selector {
            return Err(reason.clone());
        }
        let kind = match action.split_once('=') {
            None if action == "click" => ActionKind::Click,
            Some(("select", option)) if !option.trim().is_empty() => {
                ActionKind::Select(option.trim().to_string())
            }
            Some(("select", _)) => return Err("select action without option text".to_string()),
            _ => return Err(format!("unknown action '{action}'")),
        };
        Ok(Self { kind, selector })
    }
}

/// Validated branch tables.
#[derive(Debug, Clone)]
pub struct ActionTables {
    branches: HashMap<Branch, Vec<UiAction>>,
}

impl ActionTables {
    /// Parse and validate the built-in tables.
    pub fn load() -> Result<Self, AutomationError> {
        let mut branches = HashMap::new();
        for branch in Branch::ALL {
            branches.insert(branch, Self::validate(branch, branch.raw())?);
        }
        Ok(Self { branches })
    }

    fn validate(branch: Branch, raw: RawTable) -> Result<Vec<UiAction>, AutomationError> {
        if !(MIN_BRANCH_LEN..=MAX_BRANCH_LEN).contains(&raw.len()) {
            return Err(AutomationError::InvalidArgument(format!(
                "{branch} table has {} actions, expected {MIN_BRANCH_LEN}-{MAX_BRANCH_LEN}",
                raw.len()
            )));
        }
        raw.iter()
            .enumerate()
            .map(|(i, (action, selector))| {
                UiAction::parse(action, selector).map_err(|reason| {
                    AutomationError::InvalidSelector(format!(
                        "{branch} table entry {}: {reason}",
                        i + 1
                    ))
                })
            })
            .collect()
    }

    pub fn branch(&self, branch: Branch) -> &[UiAction] {
        self.branches
            .get(&branch)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every distinct selector any branch touches, in branch order.
    pub fn selectors(&self) -> Vec<&Selector> {
        let mut seen = HashSet::new();
        Branch::ALL
            .iter()
            .flat_map(|branch| self.branch(*branch))
            .map(|action| &action.selector)
            .filter(|selector| seen.insert(*selector))
            .collect()
    }
}
