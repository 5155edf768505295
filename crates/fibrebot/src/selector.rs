/// Represents ways to locate an element in the target application's DOM
///
/// Selectors are written as `kind:value` strings, e.g. `id:LOGIN_UX.V.R1.USERID`
/// or `xpath://button[contains(text(), 'Lab Project List')]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select by element `id` attribute (ids in this application contain dots)
    Id(String),
    /// Select using an XPath expression
    XPath(String),
    /// Select using a CSS selector
    Css(String),
    /// Select an anchor by its exact, trimmed text
    LinkText(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

/// The locator families understood by the browser engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    Id,
    XPath,
    Css,
    LinkText,
}

impl LocatorKind {
    /// Tag passed to the in-page resolver script.
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorKind::Id => "id",
            LocatorKind::XPath => "xpath",
            LocatorKind::Css => "css",
            LocatorKind::LinkText => "link",
        }
    }
}

impl Selector {
    pub fn kind(&self) -> Option<LocatorKind> {
        match self {
            Selector::Id(_) => Some(LocatorKind::Id),
            Selector::XPath(_) => Some(LocatorKind::XPath),
            Selector::Css(_) => Some(LocatorKind::Css),
            Selector::LinkText(_) => Some(LocatorKind::LinkText),
            Selector::Invalid(_) => None,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Selector::Id(v)
            | Selector::XPath(v)
            | Selector::Css(v)
            | Selector::LinkText(v)
            | Selector::Invalid(v) => v,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Selector::Invalid(_))
    }

    /// CSS equivalent, when one exists. Ids are matched with an attribute
    /// selector because the application's ids contain `.` characters.
    pub fn to_css(&self) -> Option<String> {
        match self {
            Selector::Id(id) => Some(format!("[id=\"{}\"]", id.replace('"', "\\\""))),
            Selector::Css(css) => Some(css.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}:{}", kind.as_str(), self.value()),
            None => write!(f, "invalid({})", self.value()),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Selector::Invalid("empty selector".to_string());
        }

        let (prefix, rest) = match s.split_once(':') {
            Some((p, r)) => (p.to_lowercase(), r.trim()),
            None => (String::new(), s),
        };

        let selector = match prefix.as_str() {
            "id" => Selector::Id(rest.to_string()),
            "xpath" => Selector::XPath(rest.to_string()),
            "css" => Selector::Css(rest.to_string()),
            "link" | "linktext" => Selector::LinkText(rest.to_string()),
            // Bare forms: `//div[...]` and `#id` are common enough to accept
            _ if s.starts_with("//") || s.starts_with("(//") => Selector::XPath(s.to_string()),
            _ if s.starts_with('#') => Selector::Css(s.to_string()),
            _ => {
                return Selector::Invalid(format!(
                    "unknown locator kind in '{s}' (expected id:, xpath:, css: or link:)"
                ))
            }
        };

        if selector.value().is_empty() {
            return Selector::Invalid(format!("selector '{s}' has no value"));
        }
        selector
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl From<&String> for Selector {
    fn from(s: &String) -> Self {
        Selector::from(s.as_str())
    }
}
