use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Maps host-side member names (struct fields, drop members, filters) onto
/// the names templates use, and decides when two template-side keys refer to
/// the same thing.
pub trait NamingConvention: Send + Sync + fmt::Debug {
    /// Converts a host-side declared name into its template-side spelling.
    fn member_name<'a>(&self, declared: &'a str) -> Cow<'a, str>;

    /// Normalizes a key before it is stored in a scope.
    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str>;

    fn matches(&self, a: &str, b: &str) -> bool;
}

static UPPERCASE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid regex"));
static LOWER_TO_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z\d])([A-Z])").expect("valid regex"));

/// `ProductID` becomes `product_id`; keys compare case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubyNamingConvention;

impl NamingConvention for RubyNamingConvention {
    fn member_name<'a>(&self, declared: &'a str) -> Cow<'a, str> {
        if !declared.chars().any(|c| c.is_ascii_uppercase()) {
            return Cow::Borrowed(declared);
        }
        let split = UPPERCASE_RUN.replace_all(declared, "${1}_${2}");
        let split = LOWER_TO_UPPER.replace_all(&split, "${1}_${2}");
        Cow::Owned(split.to_lowercase())
    }

    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if key.chars().any(char::is_uppercase) {
            Cow::Owned(key.to_lowercase())
        } else {
            Cow::Borrowed(key)
        }
    }

    fn matches(&self, a: &str, b: &str) -> bool {
        a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
    }
}

/// Names are used exactly as declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct CSharpNamingConvention;

impl NamingConvention for CSharpNamingConvention {
    fn member_name<'a>(&self, declared: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(declared)
    }

    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(key)
    }

    fn matches(&self, a: &str, b: &str) -> bool {
        a == b
    }
}
