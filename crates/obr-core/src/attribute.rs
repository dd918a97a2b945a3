//! Typed capability attribute values.

use std::collections::BTreeMap;
use std::fmt;

use crate::version::Version;

/// A single attribute value carried by a capability.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Long(i64),
    Double(f64),
    Version(Version),
    Uri(String),
    List(Vec<AttributeValue>),
}

/// Attribute map of a capability. Keys keep their declared spelling;
/// lookups through [`lookup`] ignore ASCII case.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Case-insensitive attribute lookup.
pub fn lookup<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a AttributeValue> {
    attrs.get(key).or_else(|| {
        attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

impl AttributeValue {
    /// Build a value from its textual form and a declared type name.
    ///
    /// Recognised types: `string`, `version`, `long`, `double`, `uri`,
    /// `set` (comma-separated strings) and `List<String|Version|Long|Double>`.
    /// Unknown types and unparseable numbers fall back to a plain string.
    /// An untyped attribute named `version` that parses as a version is
    /// stored as [`AttributeValue::Version`].
    pub fn typed(name: &str, type_name: Option<&str>, raw: &str) -> Self {
        let ty = type_name.map(|t| t.trim().to_ascii_lowercase());
        match ty.as_deref() {
            Some("version") => Version::parse(raw)
                .map(Self::Version)
                .unwrap_or_else(|_| Self::String(raw.to_string())),
            Some("long") => raw
                .trim()
                .parse()
                .map(Self::Long)
                .unwrap_or_else(|_| Self::String(raw.to_string())),
            Some("double") => raw
                .trim()
                .parse()
                .map(Self::Double)
                .unwrap_or_else(|_| Self::String(raw.to_string())),
            Some("uri") => Self::Uri(raw.to_string()),
            Some("set") | Some("list<string>") | Some("list") => Self::List(
                split_list(raw)
                    .map(|s| Self::String(s.to_string()))
                    .collect(),
            ),
            Some("list<version>") => Self::List(
                split_list(raw)
                    .map(|s| Self::typed(name, Some("version"), s))
                    .collect(),
            ),
            Some("list<long>") => Self::List(
                split_list(raw)
                    .map(|s| Self::typed(name, Some("long"), s))
                    .collect(),
            ),
            Some("list<double>") => Self::List(
                split_list(raw)
                    .map(|s| Self::typed(name, Some("double"), s))
                    .collect(),
            ),
            Some("string") => Self::String(raw.to_string()),
            _ if is_version_key(name) => Version::parse(raw)
                .map(Self::Version)
                .unwrap_or_else(|_| Self::String(raw.to_string())),
            _ => Self::String(raw.to_string()),
        }
    }

    /// The type name used when writing the value back to XML.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Self::String(_) => None,
            Self::Long(_) => Some("long"),
            Self::Double(_) => Some("double"),
            Self::Version(_) => Some("version"),
            Self::Uri(_) => Some("uri"),
            Self::List(items) => Some(match items.first() {
                Some(Self::Version(_)) => "List<Version>",
                Some(Self::Long(_)) => "List<Long>",
                Some(Self::Double(_)) => "List<Double>",
                _ => "set",
            }),
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Self::Version(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Uri(s) => Some(s),
            _ => None,
        }
    }

    /// The value flattened into strings: one entry per list element.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().flat_map(|i| i.to_strings()).collect(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Uri(s) => f.write_str(s),
            Self::Long(n) => write!(f, "{n}"),
            Self::Double(n) => write!(f, "{n}"),
            Self::Version(v) => write!(f, "{v}"),
            Self::List(items) => {
                let joined: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Version> for AttributeValue {
    fn from(v: Version) -> Self {
        Self::Version(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        Self::Double(n)
    }
}

/// Whether an attribute name denotes a version field.
pub fn is_version_key(name: &str) -> bool {
    name.eq_ignore_ascii_case("version") || name.eq_ignore_ascii_case("bundle-version")
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}
