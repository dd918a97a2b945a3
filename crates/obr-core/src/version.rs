//! Bundle version parsing, comparison, and range matching.
//!
//! Versions have the form `major.minor.micro.qualifier`:
//! - Up to three numeric components, missing ones default to `0`
//! - An optional qualifier made of `[A-Za-z0-9_-]`
//! - Ordering compares major, minor, micro numerically, then the qualifier
//!   lexicographically (an empty qualifier sorts first)

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use obr_util::errors::{ObrError, ObrResult};

/// A parsed bundle version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    /// The empty version `0.0.0`.
    pub const fn empty() -> Self {
        Self {
            major: 0,
            minor: 0,
            micro: 0,
            qualifier: String::new(),
        }
    }

    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: &str) -> Self {
        self.qualifier = qualifier.to_string();
        self
    }

    /// Parse a version string. The empty string parses to `0.0.0`.
    pub fn parse(input: &str) -> ObrResult<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Ok(Self::empty());
        }

        let mut parts = s.splitn(4, '.');
        let major = parse_component(input, parts.next(), "major")?;
        let minor = parse_component(input, parts.next(), "minor")?;
        let micro = parse_component(input, parts.next(), "micro")?;
        let qualifier = match parts.next() {
            Some(q) => {
                if q.is_empty() {
                    return Err(ObrError::version_syntax(input, "empty qualifier"));
                }
                if let Some(bad) = q
                    .chars()
                    .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
                {
                    return Err(ObrError::version_syntax(
                        input,
                        format!("invalid character '{bad}' in qualifier"),
                    ));
                }
                q.to_string()
            }
            None => String::new(),
        };

        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

fn parse_component(input: &str, part: Option<&str>, name: &str) -> ObrResult<u64> {
    match part {
        None => Ok(0),
        Some(p) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => p
            .parse::<u64>()
            .map_err(|e| ObrError::version_syntax(input, format!("{name} component: {e}"))),
        Some(p) => Err(ObrError::version_syntax(
            input,
            format!("invalid {name} component '{p}'"),
        )),
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ObrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A version interval.
///
/// Supports: `[1.0,2.0)`, `(1.0,2.0]`, `[1.0,)` (unbounded), and a bare
/// `1.0`, which means "at least 1.0".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub floor: Version,
    pub floor_inclusive: bool,
    /// `None` means unbounded above.
    pub ceiling: Option<Version>,
    pub ceiling_inclusive: bool,
}

impl VersionRange {
    /// `[version, ∞)`
    pub fn at_least(version: Version) -> Self {
        Self {
            floor: version,
            floor_inclusive: true,
            ceiling: None,
            ceiling_inclusive: false,
        }
    }

    /// `[version, version]`
    pub fn exact(version: Version) -> Self {
        Self {
            floor: version.clone(),
            floor_inclusive: true,
            ceiling: Some(version),
            ceiling_inclusive: true,
        }
    }

    /// Parse a range string.
    pub fn parse(spec: &str) -> ObrResult<Self> {
        let s = spec.trim();
        let floor_inclusive = match s.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Ok(Self::at_least(Version::parse(s)?)),
        };
        let ceiling_inclusive = match s.chars().last() {
            Some(']') if s.len() > 1 => true,
            Some(')') if s.len() > 1 => false,
            _ => {
                return Err(ObrError::version_syntax(
                    spec,
                    "range must end with ']' or ')'",
                ))
            }
        };

        let inner = &s[1..s.len() - 1];
        let Some((floor, ceiling)) = inner.split_once(',') else {
            return Err(ObrError::version_syntax(
                spec,
                "range must contain ',' between floor and ceiling",
            ));
        };
        let floor = floor.trim();
        let ceiling = ceiling.trim();
        if floor.is_empty() {
            return Err(ObrError::version_syntax(spec, "range floor is missing"));
        }
        let floor = Version::parse(floor)?;
        let ceiling = if ceiling.is_empty() {
            None
        } else {
            Some(Version::parse(ceiling)?)
        };

        if let Some(ref c) = ceiling {
            if *c < floor {
                return Err(ObrError::version_syntax(spec, "ceiling is below floor"));
            }
        }

        Ok(Self {
            floor,
            floor_inclusive,
            ceiling,
            ceiling_inclusive,
        })
    }

    /// Check whether a version lies inside this range.
    pub fn contains(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            *version >= self.floor
        } else {
            *version > self.floor
        };
        if !above_floor {
            return false;
        }
        match self.ceiling {
            None => true,
            Some(ref ceiling) if self.ceiling_inclusive => version <= ceiling,
            Some(ref ceiling) => version < ceiling,
        }
    }

    /// Render the range as an LDAP filter over `attr`.
    ///
    /// `[1.0,2.0)` over `version` becomes `(&(version>=1.0.0)(!(version>=2.0.0)))`.
    pub fn to_filter(&self, attr: &str) -> String {
        let mut clauses = Vec::new();
        if self.floor_inclusive {
            if self.floor != Version::empty() {
                clauses.push(format!("({attr}>={})", self.floor));
            }
        } else {
            clauses.push(format!("(!({attr}<={}))", self.floor));
        }
        if let Some(ref ceiling) = self.ceiling {
            if self.ceiling_inclusive {
                clauses.push(format!("({attr}<={ceiling})"));
            } else {
                clauses.push(format!("(!({attr}>={ceiling}))"));
            }
        }
        match clauses.len() {
            0 => format!("({attr}=*)"),
            1 => clauses.remove(0),
            _ => format!("(&{})", clauses.concat()),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ceiling {
            None if self.floor_inclusive => write!(f, "{}", self.floor),
            None => write!(f, "({},)", self.floor),
            Some(ref ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' },
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = ObrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
