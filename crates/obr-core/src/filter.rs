//! LDAP-style filter expressions evaluated against capability attributes.
//!
//! ```text
//! filter     = "(" filtercomp ")"
//! filtercomp = "&" filter* | "|" filter* | "!" filter | item
//! item       = attr ("=" | "~=" | ">=" | "<=" | ":<*" | ":*>") value
//!            | attr "=*"
//! ```
//!
//! Values escape `\`, `(`, `)` and `*` with a backslash. An unescaped `*` in
//! an `=` item turns it into a substring match. `(&)` and `(|)` are accepted
//! as the constant true and false filters.

use std::fmt;
use std::str::FromStr;

use obr_util::errors::{ObrError, ObrResult};

use crate::attribute::{self, AttributeValue, Attributes};
use crate::version::Version;

/// A parsed filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// True iff every child is true (an empty list is true).
    And(Vec<Filter>),
    /// True iff any child is true (an empty list is false).
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Item(SimpleItem),
}

/// Comparison performed by a [`SimpleItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
    Substring,
    Present,
    Subset,
    Superset,
}

/// A leaf comparison `(attr OP value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleItem {
    attr: String,
    filter_type: FilterType,
    value: String,
    pattern: Option<SubstringPattern>,
    version: Option<Version>,
}

impl SimpleItem {
    /// Build an item. For [`FilterType::Substring`] the value is the escaped
    /// pattern (`foo*bar`); for every other type it is the literal value.
    pub fn new(attr: &str, filter_type: FilterType, value: &str) -> Self {
        let pattern = (filter_type == FilterType::Substring).then(|| SubstringPattern::parse(value));
        Self::build(attr, filter_type, value.to_string(), pattern)
    }

    fn build(
        attr: &str,
        filter_type: FilterType,
        value: String,
        pattern: Option<SubstringPattern>,
    ) -> Self {
        let version = match filter_type {
            FilterType::Equal | FilterType::Approx | FilterType::GreaterEq | FilterType::LessEq => {
                Version::parse(&value).ok()
            }
            _ => None,
        };
        Self {
            attr: attr.to_string(),
            filter_type,
            value,
            pattern,
            version,
        }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// The comparison value (the escaped pattern for substring items).
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn pattern(&self) -> Option<&SubstringPattern> {
        self.pattern.as_ref()
    }

    /// Evaluate against an attribute map. Absent keys never match.
    pub fn matches(&self, attrs: &Attributes) -> bool {
        let Some(prop) = attribute::lookup(attrs, &self.attr) else {
            return false;
        };
        match self.filter_type {
            FilterType::Present => true,
            FilterType::Subset | FilterType::Superset => self.compare_sets(prop),
            _ => self.compare(prop),
        }
    }

    fn compare(&self, prop: &AttributeValue) -> bool {
        match prop {
            AttributeValue::List(items) => items.iter().any(|item| self.compare(item)),
            AttributeValue::String(s) | AttributeValue::Uri(s) => self.compare_string(s),
            AttributeValue::Version(v) => self.compare_version(v),
            AttributeValue::Long(n) => match self.value.trim().parse::<i64>() {
                Ok(other) => self.compare_ordered(n, &other),
                Err(_) => false,
            },
            AttributeValue::Double(n) => match self.value.trim().parse::<f64>() {
                Ok(other) => match self.filter_type {
                    FilterType::Equal | FilterType::Approx => *n == other,
                    FilterType::GreaterEq => *n >= other,
                    FilterType::LessEq => *n <= other,
                    _ => false,
                },
                Err(_) => false,
            },
        }
    }

    fn compare_ordered<T: Ord>(&self, left: &T, right: &T) -> bool {
        match self.filter_type {
            FilterType::Equal | FilterType::Approx => left == right,
            FilterType::GreaterEq => left >= right,
            FilterType::LessEq => left <= right,
            _ => false,
        }
    }

    fn compare_version(&self, v: &Version) -> bool {
        match self.version {
            Some(ref other) => self.compare_ordered(v, other),
            None => false,
        }
    }

    fn compare_string(&self, s: &str) -> bool {
        if attribute::is_version_key(&self.attr) && self.version.is_some() {
            if let Ok(v) = Version::parse(s) {
                return self.compare_version(&v);
            }
        }
        match self.filter_type {
            FilterType::Equal => s == self.value,
            FilterType::Approx => approx(s) == approx(&self.value),
            FilterType::GreaterEq => s >= self.value.as_str(),
            FilterType::LessEq => s <= self.value.as_str(),
            FilterType::Substring => self
                .pattern
                .as_ref()
                .is_some_and(|pattern| pattern.matches(s)),
            _ => false,
        }
    }

    fn compare_sets(&self, prop: &AttributeValue) -> bool {
        let held: Vec<String> = prop
            .to_strings()
            .iter()
            .flat_map(|s| split_set(s))
            .collect();
        let wanted: Vec<String> = split_set(&self.value);
        match self.filter_type {
            FilterType::Subset => held.iter().all(|h| wanted.contains(h)),
            FilterType::Superset => wanted.iter().all(|w| held.contains(w)),
            _ => false,
        }
    }
}

fn split_set(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whitespace-insensitive, case-insensitive normal form for `~=`.
fn approx(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A `*`-separated substring pattern.
///
/// The first piece anchors at the start unless the pattern starts with `*`,
/// the last piece anchors at the end unless the pattern ends with `*`, and
/// interior pieces must occur in order without overlapping. Empty interior
/// pieces (as produced by `**`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringPattern {
    pieces: Vec<String>,
}

impl SubstringPattern {
    /// Split an escaped pattern on unescaped `*`.
    pub fn parse(pattern: &str) -> Self {
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => pieces.push(std::mem::take(&mut current)),
                '\\' => current.push(chars.next().unwrap_or('\\')),
                other => current.push(other),
            }
        }
        pieces.push(current);
        Self { pieces }
    }

    fn from_pieces(pieces: Vec<String>) -> Self {
        Self { pieces }
    }

    /// The literal pieces between `*` markers, unescaped.
    pub fn pieces(&self) -> &[String] {
        &self.pieces
    }

    pub fn matches(&self, input: &str) -> bool {
        let n = self.pieces.len();
        if n == 1 {
            return input == self.pieces[0];
        }

        let first = &self.pieces[0];
        let last = &self.pieces[n - 1];
        let mut pos = 0;

        if !first.is_empty() {
            if !input.starts_with(first.as_str()) {
                return false;
            }
            pos = first.len();
        }

        for piece in &self.pieces[1..n - 1] {
            if piece.is_empty() {
                continue;
            }
            match input[pos..].find(piece.as_str()) {
                Some(idx) => pos += idx + piece.len(),
                None => return false,
            }
        }

        last.is_empty() || (input.len() >= pos + last.len() && input.ends_with(last.as_str()))
    }
}

impl fmt::Display for SubstringPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                f.write_str("*")?;
            }
            f.write_str(&escape(piece))?;
        }
        Ok(())
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '(' | ')' | '*') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Filter {
    /// Parse a filter string.
    pub fn parse(input: &str) -> ObrResult<Self> {
        Parser::new(input).parse()
    }

    /// The filter that matches every attribute map.
    pub fn match_all() -> Self {
        Self::And(Vec::new())
    }

    /// Evaluate against an attribute map.
    pub fn matches(&self, attrs: &Attributes) -> bool {
        match self {
            Self::And(children) => children.iter().all(|c| c.matches(attrs)),
            Self::Or(children) => children.iter().any(|c| c.matches(attrs)),
            Self::Not(child) => !child.matches(attrs),
            Self::Item(item) => item.matches(attrs),
        }
    }

    pub fn children(&self) -> &[Filter] {
        match self {
            Self::And(children) | Self::Or(children) => children,
            Self::Not(child) => std::slice::from_ref(child.as_ref()),
            Self::Item(_) => &[],
        }
    }

    pub fn as_item(&self) -> Option<&SimpleItem> {
        match self {
            Self::Item(item) => Some(item),
            _ => None,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) => {
                f.write_str("(&")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
            Self::Or(children) => {
                f.write_str("(|")?;
                for c in children {
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
            Self::Not(child) => write!(f, "(!{child})"),
            Self::Item(item) => write!(f, "{item}"),
        }
    }
}

impl fmt::Display for SimpleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attr = &self.attr;
        match self.filter_type {
            FilterType::Equal => write!(f, "({attr}={})", escape(&self.value)),
            FilterType::Approx => write!(f, "({attr}~={})", escape(&self.value)),
            FilterType::GreaterEq => write!(f, "({attr}>={})", escape(&self.value)),
            FilterType::LessEq => write!(f, "({attr}<={})", escape(&self.value)),
            FilterType::Present => write!(f, "({attr}=*)"),
            FilterType::Subset => write!(f, "({attr}:<*{})", escape(&self.value)),
            FilterType::Superset => write!(f, "({attr}:*>{})", escape(&self.value)),
            FilterType::Substring => match self.pattern {
                Some(ref pattern) => write!(f, "({attr}={pattern})"),
                None => write!(f, "({attr}={})", self.value),
            },
        }
    }
}

impl FromStr for Filter {
    type Err = ObrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Recursive-descent parser over byte positions of the input.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, message: &str) -> ObrError {
        ObrError::filter_syntax(self.input, self.pos, message)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    /// Next character, failing at end of input.
    fn current(&self) -> ObrResult<char> {
        self.peek().ok_or_else(|| self.error("Filter ended abruptly"))
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump(c);
        }
    }

    fn parse(mut self) -> ObrResult<Filter> {
        let filter = self.parse_filter()?;
        if self.pos != self.input.len() {
            return Err(self.error("Extraneous trailing characters"));
        }
        Ok(filter)
    }

    fn parse_filter(&mut self) -> ObrResult<Filter> {
        self.skip_whitespace();
        if self.current()? != '(' {
            return Err(self.error("Missing '('"));
        }
        self.pos += 1;

        let filter = self.parse_filtercomp()?;

        self.skip_whitespace();
        if self.current()? != ')' {
            return Err(self.error("Missing ')'"));
        }
        self.pos += 1;
        self.skip_whitespace();
        Ok(filter)
    }

    fn parse_filtercomp(&mut self) -> ObrResult<Filter> {
        self.skip_whitespace();
        match self.current()? {
            '&' => {
                self.pos += 1;
                match self.parse_group()? {
                    Some(operands) => Ok(Filter::And(operands)),
                    None => self.parse_item(),
                }
            }
            '|' => {
                self.pos += 1;
                match self.parse_group()? {
                    Some(operands) => Ok(Filter::Or(operands)),
                    None => self.parse_item(),
                }
            }
            '!' => {
                self.pos += 1;
                let lookahead = self.pos;
                self.skip_whitespace();
                if self.current()? != '(' {
                    // `!` starts an attribute name
                    self.pos = lookahead - 1;
                    return self.parse_item();
                }
                let child = self.parse_filter()?;
                Ok(Filter::Not(Box::new(child)))
            }
            _ => self.parse_item(),
        }
    }

    /// Operands of `&` / `|`. Returns `None` (with the position rewound onto
    /// the operator) when the operator is really the start of an attribute.
    fn parse_group(&mut self) -> ObrResult<Option<Vec<Filter>>> {
        let lookahead = self.pos;
        self.skip_whitespace();
        match self.current()? {
            '(' => {}
            ')' => return Ok(Some(Vec::new())),
            _ => {
                self.pos = lookahead - 1;
                return Ok(None);
            }
        }

        let mut operands = Vec::new();
        while self.peek() == Some('(') {
            operands.push(self.parse_filter()?);
        }
        Ok(Some(operands))
    }

    fn parse_item(&mut self) -> ObrResult<Filter> {
        let attr = self.parse_attr()?;
        self.skip_whitespace();

        let filter_type = if self.peek_str(":<*") {
            self.pos += 3;
            FilterType::Subset
        } else if self.peek_str(":*>") {
            self.pos += 3;
            FilterType::Superset
        } else if self.peek_str("~=") {
            self.pos += 2;
            FilterType::Approx
        } else if self.peek_str(">=") {
            self.pos += 2;
            FilterType::GreaterEq
        } else if self.peek_str("<=") {
            self.pos += 2;
            FilterType::LessEq
        } else if self.peek_str("=") {
            return self.parse_equal(&attr);
        } else {
            self.current()?;
            return Err(self.error("Invalid operator"));
        };

        let value = self.parse_value()?;
        Ok(Filter::Item(SimpleItem::build(&attr, filter_type, value, None)))
    }

    fn parse_equal(&mut self, attr: &str) -> ObrResult<Filter> {
        if self.peek_str("=*") {
            let saved = self.pos;
            self.pos += 2;
            self.skip_whitespace();
            if self.peek() == Some(')') {
                return Ok(Filter::Item(SimpleItem::build(
                    attr,
                    FilterType::Present,
                    String::new(),
                    None,
                )));
            }
            self.pos = saved;
        }
        self.pos += 1;

        let pieces = self.parse_substring()?;
        if pieces.len() == 1 {
            let value = pieces.into_iter().next().unwrap_or_default();
            return Ok(Filter::Item(SimpleItem::build(
                attr,
                FilterType::Equal,
                value,
                None,
            )));
        }
        let pattern = SubstringPattern::from_pieces(pieces);
        Ok(Filter::Item(SimpleItem::build(
            attr,
            FilterType::Substring,
            pattern.to_string(),
            Some(pattern),
        )))
    }

    fn parse_attr(&mut self) -> ObrResult<String> {
        self.skip_whitespace();
        let begin = self.pos;
        let mut end = self.pos;

        loop {
            let c = self.current()?;
            if matches!(c, '~' | '<' | '>' | '=' | '(' | ')')
                || self.peek_str(":<*")
                || self.peek_str(":*>")
            {
                break;
            }
            self.bump(c);
            if !c.is_whitespace() {
                end = self.pos;
            }
        }

        if end == begin {
            return Err(self.error("Missing attr"));
        }
        Ok(self.input[begin..end].to_string())
    }

    fn parse_value(&mut self) -> ObrResult<String> {
        let mut value = String::new();
        loop {
            match self.current()? {
                ')' => break,
                '(' => return Err(self.error("Invalid value")),
                '\\' => {
                    self.pos += 1;
                    let c = self.current()?;
                    value.push(c);
                    self.bump(c);
                }
                c => {
                    value.push(c);
                    self.bump(c);
                }
            }
        }
        if value.is_empty() {
            return Err(self.error("Missing value"));
        }
        Ok(value)
    }

    /// Literal pieces between unescaped `*`; a single piece means no wildcard.
    fn parse_substring(&mut self) -> ObrResult<Vec<String>> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        loop {
            match self.current()? {
                ')' => break,
                '(' => return Err(self.error("Invalid value")),
                '*' => {
                    pieces.push(std::mem::take(&mut current));
                    self.pos += 1;
                }
                '\\' => {
                    self.pos += 1;
                    let c = self.current()?;
                    current.push(c);
                    self.bump(c);
                }
                c => {
                    current.push(c);
                    self.bump(c);
                }
            }
        }
        pieces.push(current);
        Ok(pieces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn substring_prefix_suffix() {
        let p = SubstringPattern::parse("foo*bar");
        assert!(p.matches("foobar"));
        assert!(p.matches("foosldfjbar"));
        assert!(!p.matches("barfoo"));
    }

    #[test]
    fn substring_unanchored() {
        let p = SubstringPattern::parse("*foo*bar*");
        assert!(p.matches("foobar"));
        assert!(p.matches("foobarfoo"));
        assert!(p.matches("barfoobar"));
        assert!(p.matches("sdffoobsdfbarlj"));
        assert!(!p.matches("sdffobsdfbarlj"));
    }

    #[test]
    fn substring_pieces_do_not_overlap() {
        let p = SubstringPattern::parse("ab*ba");
        assert!(!p.matches("aba"));
        assert!(p.matches("abba"));
    }

    #[test]
    fn substring_adjacent_stars_are_one_star() {
        let p = SubstringPattern::parse("a**b");
        assert!(p.matches("ab"));
        assert!(p.matches("axxb"));
        assert!(!p.matches("ba"));
        assert!(SubstringPattern::parse("**").matches(""));
        assert!(SubstringPattern::parse("*").matches("anything"));
    }

    #[test]
    fn substring_escaped_star_is_literal() {
        let p = SubstringPattern::parse(r"a\**");
        assert_eq!(p.pieces(), &["a*".to_string(), String::new()]);
        assert!(p.matches("a*xyz"));
        assert!(!p.matches("abc"));
    }

    #[test]
    fn parse_and_composition() {
        let f = Filter::parse(
            "(&(osgi.wiring.package=org.mypackage)(version>=1.9.0)(!(version>=2.0.0)))",
        )
        .unwrap();
        let Filter::And(children) = &f else {
            panic!("expected And, got {f:?}");
        };
        assert_eq!(children.len(), 3);
        let first = children[0].as_item().unwrap();
        assert_eq!(first.attr(), "osgi.wiring.package");
        assert_eq!(first.filter_type(), FilterType::Equal);
        assert_eq!(first.value(), "org.mypackage");
        let Filter::Not(inner) = &children[2] else {
            panic!("expected Not");
        };
        let inner = inner.as_item().unwrap();
        assert_eq!(inner.attr(), "version");
        assert_eq!(inner.filter_type(), FilterType::GreaterEq);
        assert_eq!(inner.value(), "2.0.0");
    }

    #[test]
    fn parse_operators() {
        let cases = [
            ("(a=b)", FilterType::Equal),
            ("(a~=b)", FilterType::Approx),
            ("(a>=b)", FilterType::GreaterEq),
            ("(a<=b)", FilterType::LessEq),
            ("(a=*)", FilterType::Present),
            ("(a=b*)", FilterType::Substring),
            ("(a:<*b,c)", FilterType::Subset),
            ("(a:*>b)", FilterType::Superset),
        ];
        for (input, expected) in cases {
            let f = Filter::parse(input).unwrap();
            assert_eq!(f.as_item().unwrap().filter_type(), expected, "{input}");
        }
    }

    #[test]
    fn whitespace_is_tolerated() {
        let f = Filter::parse(" ( & ( a = b ) ( c>=1 ) ) ").unwrap();
        assert_eq!(f.children().len(), 2);
        let first = f.children()[0].as_item().unwrap();
        assert_eq!(first.attr(), "a");
        assert_eq!(first.value(), " b ");
    }

    #[test]
    fn syntax_errors_report_position() {
        for bad in ["", "a=b", "(a=b", "(=b)", "(a)", "(a>b)", "(a=b))", "(a>=)", "(a=(b))"] {
            let err = Filter::parse(bad).unwrap_err();
            assert!(
                matches!(err, ObrError::FilterSyntax { .. }),
                "{bad:?} gave {err}"
            );
        }
        match Filter::parse("(a=b)x").unwrap_err() {
            ObrError::FilterSyntax { position, .. } => assert_eq!(position, 5),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn empty_groups_are_constants() {
        assert!(Filter::parse("(&)").unwrap().matches(&Attributes::new()));
        assert!(!Filter::parse("(|)").unwrap().matches(&Attributes::new()));
    }

    #[test]
    fn operator_character_as_attribute_name() {
        let f = Filter::parse("(&x=1)").unwrap();
        assert_eq!(f.as_item().unwrap().attr(), "&x");
    }

    #[test]
    fn evaluate_strings_and_case_insensitive_keys() {
        let a = attrs(&[("Package", "org.foo".into())]);
        assert!(Filter::parse("(package=org.foo)").unwrap().matches(&a));
        assert!(!Filter::parse("(package=org.bar)").unwrap().matches(&a));
        assert!(Filter::parse("(package>=org.bar)").unwrap().matches(&a));
        assert!(Filter::parse("(package~= ORG.FOO )").unwrap().matches(&a));
        assert!(Filter::parse("(package=org.*)").unwrap().matches(&a));
        assert!(!Filter::parse("(missing=*)").unwrap().matches(&a));
        assert!(!Filter::parse("(missing=o*)").unwrap().matches(&a));
        assert!(Filter::parse("(!(missing=x))").unwrap().matches(&a));
    }

    #[test]
    fn evaluate_versions() {
        let a = attrs(&[("version", Version::new(1, 9, 0).into())]);
        assert!(Filter::parse("(version>=1.9.0)").unwrap().matches(&a));
        assert!(Filter::parse("(version=1.9)").unwrap().matches(&a));
        assert!(!Filter::parse("(version>=1.10)").unwrap().matches(&a));
        assert!(Filter::parse("(version<=1.10)").unwrap().matches(&a));
        assert!(!Filter::parse("(version>=not-a-version)").unwrap().matches(&a));
    }

    #[test]
    fn string_version_field_compares_as_version() {
        let a = attrs(&[("version", "1.10.0".into())]);
        // lexicographically "1.10.0" < "1.9.0"
        assert!(Filter::parse("(version>=1.9.0)").unwrap().matches(&a));
        let b = attrs(&[("name", "1.10.0".into())]);
        assert!(!Filter::parse("(name>=1.9.0)").unwrap().matches(&b));
    }

    #[test]
    fn evaluate_numbers_and_type_mismatch() {
        let a = attrs(&[("size", AttributeValue::Long(100)), ("ratio", 0.5.into())]);
        assert!(Filter::parse("(size>=99)").unwrap().matches(&a));
        assert!(Filter::parse("(size<= 100 )").unwrap().matches(&a));
        assert!(!Filter::parse("(size>=abc)").unwrap().matches(&a));
        assert!(!Filter::parse("(size=1*)").unwrap().matches(&a));
        assert!(Filter::parse("(ratio<=0.75)").unwrap().matches(&a));
    }

    #[test]
    fn evaluate_lists_match_any_element() {
        let a = attrs(&[(
            "objectClass",
            AttributeValue::List(vec!["org.A".into(), "org.B".into()]),
        )]);
        assert!(Filter::parse("(objectclass=org.B)").unwrap().matches(&a));
        assert!(!Filter::parse("(objectclass=org.C)").unwrap().matches(&a));
    }

    #[test]
    fn evaluate_subset_superset() {
        let a = attrs(&[("mandatory", "a, b".into())]);
        assert!(Filter::parse("(mandatory:<*a,b,c)").unwrap().matches(&a));
        assert!(!Filter::parse("(mandatory:<*a)").unwrap().matches(&a));
        assert!(Filter::parse("(mandatory:*>b)").unwrap().matches(&a));
        assert!(!Filter::parse("(mandatory:*>c)").unwrap().matches(&a));
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "(&(osgi.wiring.package=org.mypackage)(version>=1.9.0)(!(version>=2.0.0)))",
            "(|(a=b)(c~=d))",
            "(a=*)",
            "(a=foo*bar)",
            r"(a=x\(y\)\*)",
            "(a:<*x,y)",
            "(&)",
        ] {
            let parsed = Filter::parse(input).unwrap();
            let reparsed = Filter::parse(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "{input}");
        }
        let escaped = Filter::parse(r"(a=x\(y\)\*)").unwrap();
        assert_eq!(escaped.as_item().unwrap().value(), "x(y)*");
        assert_eq!(escaped.to_string(), r"(a=x\(y\)\*)");
    }
}
