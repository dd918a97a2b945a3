//! Resources built from bundle manifests.
//!
//! A bundle jar describes itself in `META-INF/MANIFEST.MF`. The OSGi headers
//! map onto capabilities and requirements:
//!
//! | header | produces |
//! |---|---|
//! | `Bundle-SymbolicName`, `Bundle-Version` | identity, `osgi.wiring.bundle` and `osgi.wiring.host` capabilities |
//! | `Export-Package` | one `osgi.wiring.package` capability per package |
//! | `Import-Package` | one `osgi.wiring.package` requirement per package |
//! | `Require-Bundle` | `osgi.wiring.bundle` requirements |
//! | `Fragment-Host` | an extending `osgi.wiring.host` requirement |
//! | `Bundle-RequiredExecutionEnvironment` | one `osgi.ee` requirement accepting any listed environment |
//! | `Export-Service`, `Import-Service` | `osgi.service` capabilities and multiple requirements |
//!
//! Manifests without `Bundle-SymbolicName` are plain jars, not bundles.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use obr_core::capability::range_clauses;
use obr_core::resource::property;
use obr_core::{
    namespace, AttributeValue, Capability, Filter, FilterType, Requirement, Resource,
    ResourceBuilder, SimpleItem, Version, VersionRange,
};
use obr_util::errors::{ObrError, ObrResult};

use crate::document::base_url;
use crate::download::Fetcher;

pub const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";
const DEFAULT_LOCALIZATION: &str = "OSGI-INF/l10n/bundle";

/// Header names.
pub mod header {
    pub const SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
    pub const VERSION: &str = "Bundle-Version";
    pub const NAME: &str = "Bundle-Name";
    pub const DESCRIPTION: &str = "Bundle-Description";
    pub const LICENSE: &str = "Bundle-License";
    pub const COPYRIGHT: &str = "Bundle-Copyright";
    pub const DOC_URL: &str = "Bundle-DocURL";
    pub const SOURCE: &str = "Bundle-Source";
    pub const CATEGORY: &str = "Bundle-Category";
    pub const LOCALIZATION: &str = "Bundle-Localization";
    pub const EXPORT_PACKAGE: &str = "Export-Package";
    pub const IMPORT_PACKAGE: &str = "Import-Package";
    pub const REQUIRE_BUNDLE: &str = "Require-Bundle";
    pub const FRAGMENT_HOST: &str = "Fragment-Host";
    pub const EXECUTION_ENVIRONMENT: &str = "Bundle-RequiredExecutionEnvironment";
    pub const EXPORT_SERVICE: &str = "Export-Service";
    pub const IMPORT_SERVICE: &str = "Import-Service";
}

const BUNDLE_VERSION_ATTR: &str = "bundle-version";
const BUNDLE_NAME_ATTR: &str = "bundle-symbolic-name";
const OBJECT_CLASS: &str = "objectClass";

/// Main section of a jar manifest. Header names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    headers: Vec<(String, String)>,
}

impl Manifest {
    /// Parse `MANIFEST.MF` text. Only the main section (up to the first blank
    /// line) is read; lines starting with a space continue the previous one.
    pub fn parse(text: &str) -> ObrResult<Self> {
        let mut headers: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                match headers.last_mut() {
                    Some((_, value)) => value.push_str(rest),
                    None => {
                        return Err(ObrError::manifest_syntax(
                            MANIFEST_ENTRY,
                            "continuation line before the first header",
                        ))
                    }
                }
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(ObrError::manifest_syntax(
                    MANIFEST_ENTRY,
                    format!("expected 'Name: value', got '{line}'"),
                ));
            };
            headers.push((name.trim().to_string(), value.trim_start().to_string()));
        }
        Ok(Self { headers })
    }

    pub fn from_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Whether any value is a `%key` reference into the localization file.
    pub fn is_localized(&self) -> bool {
        self.headers.iter().any(|(_, v)| v.starts_with('%'))
    }

    /// Replace `%key` values with their translation; unknown keys keep the
    /// key without the `%`.
    pub fn localize(&mut self, translations: &HashMap<String, String>) {
        for (_, value) in &mut self.headers {
            if let Some(key) = value.strip_prefix('%') {
                *value = translations.get(key).cloned().unwrap_or_else(|| key.to_string());
            }
        }
    }

    /// Jar entry holding the translations, without the `.properties` suffix.
    pub fn localization_base(&self) -> &str {
        self.header(header::LOCALIZATION).unwrap_or(DEFAULT_LOCALIZATION)
    }

    fn clauses(&self, name: &str) -> ObrResult<Vec<Clause>> {
        match self.header(name) {
            Some(value) => parse_header(name, value),
            None => Ok(Vec::new()),
        }
    }
}

/// One clause of a header: `path;path;attr=value;directive:=value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clause {
    pub paths: Vec<String>,
    /// Attributes in declaration order. A typed attribute `name:Type=value`
    /// keeps `Type` in the second field.
    pub attributes: Vec<(String, Option<String>, String)>,
    pub directives: Vec<(String, String)>,
}

impl Clause {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, _, v)| v.as_str())
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn is_optional(&self, directive: &str) -> bool {
        self.directive(directive)
            .is_some_and(|v| v.eq_ignore_ascii_case("optional"))
    }
}

/// Parse a header value into clauses. Commas separate clauses, semicolons
/// separate the parts of a clause, and double quotes protect both.
pub fn parse_header(name: &str, value: &str) -> ObrResult<Vec<Clause>> {
    let mut clauses = Vec::new();
    for raw in split_unquoted(name, value, ',')? {
        if raw.trim().is_empty() {
            continue;
        }
        let mut clause = Clause::default();
        for part in split_unquoted(name, &raw, ';')? {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((key, val)) = part.split_once(":=") {
                clause
                    .directives
                    .push((key.trim().to_string(), unquote(val.trim())));
            } else if let Some((key, val)) = part.split_once('=') {
                let (key, ty) = match key.split_once(':') {
                    Some((k, t)) => (k.trim(), Some(t.trim().to_string())),
                    None => (key.trim(), None),
                };
                clause
                    .attributes
                    .push((key.to_string(), ty, unquote(val.trim())));
            } else if clause.attributes.is_empty() && clause.directives.is_empty() {
                clause.paths.push(unquote(part));
            } else {
                return Err(ObrError::manifest_syntax(
                    name,
                    format!("'{part}' follows the parameters of its clause"),
                ));
            }
        }
        if clause.paths.is_empty() {
            return Err(ObrError::manifest_syntax(name, format!("clause '{raw}' has no name")));
        }
        clauses.push(clause);
    }
    Ok(clauses)
}

fn split_unquoted(name: &str, value: &str, sep: char) -> ObrResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            '\\' if quoted => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c == sep && !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if quoted {
        return Err(ObrError::manifest_syntax(name, "unterminated quote"));
    }
    parts.push(current);
    Ok(parts)
}

fn unquote(s: &str) -> String {
    match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => s.to_string(),
    }
}

/// Lenient version parsing for manifest values: `1.0-SNAPSHOT` becomes
/// `1.0.0.SNAPSHOT`, a missing value becomes `0.0.0`.
pub fn clean_version(raw: Option<&str>) -> Version {
    let raw = raw.map(str::trim).unwrap_or_default();
    if let Ok(version) = Version::parse(raw) {
        return version;
    }

    let mut numbers = [0u64; 3];
    let mut count = 0;
    let mut rest = raw;
    while count < 3 {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            break;
        }
        numbers[count] = rest[..digits].parse().unwrap_or(u64::MAX);
        count += 1;
        rest = &rest[digits..];
        match rest.strip_prefix('.') {
            Some(after) if after.starts_with(|c: char| c.is_ascii_digit()) => rest = after,
            _ => break,
        }
    }
    let qualifier: String = rest
        .trim_start_matches(['.', '-', '_'])
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    Version::new(numbers[0], numbers[1], numbers[2]).with_qualifier(&qualifier)
}

/// Build a resource from manifest headers. `Ok(None)` when the manifest has
/// no `Bundle-SymbolicName`.
pub fn resource_from_manifest(manifest: &Manifest) -> ObrResult<Option<Resource>> {
    let names = manifest.clauses(header::SYMBOLIC_NAME)?;
    let Some(name) = names.first().and_then(|c| c.paths.first()).cloned() else {
        return Ok(None);
    };
    let version = clean_version(manifest.header(header::VERSION));

    let mut builder = ResourceBuilder::new(&format!("{name}/{version}"))
        .symbolic_name(&name)
        .version(version.clone());
    for (key, header_name) in [
        (property::PRESENTATION_NAME, header::NAME),
        (property::DESCRIPTION, header::DESCRIPTION),
        (property::LICENSE, header::LICENSE),
        ("copyright", header::COPYRIGHT),
        (property::DOCUMENTATION, header::DOC_URL),
        (property::SOURCE, header::SOURCE),
    ] {
        if let Some(value) = manifest.header(header_name) {
            builder = builder.property(key, value);
        }
    }
    for clause in manifest.clauses(header::CATEGORY)? {
        for category in &clause.paths {
            builder = builder.category(category);
        }
    }

    let hosts = manifest.clauses(header::FRAGMENT_HOST)?;
    let fragment = hosts.len() == 1;
    if !fragment {
        for ns in [namespace::BUNDLE, namespace::HOST] {
            builder = builder.capability(
                Capability::new(ns)
                    .with_attribute(ns, name.as_str())
                    .with_attribute(BUNDLE_VERSION_ATTR, version.clone()),
            );
        }
    }

    for clause in manifest.clauses(header::IMPORT_SERVICE)? {
        for service in &clause.paths {
            builder = builder.requirement(service_requirement(service, &clause)?);
        }
    }
    for clause in manifest.clauses(header::EXPORT_SERVICE)? {
        for service in &clause.paths {
            builder = builder.capability(service_capability(service, &clause));
        }
    }
    if let [host] = hosts.as_slice() {
        let host_name = &host.paths[0];
        let range = range_attribute(host, &[BUNDLE_VERSION_ATTR])?;
        let mut clauses = vec![equal(namespace::HOST, host_name)];
        clauses.extend(range_clauses(BUNDLE_VERSION_ATTR, &range));
        builder = builder.requirement(
            Requirement::new(namespace::HOST, all_of(clauses))
                .extend(true)
                .with_comment(&format!("Required Host {host_name}")),
        );
    }
    for clause in manifest.clauses(header::REQUIRE_BUNDLE)? {
        let range = range_attribute(&clause, &[BUNDLE_VERSION_ATTR])?;
        for bundle in &clause.paths {
            let mut clauses = vec![equal(namespace::BUNDLE, bundle)];
            clauses.extend(range_clauses(BUNDLE_VERSION_ATTR, &range));
            builder = builder.requirement(
                Requirement::new(namespace::BUNDLE, all_of(clauses))
                    .optional(clause.is_optional("resolution"))
                    .with_comment(&format!("Require Bundle {bundle}; {range}")),
            );
        }
    }
    for clause in manifest.clauses(header::EXPORT_PACKAGE)? {
        for package in &clause.paths {
            builder = builder.capability(package_capability(package, &clause, &name, &version));
        }
    }
    for clause in manifest.clauses(header::IMPORT_PACKAGE)? {
        for package in &clause.paths {
            builder = builder.requirement(package_requirement(package, &clause)?);
        }
    }
    let environments = manifest.clauses(header::EXECUTION_ENVIRONMENT)?;
    if !environments.is_empty() {
        let filter = Filter::Or(
            environments
                .iter()
                .flat_map(|c| c.paths.iter())
                .map(|ee| equal(namespace::EXECUTION_ENVIRONMENT, ee))
                .collect(),
        );
        let comment = format!("Execution Environment {filter}");
        builder = builder.requirement(
            Requirement::new(namespace::EXECUTION_ENVIRONMENT, filter).with_comment(&comment),
        );
    }

    Ok(Some(builder.build()))
}

fn equal(attr: &str, value: &str) -> Filter {
    Filter::Item(SimpleItem::new(attr, FilterType::Equal, value))
}

fn all_of(mut clauses: Vec<Filter>) -> Filter {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Filter::And(clauses)
    }
}

/// Version range from the first attribute present among `names`; a missing
/// attribute accepts every version.
fn range_attribute(clause: &Clause, names: &[&str]) -> ObrResult<VersionRange> {
    match names.iter().find_map(|n| clause.attribute(n)) {
        Some(raw) => VersionRange::parse(raw),
        None => Ok(VersionRange::at_least(Version::empty())),
    }
}

fn is_version_attr(key: &str) -> bool {
    key.eq_ignore_ascii_case("version") || key.eq_ignore_ascii_case("specification-version")
}

fn package_capability(package: &str, clause: &Clause, bundle: &str, bundle_version: &Version) -> Capability {
    let version = clean_version(
        clause
            .attribute("version")
            .or_else(|| clause.attribute("specification-version")),
    );
    let mut capability = Capability::new(namespace::PACKAGE)
        .with_attribute(namespace::PACKAGE, package)
        .with_attribute("version", version)
        .with_attribute(BUNDLE_NAME_ATTR, bundle)
        .with_attribute(BUNDLE_VERSION_ATTR, bundle_version.clone());
    for (key, ty, value) in &clause.attributes {
        if !is_version_attr(key) {
            capability = capability.with_attribute(key, AttributeValue::typed(key, ty.as_deref(), value));
        }
    }
    for (key, value) in &clause.directives {
        capability = if key.eq_ignore_ascii_case("mandatory") {
            capability.with_attribute("mandatory", AttributeValue::typed(key, Some("set"), value))
        } else {
            capability.with_attribute(&format!("{key}:"), value.as_str())
        };
    }
    capability
}

/// `(&(osgi.wiring.package=NAME)<version range><attrs>)`. Exporters that
/// declare `mandatory:=` attributes only match imports naming all of them.
fn package_requirement(package: &str, clause: &Clause) -> ObrResult<Requirement> {
    let range = range_attribute(clause, &["version", "specification-version"])?;
    let mut clauses = vec![equal(namespace::PACKAGE, package)];
    clauses.extend(range_clauses("version", &range));

    let mut named = Vec::new();
    for (key, _, value) in &clause.attributes {
        if !is_version_attr(key) {
            clauses.push(equal(key, value));
            named.push(key.as_str());
        }
    }
    let no_mandatory = Filter::Not(Box::new(Filter::Item(SimpleItem::new(
        "mandatory",
        FilterType::Present,
        "",
    ))));
    clauses.push(if named.is_empty() {
        no_mandatory
    } else {
        Filter::Or(vec![
            no_mandatory,
            Filter::Item(SimpleItem::new("mandatory", FilterType::Subset, &named.join(","))),
        ])
    });

    Ok(Requirement::new(namespace::PACKAGE, all_of(clauses))
        .optional(clause.is_optional("resolution"))
        .with_comment(&format!("Import package {package}")))
}

fn service_capability(service: &str, clause: &Clause) -> Capability {
    let mut capability = Capability::new(namespace::SERVICE).with_attribute(OBJECT_CLASS, service);
    for (key, ty, value) in &clause.attributes {
        capability = capability.with_attribute(key, AttributeValue::typed(key, ty.as_deref(), value));
    }
    capability
}

fn service_requirement(service: &str, clause: &Clause) -> ObrResult<Requirement> {
    let name = equal(OBJECT_CLASS, service);
    let filter = match clause.attribute("filter") {
        Some(extra) if extra.starts_with('(') => Filter::And(vec![name, Filter::parse(extra)?]),
        Some(extra) => Filter::And(vec![name, Filter::parse(&format!("({extra})"))?]),
        None => name,
    };
    Ok(Requirement::new(namespace::SERVICE, filter)
        .multiple(true)
        .optional(clause.is_optional("availability"))
        .with_comment(&format!("Import Service {service}")))
}

/// Read the bundle in jar bytes fetched from `uri`. `Ok(None)` when the jar
/// has a manifest but is not a bundle.
///
/// The resource gets `uri` (absolute) and `size` properties.
pub fn resource_from_jar(uri: &str, data: &[u8]) -> ObrResult<Option<Resource>> {
    let format_error = |message: String| ObrError::RepositoryFormat {
        uri: uri.to_string(),
        message,
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| format_error(format!("not a jar archive: {e}")))?;

    let text = read_entry(&mut archive, MANIFEST_ENTRY)
        .map_err(|e| format_error(format!("cannot read {MANIFEST_ENTRY}: {e}")))?
        .ok_or_else(|| format_error(format!("jar has no {MANIFEST_ENTRY}")))?;
    let mut manifest = Manifest::parse(&text)?;

    if manifest.is_localized() {
        let path = format!("{}.properties", manifest.localization_base());
        match read_entry(&mut archive, &path) {
            Ok(Some(props)) => manifest.localize(&parse_properties(&props)),
            Ok(None) => manifest.localize(&HashMap::new()),
            Err(e) => {
                tracing::warn!("Ignoring unreadable localization {path} in {uri}: {e}");
                manifest.localize(&HashMap::new());
            }
        }
    }

    let Some(mut resource) = resource_from_manifest(&manifest)? else {
        tracing::debug!("{uri} is a plain jar, not a bundle");
        return Ok(None);
    };
    let location = base_url(uri).map_or_else(|| uri.to_string(), |url| url.to_string());
    resource.properties.insert(property::URI.to_string(), location);
    resource
        .properties
        .insert(property::SIZE.to_string(), data.len().to_string());
    Ok(Some(resource))
}

/// Fetch a bundle jar and read its resource description.
pub async fn load_bundle(fetcher: &Fetcher, uri: &str) -> ObrResult<Option<Resource>> {
    let fetched = fetcher.fetch(uri).await?;
    let resource = resource_from_jar(uri, &fetched.bytes)?;
    if let Some(ref r) = resource {
        tracing::info!("Read bundle {r} from {uri}");
    }
    Ok(resource)
}

/// Entry contents by case-insensitive name.
fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, zip::result::ZipError> {
    let Some(found) = archive
        .file_names()
        .find(|n| n.eq_ignore_ascii_case(name))
        .map(str::to_string)
    else {
        return Ok(None);
    };
    let mut entry = archive.by_name(&found)?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// `key=value` / `key: value` lines; `#` and `!` start comments.
fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .filter_map(|l| {
            let split = l.find(['=', ':'])?;
            Some((l[..split].trim().to_string(), l[split + 1..].trim().to_string()))
        })
        .collect()
}
