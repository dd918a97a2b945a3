//! Format-independent repository document and the parse entry point.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use url::Url;

use obr_core::resource::property;
use obr_core::Resource;
use obr_util::compression;
use obr_util::errors::{ObrError, ObrResult};

use crate::{json, xml};

/// Wire formats of repository documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xml,
    Json,
}

impl Format {
    /// Detect the format from the first significant byte: `<` or `{`.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        match data.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => Some(Self::Xml),
            Some(b'{') => Some(Self::Json),
            _ => None,
        }
    }
}

/// Pointer to another repository document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    pub url: String,
    /// Maximum further hops below the referred document; `None` is unlimited.
    pub depth: Option<u32>,
}

/// A parsed repository document.
#[derive(Debug, Clone, Default)]
pub struct RepositoryDocument {
    pub name: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub referrals: Vec<Referral>,
    pub resources: Vec<Resource>,
}

/// Properties holding URIs that are resolved against the document location.
pub const URI_PROPERTIES: &[&str] = &[
    property::URI,
    property::DOCUMENTATION,
    property::LICENSE,
    property::SOURCE,
    "javadoc",
];

/// Parse raw (possibly gzip- or zip-wrapped) bytes fetched from `uri`.
///
/// `hint` forces a format; otherwise it is sniffed from the content.
pub fn parse_repository(
    uri: &str,
    data: Vec<u8>,
    hint: Option<Format>,
) -> ObrResult<RepositoryDocument> {
    let data = compression::decode_document(uri, data)?;
    let format = match hint.or_else(|| Format::sniff(&data)) {
        Some(format) => format,
        None => {
            return Err(ObrError::RepositoryFormat {
                uri: uri.to_string(),
                message: "content is neither XML nor JSON".to_string(),
            })
        }
    };

    let mut doc = match format {
        Format::Xml => xml::parse(uri, &data)?,
        Format::Json => json::parse(uri, &data)?,
    };

    if let Some(base) = base_url(uri) {
        for resource in &mut doc.resources {
            absolutize(resource, &base);
        }
        for referral in &mut doc.referrals {
            referral.url = resolve_against(&base, &referral.url);
        }
    }

    tracing::debug!(
        "Parsed {format:?} repository {uri}: {} resources, {} referrals",
        doc.resources.len(),
        doc.referrals.len()
    );
    Ok(doc)
}

/// The URL relative references in a document at `uri` resolve against.
/// Plain filesystem paths are turned into `file:` URLs.
pub fn base_url(uri: &str) -> Option<Url> {
    match Url::parse(uri) {
        Ok(url) if url.scheme().len() > 1 => Some(url),
        _ => {
            let path = std::path::absolute(uri).ok()?;
            Url::from_file_path(path).ok()
        }
    }
}

/// Resolve `reference` against `base`; absolute references are kept.
pub fn resolve_against(base: &Url, reference: &str) -> String {
    if Url::parse(reference).is_ok_and(|u| u.scheme().len() > 1) {
        return reference.to_string();
    }
    base.join(reference)
        .map(String::from)
        .unwrap_or_else(|_| reference.to_string())
}

fn absolutize(resource: &mut Resource, base: &Url) {
    for key in URI_PROPERTIES {
        if let Some(value) = resource.properties.get_mut(*key) {
            *value = resolve_against(base, value);
        }
    }
}

/// Parse `lastmodified` stamps: `yyyyMMddHHmmss[.SSS]` or epoch milliseconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    for fmt in ["%Y%m%d%H%M%S%.f", "%Y%m%d%H%M%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(millis) = value.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Inverse of [`parse_timestamp`] for the XML form.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format("%Y%m%d%H%M%S%.3f").to_string()
}
