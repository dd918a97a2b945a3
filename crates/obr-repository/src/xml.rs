//! XML repository documents.
//!
//! Two dialects are accepted and may be mixed:
//!
//! ```xml
//! <repository name="..." lastmodified="20240615143022.123">
//!   <referral depth="1" url="other.xml"/>
//!   <resource id="..." symbolicname="..." version="..." uri="...">
//!     <description>...</description>
//!     <category id="..."/>
//!     <capability name="package">
//!       <p n="package" v="org.foo"/>
//!       <p n="version" t="version" v="1.0.0"/>
//!     </capability>
//!     <require name="package" filter="(package=org.bar)" optional="false"
//!              multiple="false" extend="false">Import package org.bar</require>
//!   </resource>
//! </repository>
//! ```
//!
//! and the namespaced form with `<capability namespace=...>` holding
//! `<attribute name type value/>` and `<requirement namespace=...>` holding
//! `<directive name="filter|resolution|cardinality|effective" value/>`.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use obr_core::resource::property;
use obr_core::{AttributeValue, Capability, Filter, Requirement, ResourceBuilder, Version};
use obr_util::errors::{ObrError, ObrResult};

use crate::document::{parse_timestamp, Referral, RepositoryDocument};

/// Resource child elements whose text becomes a property.
pub(crate) const TEXT_PROPERTIES: &[&str] = &[
    property::DESCRIPTION,
    property::SIZE,
    property::DOCUMENTATION,
    property::LICENSE,
    property::SOURCE,
    "javadoc",
];

#[derive(Debug, Default)]
struct PendingRequirement {
    namespace: String,
    filter: Option<String>,
    optional: bool,
    multiple: bool,
    extend: bool,
    resolvable: bool,
    comment: String,
}

#[derive(Default)]
struct State {
    doc: RepositoryDocument,
    resource: Option<ResourceBuilder>,
    resource_label: String,
    capability: Option<Capability>,
    requirement: Option<PendingRequirement>,
    path: Vec<String>,
    text: String,
}

/// Parse an XML repository document.
pub fn parse(uri: &str, data: &[u8]) -> ObrResult<RepositoryDocument> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let xml = std::str::from_utf8(data).map_err(|e| format_error(uri, format!("not UTF-8: {e}")))?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = State::default();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = local_name(e);
                if !saw_root {
                    check_root(uri, &tag)?;
                    saw_root = true;
                }
                state.open(uri, &tag, e)?;
                state.path.push(tag);
                state.text.clear();
            }
            Ok(Event::Empty(ref e)) => {
                let tag = local_name(e);
                if !saw_root {
                    check_root(uri, &tag)?;
                    saw_root = true;
                }
                state.open(uri, &tag, e)?;
                state.text.clear();
                state.close(uri, &tag)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| format_error(uri, format!("bad text: {err}")))?;
                state.text.push_str(&text);
            }
            Ok(Event::CData(ref e)) => {
                state.text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(_)) => {
                let Some(tag) = state.path.pop() else {
                    return Err(format_error(uri, "unbalanced end tag".to_string()));
                };
                state.close(uri, &tag)?;
                state.text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format_error(
                    uri,
                    format!("malformed XML at byte {}: {e}", reader.buffer_position()),
                ));
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(format_error(uri, "document has no root element".to_string()));
    }
    if let Some(open) = state.path.last() {
        return Err(format_error(uri, format!("unclosed <{open}> element")));
    }
    Ok(state.doc)
}

impl State {
    fn open(&mut self, uri: &str, tag: &str, e: &BytesStart<'_>) -> ObrResult<()> {
        let attrs = attributes(uri, e)?;
        let get = |key: &str| attrs.get(key).map(String::as_str);

        match tag {
            "repository" if self.path.is_empty() => {
                self.doc.name = get("name").map(str::to_string);
                if let Some(stamp) = get("lastmodified") {
                    self.doc.last_modified = parse_timestamp(stamp);
                    if self.doc.last_modified.is_none() {
                        tracing::warn!("Ignoring unparseable lastmodified '{stamp}' in {uri}");
                    }
                }
            }
            "referral" => {
                if let Some(url) = get("url") {
                    self.doc.referrals.push(Referral {
                        url: url.to_string(),
                        depth: get("depth").and_then(|d| d.trim().parse().ok()),
                    });
                }
            }
            "resource" => {
                let mut builder = ResourceBuilder::new(get("id").unwrap_or_default());
                let mut label = get("id").unwrap_or_default().to_string();
                for (key, value) in &attrs {
                    match key.as_str() {
                        "id" => {}
                        property::SYMBOLIC_NAME => {
                            builder = builder.symbolic_name(value);
                            label = value.clone();
                        }
                        property::VERSION => {
                            let version = Version::parse(value).map_err(|err| {
                                format_error(uri, format!("resource {label}: {err}"))
                            })?;
                            builder = builder.version(version);
                        }
                        _ => builder = builder.property(key, value),
                    }
                }
                self.resource = Some(builder);
                self.resource_label = label;
            }
            "category" => {
                if let (Some(builder), Some(id)) = (self.resource.take(), get("id")) {
                    self.resource = Some(builder.category(id));
                }
            }
            "capability" => {
                let namespace = get("namespace").or_else(|| get("name")).unwrap_or_default();
                self.capability = Some(Capability::new(namespace));
            }
            "p" | "attribute" if self.capability.is_some() => {
                let name = get("n").or_else(|| get("name"));
                let value = get("v").or_else(|| get("value"));
                let ty = get("t").or_else(|| get("type"));
                if let (Some(cap), Some(name), Some(value)) = (self.capability.as_mut(), name, value)
                {
                    cap.attributes
                        .insert(name.to_string(), AttributeValue::typed(name, ty, value));
                }
            }
            "require" | "requirement" => {
                let flag = |key: &str| get(key).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
                self.requirement = Some(PendingRequirement {
                    namespace: get("namespace")
                        .or_else(|| get("name"))
                        .unwrap_or_default()
                        .to_string(),
                    filter: get("filter").map(str::to_string),
                    optional: flag("optional"),
                    multiple: flag("multiple"),
                    extend: flag("extend"),
                    resolvable: get("effective").map_or(true, |v| v == "resolve"),
                    comment: String::new(),
                });
            }
            "directive" => {
                if let (Some(req), Some(name), Some(value)) =
                    (self.requirement.as_mut(), get("name"), get("value"))
                {
                    match name {
                        "filter" => req.filter = Some(value.to_string()),
                        "resolution" => req.optional = value == "optional",
                        "cardinality" => req.multiple = value == "multiple",
                        "effective" => req.resolvable = value == "resolve",
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, uri: &str, tag: &str) -> ObrResult<()> {
        match tag {
            "resource" => {
                if let Some(builder) = self.resource.take() {
                    self.doc.resources.push(builder.build());
                }
            }
            "capability" => {
                if let (Some(cap), Some(builder)) = (self.capability.take(), self.resource.take()) {
                    self.resource = Some(builder.capability(cap));
                }
            }
            "require" | "requirement" => {
                let Some(mut pending) = self.requirement.take() else {
                    return Ok(());
                };
                pending.comment.push_str(self.text.trim());
                let requirement = self.finish_requirement(uri, pending)?;
                if let Some(builder) = self.resource.take() {
                    self.resource = Some(builder.requirement(requirement));
                }
            }
            _ if self.in_resource_body() && TEXT_PROPERTIES.contains(&tag) => {
                let text = self.text.trim();
                if !text.is_empty() {
                    if let Some(builder) = self.resource.take() {
                        self.resource = Some(builder.property(tag, text));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Directly inside `<resource>` (the closing tag is already popped).
    fn in_resource_body(&self) -> bool {
        self.resource.is_some() && self.path.last().is_some_and(|p| p == "resource")
    }

    fn finish_requirement(
        &self,
        uri: &str,
        pending: PendingRequirement,
    ) -> ObrResult<Requirement> {
        let filter = match pending.filter.as_deref() {
            Some(text) if !text.trim().is_empty() => Filter::parse(text).map_err(|err| {
                format_error(
                    uri,
                    format!("resource {}: {err}", self.resource_label),
                )
            })?,
            _ => Filter::match_all(),
        };
        let mut requirement = Requirement::new(&pending.namespace, filter)
            .optional(pending.optional)
            .multiple(pending.multiple)
            .extend(pending.extend)
            .resolvable(pending.resolvable);
        if !pending.comment.is_empty() {
            requirement = requirement.with_comment(&pending.comment);
        }
        Ok(requirement)
    }
}

fn check_root(uri: &str, tag: &str) -> ObrResult<()> {
    if tag == "repository" {
        Ok(())
    } else {
        Err(format_error(
            uri,
            format!("expected <repository> root element, found <{tag}>"),
        ))
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn attributes(uri: &str, e: &BytesStart<'_>) -> ObrResult<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| format_error(uri, format!("bad attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| format_error(uri, format!("bad attribute value: {err}")))?;
        out.insert(key, value.to_string());
    }
    Ok(out)
}

fn format_error(uri: &str, message: String) -> ObrError {
    ObrError::RepositoryFormat {
        uri: uri.to_string(),
        message,
    }
}
