//! XML export in the classic repository schema.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use url::Url;

use obr_core::resource::property;
use obr_core::{Capability, Requirement, Resource};
use obr_util::errors::{ObrError, ObrResult};

use crate::document::{base_url, format_timestamp, URI_PROPERTIES};
use crate::repository::Repository;
use crate::xml::TEXT_PROPERTIES;

/// Serialize a repository snapshot. Resource URIs below the repository
/// location are written relative to it.
pub fn write_repository(repository: &Repository) -> ObrResult<String> {
    let uri = repository.uri.as_str();
    let base = base_url(uri);
    let mut w = XmlOut {
        uri,
        writer: Writer::new_with_indent(Vec::new(), b' ', 2),
    };

    w.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("repository");
    if let Some(ref name) = repository.name {
        root.push_attribute(("name", name.as_str()));
    }
    if let Some(ref stamp) = repository.last_modified {
        root.push_attribute(("lastmodified", format_timestamp(stamp).as_str()));
    }
    w.event(Event::Start(root))?;

    for referral in &repository.referrals {
        let mut e = BytesStart::new("referral");
        let depth = referral.depth.map(|d| d.to_string());
        if let Some(ref depth) = depth {
            e.push_attribute(("depth", depth.as_str()));
        }
        e.push_attribute(("url", relative(base.as_ref(), &referral.url).as_str()));
        w.event(Event::Empty(e))?;
    }

    for resource in repository.resources() {
        write_resource(&mut w, resource, base.as_ref())?;
    }

    w.event(Event::End(BytesEnd::new("repository")))?;

    String::from_utf8(w.writer.into_inner()).map_err(|e| ObrError::RepositoryFormat {
        uri: uri.to_string(),
        message: format!("writer produced invalid UTF-8: {e}"),
    })
}

struct XmlOut<'a> {
    uri: &'a str,
    writer: Writer<Vec<u8>>,
}

impl XmlOut<'_> {
    fn event(&mut self, event: Event<'_>) -> ObrResult<()> {
        self.writer
            .write_event(event)
            .map_err(|e| ObrError::RepositoryFormat {
                uri: self.uri.to_string(),
                message: format!("failed to write XML: {e}"),
            })
    }

    fn text_element(&mut self, tag: &str, text: &str) -> ObrResult<()> {
        self.event(Event::Start(BytesStart::new(tag)))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.event(Event::End(BytesEnd::new(tag)))
    }
}

fn write_resource(w: &mut XmlOut<'_>, resource: &Resource, base: Option<&Url>) -> ObrResult<()> {
    let mut e = BytesStart::new("resource");
    e.push_attribute(("id", resource.id.as_str()));
    if let Some(ref name) = resource.symbolic_name {
        e.push_attribute(("symbolicname", name.as_str()));
    }
    if let Some(name) = resource.presentation_name() {
        e.push_attribute(("presentationname", name));
    }
    if let Some(uri) = resource.uri() {
        e.push_attribute(("uri", relative(base, uri).as_str()));
    }
    let version = resource.version.to_string();
    e.push_attribute(("version", version.as_str()));
    for (key, value) in &resource.properties {
        let inline = key != property::PRESENTATION_NAME
            && key != property::URI
            && !TEXT_PROPERTIES.contains(&key.as_str());
        if inline {
            e.push_attribute((key.as_str(), value.as_str()));
        }
    }
    w.event(Event::Start(e))?;

    for key in TEXT_PROPERTIES {
        if let Some(value) = resource.property(key) {
            if URI_PROPERTIES.contains(key) {
                w.text_element(key, &relative(base, value))?;
            } else {
                w.text_element(key, value)?;
            }
        }
    }

    for category in &resource.categories {
        let mut c = BytesStart::new("category");
        c.push_attribute(("id", category.as_str()));
        w.event(Event::Empty(c))?;
    }

    for capability in &resource.capabilities {
        write_capability(w, capability)?;
    }
    for requirement in &resource.requirements {
        write_requirement(w, requirement)?;
    }

    w.event(Event::End(BytesEnd::new("resource")))
}

fn write_capability(w: &mut XmlOut<'_>, capability: &Capability) -> ObrResult<()> {
    let mut e = BytesStart::new("capability");
    e.push_attribute(("name", capability.namespace.as_str()));
    w.event(Event::Start(e))?;

    for (name, value) in &capability.attributes {
        let mut p = BytesStart::new("p");
        p.push_attribute(("n", name.as_str()));
        if let Some(ty) = value.type_name() {
            p.push_attribute(("t", ty));
        }
        let text = value.to_string();
        p.push_attribute(("v", text.as_str()));
        w.event(Event::Empty(p))?;
    }

    w.event(Event::End(BytesEnd::new("capability")))
}

fn write_requirement(w: &mut XmlOut<'_>, requirement: &Requirement) -> ObrResult<()> {
    let filter = requirement.filter.to_string();
    let flag = |b: bool| if b { "true" } else { "false" };

    let mut e = BytesStart::new("require");
    e.push_attribute(("name", requirement.namespace.as_str()));
    e.push_attribute(("filter", filter.as_str()));
    e.push_attribute(("extend", flag(requirement.extend)));
    e.push_attribute(("multiple", flag(requirement.multiple)));
    e.push_attribute(("optional", flag(requirement.optional)));
    if !requirement.resolvable {
        e.push_attribute(("effective", "active"));
    }

    match requirement.comment.as_deref().map(str::trim) {
        Some(comment) if !comment.is_empty() => {
            w.event(Event::Start(e))?;
            w.event(Event::Text(BytesText::new(comment)))?;
            w.event(Event::End(BytesEnd::new("require")))
        }
        _ => w.event(Event::Empty(e)),
    }
}

/// `target` relative to the document location when it lies below it.
fn relative(base: Option<&Url>, target: &str) -> String {
    let Some(base) = base else {
        return target.to_string();
    };
    match Url::parse(target) {
        Ok(url) => match base.make_relative(&url) {
            Some(rel) if !rel.starts_with("../") && !rel.is_empty() => rel,
            _ => target.to_string(),
        },
        Err(_) => target.to_string(),
    }
}
