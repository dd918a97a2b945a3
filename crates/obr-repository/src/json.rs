//! JSON repository documents.
//!
//! ```json
//! {
//!   "name": "example",
//!   "lastModified": "2024-06-15T14:30:22Z",
//!   "referrals": [{ "url": "other.json", "depth": 1 }],
//!   "resources": [{
//!     "id": "org.foo/1.0.0",
//!     "symbolicName": "org.foo",
//!     "version": "1.0.0",
//!     "properties": { "uri": "foo.jar", "presentationname": "Foo" },
//!     "categories": ["util"],
//!     "capabilities": [{
//!       "namespace": "osgi.wiring.package",
//!       "attributes": { "osgi.wiring.package": "org.foo", "version": "1.0.0" }
//!     }],
//!     "requirements": [{
//!       "namespace": "osgi.wiring.package",
//!       "filter": "(osgi.wiring.package=org.bar)",
//!       "optional": true
//!     }]
//!   }]
//! }
//! ```
//!
//! Attribute values are strings, numbers, arrays, or `{ "type": ..., "value": ... }`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use obr_core::{AttributeValue, Capability, Filter, Requirement, ResourceBuilder, Version};
use obr_util::errors::{ObrError, ObrResult};

use crate::document::{parse_timestamp, Referral, RepositoryDocument};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRepository {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    last_modified: Option<Value>,
    #[serde(default)]
    referrals: Vec<JsonReferral>,
    #[serde(default)]
    resources: Vec<JsonResource>,
}

#[derive(Debug, Deserialize)]
struct JsonReferral {
    url: String,
    #[serde(default)]
    depth: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    symbolic_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    capabilities: Vec<JsonCapability>,
    #[serde(default)]
    requirements: Vec<JsonRequirement>,
}

#[derive(Debug, Deserialize)]
struct JsonCapability {
    namespace: String,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRequirement {
    namespace: String,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    multiple: bool,
    #[serde(default)]
    extend: bool,
    #[serde(default)]
    effective: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

/// Parse a JSON repository document.
pub fn parse(uri: &str, data: &[u8]) -> ObrResult<RepositoryDocument> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let raw: JsonRepository = serde_json::from_slice(data).map_err(|e| ObrError::RepositoryFormat {
        uri: uri.to_string(),
        message: format!("invalid JSON repository: {e}"),
    })?;

    let last_modified = match raw.last_modified {
        Some(Value::String(s)) => parse_timestamp(&s),
        Some(Value::Number(n)) => n.as_i64().and_then(|ms| parse_timestamp(&ms.to_string())),
        _ => None,
    };

    let mut resources = Vec::with_capacity(raw.resources.len());
    for (position, res) in raw.resources.into_iter().enumerate() {
        let label = res
            .symbolic_name
            .clone()
            .or_else(|| res.id.clone())
            .unwrap_or_else(|| format!("#{position}"));
        let fail = |message: String| ObrError::RepositoryFormat {
            uri: uri.to_string(),
            message: format!("resource {label}: {message}"),
        };

        let mut builder = ResourceBuilder::new(res.id.as_deref().unwrap_or_default());
        if let Some(ref name) = res.symbolic_name {
            builder = builder.symbolic_name(name);
        }
        if let Some(ref version) = res.version {
            builder = builder.version(Version::parse(version).map_err(|e| fail(e.to_string()))?);
        }
        for (key, value) in &res.properties {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            builder = builder.property(key, &text);
        }
        for category in &res.categories {
            builder = builder.category(category);
        }
        for cap in res.capabilities {
            let mut capability = Capability::new(&cap.namespace);
            for (key, value) in &cap.attributes {
                let typed = attribute_value(key, value).map_err(fail)?;
                capability.attributes.insert(key.clone(), typed);
            }
            builder = builder.capability(capability);
        }
        for req in res.requirements {
            let filter = match req.filter.as_deref() {
                Some(text) if !text.trim().is_empty() => {
                    Filter::parse(text).map_err(|e| fail(e.to_string()))?
                }
                _ => Filter::match_all(),
            };
            let mut requirement = Requirement::new(&req.namespace, filter)
                .optional(req.optional)
                .multiple(req.multiple)
                .extend(req.extend)
                .resolvable(req.effective.as_deref().map_or(true, |e| e == "resolve"));
            if let Some(ref comment) = req.comment {
                requirement = requirement.with_comment(comment);
            }
            builder = builder.requirement(requirement);
        }
        resources.push(builder.build());
    }

    Ok(RepositoryDocument {
        name: raw.name,
        last_modified,
        referrals: raw
            .referrals
            .into_iter()
            .map(|r| Referral {
                url: r.url,
                depth: r.depth,
            })
            .collect(),
        resources,
    })
}

fn attribute_value(name: &str, value: &Value) -> Result<AttributeValue, String> {
    match value {
        Value::String(s) => Ok(AttributeValue::typed(name, None, s)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(AttributeValue::Long(i)),
            None => n
                .as_f64()
                .map(AttributeValue::Double)
                .ok_or_else(|| format!("attribute {name}: unsupported number {n}")),
        },
        Value::Bool(b) => Ok(AttributeValue::String(b.to_string())),
        Value::Array(items) => items
            .iter()
            .map(|item| attribute_value(name, item))
            .collect::<Result<Vec<_>, _>>()
            .map(AttributeValue::List),
        Value::Object(map) => {
            let raw = match map.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|i| match i {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                Some(other) => other.to_string(),
                None => return Err(format!("attribute {name}: object without \"value\"")),
            };
            let ty = map.get("type").and_then(Value::as_str);
            Ok(AttributeValue::typed(name, ty, &raw))
        }
        Value::Null => Err(format!("attribute {name}: null value")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obr_core::namespace;

    #[test]
    fn parses_resources_and_typed_attributes() {
        let json = br#"{
  "name": "json-repo",
  "lastModified": "2024-06-15T14:30:22Z",
  "referrals": [{"url": "more.json"}],
  "resources": [{
    "symbolicName": "org.foo",
    "version": "1.0.0",
    "properties": {"uri": "foo.jar", "size": 10},
    "capabilities": [{
      "namespace": "osgi.wiring.package",
      "attributes": {
        "osgi.wiring.package": "org.foo",
        "version": "1.0.0",
        "weight": 3,
        "ratio": 0.5,
        "uses": {"type": "List<String>", "value": ["a", "b"]}
      }
    }],
    "requirements": [
      {"namespace": "osgi.wiring.package", "filter": "(osgi.wiring.package=org.bar)", "optional": true},
      {"namespace": "osgi.service", "filter": "(objectClass=x)", "effective": "active"}
    ]
  }]
}"#;
        let doc = parse("mem:", json).unwrap();
        assert_eq!(doc.name.as_deref(), Some("json-repo"));
        assert!(doc.last_modified.is_some());
        assert_eq!(doc.referrals[0].depth, None);

        let res = &doc.resources[0];
        assert_eq!(res.id, "org.foo/1.0.0");
        assert_eq!(res.property("size"), Some("10"));
        let pkg = res.capabilities_in(namespace::PACKAGE).next().unwrap();
        assert_eq!(
            pkg.attribute("version"),
            Some(&AttributeValue::Version(Version::new(1, 0, 0)))
        );
        assert_eq!(pkg.attribute("weight"), Some(&AttributeValue::Long(3)));
        assert_eq!(pkg.attribute("ratio"), Some(&AttributeValue::Double(0.5)));
        assert_eq!(
            pkg.attribute("uses"),
            Some(&AttributeValue::List(vec!["a".into(), "b".into()]))
        );
        assert!(res.requirements[0].optional);
        assert!(!res.requirements[1].resolvable);
    }

    #[test]
    fn schema_mismatch_is_format_error() {
        for bad in [&br#"{"resources": 5}"#[..], br#"{"resources": [{"capabilities": [{}]}]}"#, b"{"] {
            let err = parse("mem:", bad).unwrap_err();
            assert!(matches!(err, ObrError::RepositoryFormat { .. }), "{err}");
        }
        let err = parse(
            "mem:",
            br#"{"resources": [{"symbolicName": "a", "requirements": [{"namespace": "x", "filter": "(oops"}]}]}"#,
        )
        .unwrap_err();
        match err {
            ObrError::RepositoryFormat { message, .. } => assert!(message.contains("resource a")),
            other => panic!("unexpected: {other}"),
        }
    }
}
