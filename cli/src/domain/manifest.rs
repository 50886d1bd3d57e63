//! Ad-hoc resource manifests: token substitution and document decoding.
//!
//! Pure functions only, no I/O, no async.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::ManifestError;

/// Placeholder replaced with the image reference.
pub const TOKEN_IMAGE: &str = "CONTAINER_IMAGE";
/// Placeholder replaced with the generated application name.
pub const TOKEN_PROJECT_NAME: &str = "PROJECT_NAME";
/// Placeholder replaced with the exposed port.
pub const TOKEN_PORT: &str = "PORT";

/// Literal token replacements, applied in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions {
    pairs: Vec<(&'static str, String)>,
}

impl Substitutions {
    /// The deploy substitutions. The application name is `<component>-deploy`.
    #[must_use]
    pub fn for_deploy(image: &str, component: &str, port: Option<u16>) -> Self {
        Self {
            pairs: vec![
                (TOKEN_IMAGE, image.to_string()),
                (TOKEN_PROJECT_NAME, application_name(component)),
                (TOKEN_PORT, port.map(|p| p.to_string()).unwrap_or_default()),
            ],
        }
    }

    /// Replace every occurrence of each token. Tokens with an empty value
    /// are left in place.
    #[must_use]
    pub fn apply(&self, raw: &str) -> String {
        let mut out = raw.to_string();
        for (token, value) in &self.pairs {
            if value.is_empty() || !out.contains(token) {
                continue;
            }
            out = out.replace(token, value);
        }
        out
    }
}

/// Name given to the deployed application of `component`.
#[must_use]
pub fn application_name(component: &str) -> String {
    format!("{component}-deploy")
}

/// The last manifest applied from a context directory, kept so a later
/// delete works without re-fetching the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedManifest {
    pub applied_at: DateTime<Utc>,
    /// Path or URL the manifest was loaded from.
    pub source: String,
    /// Manifest text after substitution.
    pub content: String,
}

/// Group/version/resource address of one document, plus its kind and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    /// Empty for the core group.
    pub group: String,
    pub version: String,
    /// Plural collection name, e.g. `deployments`.
    pub resource: String,
    pub kind: String,
    pub name: String,
}

impl ResourceId {
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// A decoded document with its address.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: ResourceId,
    pub body: Value,
}

/// One manifest document.
///
/// Known kinds resolve to their exact collection name. Anything else is
/// `Opaque` and addressed by the lowercase-kind-plus-`s` rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Deployment(Document),
    Service(Document),
    Ingress(Document),
    Opaque(Document),
}

impl Manifest {
    #[must_use]
    pub fn document(&self) -> &Document {
        match self {
            Self::Deployment(d) | Self::Service(d) | Self::Ingress(d) | Self::Opaque(d) => d,
        }
    }

    fn document_mut(&mut self) -> &mut Document {
        match self {
            Self::Deployment(d) | Self::Service(d) | Self::Ingress(d) | Self::Opaque(d) => d,
        }
    }

    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.document().id
    }

    #[must_use]
    pub fn body(&self) -> &Value {
        &self.document().body
    }

    /// Copy the live object's resource version onto the document so an
    /// update passes the optimistic-concurrency check.
    pub fn set_resource_version(&mut self, version: &str) {
        let body = &mut self.document_mut().body;
        if let Some(meta) = body.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert(
                "resourceVersion".to_string(),
                Value::String(version.to_string()),
            );
        }
    }

    fn classify(id: ResourceId, body: Value) -> Self {
        let doc = Document { id, body };
        match (doc.id.group.as_str(), doc.id.kind.as_str()) {
            ("apps", "Deployment") => Self::Deployment(doc),
            ("", "Service") => Self::Service(doc),
            ("networking.k8s.io", "Ingress") => Self::Ingress(doc),
            _ => Self::Opaque(doc),
        }
    }
}

/// Split a multi-document YAML stream and decode every non-empty document.
///
/// # Errors
///
/// Returns a [`ManifestError`] for invalid YAML, a document missing
/// `apiVersion`, `kind` or `metadata.name`, or a stream with no documents.
pub fn parse_documents(raw: &str) -> Result<Vec<Manifest>, ManifestError> {
    let mut manifests = Vec::new();
    for (index, de) in serde_yaml::Deserializer::from_str(raw).enumerate() {
        let body = Value::deserialize(de).map_err(|e| ManifestError::Parse {
            index,
            message: e.to_string(),
        })?;
        if body.is_null() {
            continue;
        }
        let id = resource_id(index, &body)?;
        manifests.push(Manifest::classify(id, body));
    }
    if manifests.is_empty() {
        return Err(ManifestError::Empty);
    }
    Ok(manifests)
}

fn string_field<'v>(
    index: usize,
    body: &'v Value,
    pointer: &str,
    field: &'static str,
) -> Result<&'v str, ManifestError> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ManifestError::MissingField { index, field })
}

fn resource_id(index: usize, body: &Value) -> Result<ResourceId, ManifestError> {
    let api_version = string_field(index, body, "/apiVersion", "apiVersion")?;
    let kind = string_field(index, body, "/kind", "kind")?;
    let name = string_field(index, body, "/metadata/name", "metadata.name")?;

    let (group, version) = match api_version.split_once('/') {
        None => ("", api_version),
        Some((g, v)) if !g.is_empty() && !v.is_empty() && !v.contains('/') => (g, v),
        Some(_) => {
            return Err(ManifestError::BadApiVersion {
                index,
                api_version: api_version.to_string(),
            });
        }
    };

    Ok(ResourceId {
        group: group.to_string(),
        version: version.to_string(),
        resource: plural(group, kind),
        kind: kind.to_string(),
        name: name.to_string(),
    })
}

fn plural(group: &str, kind: &str) -> String {
    match (group, kind) {
        ("networking.k8s.io", "Ingress") => "ingresses".to_string(),
        _ => format!("{}s", kind.to_lowercase()),
    }
}
