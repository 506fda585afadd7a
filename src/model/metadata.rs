use crate::digest::digest;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// The kind of evidence a [`DependencyRecord`] carries.
///
/// Serialized as the `type` string of the label schema. Unrecognized types
/// round-trip through [`DependencyKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DependencyKind {
    DebianPackages,
    RpmPackages,
    BuildProvenance,
    GitRepository,
    Archive,
    Other(String),
}

impl DependencyKind {
    pub fn as_str(&self) -> &str {
        match self {
            DependencyKind::DebianPackages => "debian_package_list",
            DependencyKind::RpmPackages => "rpm_package_list",
            DependencyKind::BuildProvenance => "build_provenance",
            DependencyKind::GitRepository => "git_repository",
            DependencyKind::Archive => "archive",
            DependencyKind::Other(tag) => tag,
        }
    }

    /// Returns true for kinds that every scan computes afresh.
    ///
    /// The remaining kinds are appended by preprocessing outside a scan and are
    /// carried forward from the embedded label.
    pub fn is_recomputed(&self) -> bool {
        matches!(
            self,
            DependencyKind::DebianPackages | DependencyKind::RpmPackages | DependencyKind::BuildProvenance
        )
    }

    /// The kinds reconciled field by field during a merge, in output order.
    pub fn recomputed() -> [DependencyKind; 3] {
        [
            DependencyKind::DebianPackages,
            DependencyKind::RpmPackages,
            DependencyKind::BuildProvenance,
        ]
    }
}

impl From<String> for DependencyKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "debian_package_list" => DependencyKind::DebianPackages,
            "rpm_package_list" => DependencyKind::RpmPackages,
            "build_provenance" => DependencyKind::BuildProvenance,
            "git_repository" => DependencyKind::GitRepository,
            "archive" => DependencyKind::Archive,
            _ => DependencyKind::Other(tag),
        }
    }
}

impl From<DependencyKind> for String {
    fn from(kind: DependencyKind) -> Self {
        match kind {
            DependencyKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a dependency's evidence came from, with a content-addressed version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    pub source: DependencySource,
}

impl DependencyRecord {
    /// Builds a record from a freshly extracted payload, stamping
    /// `version["sha256"]` with the payload's canonical digest.
    pub fn from_payload<T: Serialize>(
        kind: DependencyKind,
        source_kind: impl Into<String>,
        payload: &T,
    ) -> Result<Self> {
        let sha256 = digest(payload)?;
        let metadata = serde_json::to_value(payload).map_err(Error::Digest)?;

        let mut version = BTreeMap::new();
        version.insert("sha256".to_string(), serde_json::Value::String(sha256));

        Ok(Self {
            kind,
            source: DependencySource {
                kind: source_kind.into(),
                version,
                metadata,
            },
        })
    }

    /// The `sha256` version stamp, if present.
    pub fn sha256(&self) -> Option<&str> {
        self.source.version.get("sha256").and_then(|v| v.as_str())
    }
}

/// A tool or process that contributed to the metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub name: String,
    pub version: String,
    pub url: String,
}

impl Provenance {
    pub fn new(name: impl Into<String>, version: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            url: url.into(),
        }
    }
}

/// The metadata record embedded in an image label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub base: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRecord>,
}

impl MetadataSnapshot {
    /// Parses a snapshot from the JSON stored under label `key`.
    pub fn from_label(key: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| Error::Label {
            key: key.to_string(),
            source,
        })
    }

    /// Renders the snapshot as label JSON.
    pub fn to_label(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Digest)
    }

    /// Returns the first dependency of the given kind.
    pub fn dependency(&self, kind: &DependencyKind) -> Option<&DependencyRecord> {
        self.dependencies.iter().find(|d| &d.kind == kind)
    }
}

/// A concern where the embedded label and the fresh scan disagreed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    Base,
    Dependency(DependencyKind),
}

impl Warning {
    pub fn tag(&self) -> &str {
        match self {
            Warning::Base => "base",
            Warning::Dependency(kind) => kind.as_str(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::Base => write!(f, "base image identity differs from the embedded label"),
            Warning::Dependency(kind) => {
                write!(f, "{} differs from the embedded label; the fresh scan wins", kind)
            }
        }
    }
}

impl Serialize for Warning {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}
