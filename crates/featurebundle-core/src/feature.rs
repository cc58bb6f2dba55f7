//! Feature identifiers and per-feature status summaries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Identifier of an independently deployable feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureId {
    /// Role policies.
    Roles,
    /// Policy-engine configuration.
    PolicyEngine,
    /// Monitoring stack.
    Monitoring,
}

impl FeatureId {
    /// Returns all features in deployment order.
    pub fn all() -> &'static [FeatureId] {
        &[Self::Roles, Self::PolicyEngine, Self::Monitoring]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roles => "Roles",
            Self::PolicyEngine => "PolicyEngine",
            Self::Monitoring => "Monitoring",
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Roles" => Ok(Self::Roles),
            "PolicyEngine" => Ok(Self::PolicyEngine),
            "Monitoring" => Ok(Self::Monitoring),
            other => Err(CoreError::unknown_feature(other)),
        }
    }
}

/// Lifecycle status of a feature on its target cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureStatus {
    Provisioning,
    Provisioned,
    Failed,
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Provisioned => write!(f, "Provisioned"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Kind of a resource materialized on the target cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

/// Formats as `Kind.version.group`, or `Kind.version` for the core group.
impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.kind, self.version)
        } else {
            write!(f, "{}.{}.{}", self.kind, self.version, self.group)
        }
    }
}

/// Deployment state of one feature, stored in the bundle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    pub feature_id: FeatureId,
    pub status: FeatureStatus,
    /// Content hash of the configuration last recorded for this feature.
    #[serde(with = "hex_bytes", default)]
    pub hash: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deployed_kinds: Vec<String>,
}

impl FeatureSummary {
    pub fn new(feature_id: FeatureId, status: FeatureStatus) -> Self {
        Self {
            feature_id,
            status,
            hash: Vec::new(),
            failure_message: None,
            failure_reason: None,
            deployed_kinds: Vec::new(),
        }
    }

    pub fn with_hash(mut self, hash: Vec<u8>) -> Self {
        self.hash = hash;
        self
    }

    pub fn is_provisioned(&self) -> bool {
        self.status == FeatureStatus::Provisioned
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
