//! References to shared configuration objects.
//!
//! Several [`ClusterBundle`](crate::ClusterBundle)s may consume the same
//! configuration object. An [`ObjectRef`] identifies such an object by kind,
//! namespace and name; it carries no payload.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Kind of a shared configuration object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfigKind {
    /// Cluster-scoped role policy definition.
    PolicyRole,
    /// Namespaced key/value configuration map.
    ConfigMap,
}

impl ConfigKind {
    /// Returns `true` if objects of this kind live inside a namespace.
    pub fn is_namespaced(&self) -> bool {
        matches!(self, Self::ConfigMap)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyRole => "PolicyRole",
            Self::ConfigMap => "ConfigMap",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PolicyRole" => Ok(Self::PolicyRole),
            "ConfigMap" => Ok(Self::ConfigMap),
            other => Err(CoreError::invalid_reference(format!(
                "unknown configuration kind '{other}'"
            ))),
        }
    }
}

/// Identifier of a shared configuration object.
///
/// The textual key is `<kind>-<namespace>-<name>`, or `<kind>-<name>` for
/// cluster-scoped objects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ConfigKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: ConfigKind, namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.filter(|ns| !ns.is_empty()),
            name: name.into(),
        }
    }

    /// Reference to a cluster-scoped policy role.
    pub fn policy_role(name: impl Into<String>) -> Self {
        Self::new(ConfigKind::PolicyRole, None, name)
    }

    /// Reference to a namespaced configuration map.
    pub fn config_map(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ConfigKind::ConfigMap, Some(namespace.into()), name)
    }

    /// Textual index key for this reference.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}-{}-{}", self.kind, ns, self.name),
            None => write!(f, "{}-{}", self.kind, self.name),
        }
    }
}

/// A shared configuration object as read from the resource store.
///
/// `data` is ordered so that serializing it is stable across processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigObject {
    pub kind: ConfigKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigObject {
    pub fn new(reference: &ObjectRef) -> Self {
        Self {
            kind: reference.kind,
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Reference addressing this object.
    pub fn reference(&self) -> ObjectRef {
        ObjectRef::new(self.kind, self.namespace.clone(), self.name.clone())
    }
}
