//! # featurebundle-core
//!
//! Domain types shared by the featurebundle crates.
//!
//! A [`ClusterBundle`] is the control resource: it binds a [`FeatureBundle`]
//! (the parent carrying the declarative [`BundleSpec`]) to one target
//! cluster and records, in its status, one [`FeatureSummary`] per deployed
//! feature. Shared configuration objects are addressed through [`ObjectRef`].

pub mod bundle;
pub mod error;
pub mod feature;
pub mod id;
pub mod reference;

pub use bundle::{
    BundleSpec, BundleStatus, ClusterBundle, ClusterBundleSpec, ClusterRef, FeatureBundle,
    InstallationMode, MonitoringConfig, ObjectMeta, PolicyEngineConfig,
};
pub use error::CoreError;
pub use feature::{FeatureId, FeatureStatus, FeatureSummary, ResourceKind};
pub use id::{POLICY_PREFIX_LENGTH, POLICY_PREFIX_TAG, generate_policy_prefix, is_policy_prefix};
pub use reference::{ConfigKind, ConfigObject, ObjectRef};

/// Finalizer registered on every [`ClusterBundle`] before any feature is deployed.
pub const BUNDLE_FINALIZER: &str = "featurebundle.io/finalizer";
