//! # featurebundle-controller
//!
//! Reconciliation engine for feature bundles.
//!
//! A [`Reconciler`] drives one control resource at a time through its
//! lifecycle: it registers a finalizer, keeps the [`ReferenceIndex`] in sync
//! with the configuration objects the resource consumes, and deploys each
//! feature whose content hash changed. Deletion undeploys everything before
//! the finalizer is released.
//!
//! The deployment engine and the resource store are external and reached
//! through the [`Deployer`] and
//! [`ResourceStore`](featurebundle_storage::ResourceStore) traits.

pub mod config;
pub mod deployer;
pub mod error;
pub mod features;
pub mod hash;
pub mod observability;
pub mod orchestrator;
pub mod reconciler;
pub mod references;
pub mod runner;
pub mod scope;

pub use config::{ConfigError, ControllerConfig, LoggingConfig, ReconcileSettings};
pub use deployer::{DeployOutcome, DeployRequest, Deployer, DynDeployer, FeaturePayload};
pub use error::{DeployError, DeployErrorKind, ReconcileError};
pub use features::{DynFeature, Feature, FeatureTable};
pub use hash::ChangeDetector;
pub use orchestrator::{FeatureAction, FeatureOrchestrator};
pub use reconciler::{Action, ReconcileOutcome, Reconciler};
pub use references::ReferenceIndex;
pub use runner::{ReconcileRunner, RunReport};
pub use scope::StatusScope;
