//! Boundary to the deployment engine that materializes manifests on a
//! target cluster.

use std::sync::Arc;

use async_trait::async_trait;
use featurebundle_core::{ClusterRef, FeatureId, ObjectRef, ResourceKind};

use crate::error::DeployError;

/// What a feature hands to the deployment engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePayload {
    /// Configuration objects whose content is rendered onto the cluster.
    pub references: Vec<ObjectRef>,
    /// Feature-level settings (replicas, installation mode, ...).
    pub settings: serde_json::Value,
    /// Kinds the feature is expected to create.
    pub managed_kinds: Vec<ResourceKind>,
}

/// One deploy or undeploy call for one feature of one control resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    pub cluster: ClusterRef,
    /// Name of the control resource on whose behalf the call is made.
    pub consumer: String,
    pub feature: FeatureId,
    /// Prefix to give every policy created on the cluster.
    pub policy_prefix: Option<String>,
    pub payload: FeaturePayload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOutcome {
    /// Kinds actually created or updated on the target cluster.
    pub deployed_kinds: Vec<ResourceKind>,
}

impl DeployOutcome {
    pub fn new(deployed_kinds: Vec<ResourceKind>) -> Self {
        Self { deployed_kinds }
    }
}

/// Deployment engine.
///
/// Both calls are synchronous from the caller's point of view: they return
/// once the cluster accepted or refused the change.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome, DeployError>;

    /// Removes everything `deploy` created for the request's feature.
    async fn undeploy(&self, request: &DeployRequest) -> Result<(), DeployError>;
}

pub type DynDeployer = Arc<dyn Deployer>;
