//! Content hashing of feature configuration.
//!
//! A feature is redeployed only when the hash of its inputs differs from the
//! one stored in its summary. The input is the feature's settings plus the
//! data of every referenced configuration object present in the store.

use std::collections::BTreeMap;

use featurebundle_core::{BundleSpec, FeatureId};
use featurebundle_storage::DynStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ReconcileError;
use crate::features::Feature;

#[derive(Serialize)]
struct HashInput<'a> {
    feature: FeatureId,
    settings: &'a serde_json::Value,
    objects: Vec<HashedObject>,
}

#[derive(Serialize)]
struct HashedObject {
    key: String,
    data: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct ChangeDetector {
    store: DynStore,
}

impl ChangeDetector {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Hash returned for features the bundle spec does not declare.
    pub fn unconfigured_hash() -> Vec<u8> {
        Sha256::digest(b"").to_vec()
    }

    /// Computes the content hash of `feature` as configured by `spec`.
    ///
    /// Referenced objects missing from the store are skipped.
    pub async fn compute_hash(
        &self,
        feature: &dyn Feature,
        spec: &BundleSpec,
    ) -> Result<Vec<u8>, ReconcileError> {
        if !feature.is_configured(spec) {
            return Ok(Self::unconfigured_hash());
        }

        let mut references = feature.references(spec);
        references.sort();
        references.dedup();

        let mut objects = Vec::with_capacity(references.len());
        for reference in &references {
            match self.store.get_config_object(reference).await? {
                Some(object) => objects.push(HashedObject {
                    key: reference.key(),
                    data: object.data,
                }),
                None => {
                    debug!(feature = %feature.id(), reference = %reference, "Referenced object not found; skipping");
                }
            }
        }

        let settings = feature.settings(spec);
        let input = HashInput {
            feature: feature.id(),
            settings: &settings,
            objects,
        };
        let bytes = serde_json::to_vec(&input).map_err(featurebundle_core::CoreError::from)?;
        Ok(Sha256::digest(&bytes).to_vec())
    }
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}
