//! # featurebundle-storage
//!
//! Resource store abstraction for the featurebundle reconciler.
//!
//! The reconciler never talks to a concrete backend. It reads control
//! resources, their parents and shared configuration objects, and writes
//! status back, all through the [`ResourceStore`] trait. [`InMemoryStore`]
//! is the bundled backend used by tests and the dry-run manager.
//!
//! ## Example
//!
//! ```ignore
//! use featurebundle_storage::{ResourceStore, StoreError};
//!
//! async fn load(store: &dyn ResourceStore, name: &str) -> Result<(), StoreError> {
//!     let Some(bundle) = store.get(name).await? else {
//!         return Ok(()); // vanished, nothing to do
//!     };
//!     let _parent = store.get_parent(&bundle).await?;
//!     Ok(())
//! }
//! ```

mod error;
pub mod memory;
mod traits;

pub use error::StoreError;
pub use memory::{InMemoryStore, StoreSnapshot};
pub use traits::ResourceStore;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn ResourceStore>;
