//! Composable persister decorators.
//!
//! Every decorator implements [`Persister`](crate::core::Persister), so they
//! nest freely:
//!
//! | Decorator | Behavior |
//! |-----------|----------|
//! | [`CompositePersister`] | Threads writes through an ordered chain |
//! | [`BufferedPersister`] | Stages index writes and replays them on success |
//! | [`AppendPersister`] | Appends the saved resource to a parent's members |
//! | [`ParentCleanupPersister`] | Removes a deleted resource from its parents |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trellis_persistence::composite::{BufferedPersister, ParentCleanupPersister};
//!
//! let buffered = Arc::new(BufferedPersister::new(sqlite.persister(), index.persister()));
//! let persister = ParentCleanupPersister::new(buffered.clone(), sqlite.query_service());
//!
//! buffered
//!     .buffer_into_index(|p| async move { p.save(&page).await })
//!     .await?;
//! persister.delete(&page).await?;
//! ```

mod append;
mod buffered;
mod chain;
mod cleanup;

pub use append::{AppendPersister, AppendPersisterFactory, ChangeSet, ResourceChangeSet};
pub use buffered::BufferedPersister;
pub use chain::CompositePersister;
pub use cleanup::ParentCleanupPersister;
