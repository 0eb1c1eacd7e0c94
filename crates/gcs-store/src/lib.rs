//! Content-addressed repository storage over a flat object namespace.
//!
//! A repository is a configuration blob plus three kinds of immutable,
//! hash-named resources (states, packfiles, locks). This crate maps them
//! onto bucket keys and implements the snapshot engine's storage interface
//! over any [`gcs_client::ObjectStoreClient`].
//!
//! # Key Layout
//!
//! See [`layout`]. Every resource key has a two-level shard structure,
//! `<root>/<prefix>/<first-byte>/<hash>`, so a bucket already holding a
//! repository stays readable.
//!
//! # Design Rules
//!
//! 1. The existence of `<root>/CONFIG` is the only "initialized" signal.
//! 2. `create` never overwrites a configuration, even when racing.
//! 3. A malformed resource key fails the whole `list` call.
//! 4. Errors are propagated, never retried or swallowed here.

pub mod error;
pub mod layout;
pub mod store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use layout::KeyLayout;
pub use store::ContentAddressedStore;
pub use traits::{Mode, RepositoryStore};
