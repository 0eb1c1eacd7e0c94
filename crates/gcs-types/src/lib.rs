//! Foundation types for the GCS repository adapter.
//!
//! Every other crate in the workspace depends on `gcs-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- 32-byte MAC naming one immutable resource instance
//! - [`ResourceKind`] -- the three categories of content-addressed resource
//!   (states, packfiles, locks) and their key prefixes

pub mod error;
pub mod hash;
pub mod kind;

pub use error::TypeError;
pub use hash::ContentHash;
pub use kind::ResourceKind;
