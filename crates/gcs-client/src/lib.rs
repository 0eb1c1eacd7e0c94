//! Object-store client boundary for the GCS repository adapter.
//!
//! The cloud client itself lives outside this workspace. This crate defines
//! the capability the adapter needs from it ([`ObjectStoreClient`]), how a
//! client is obtained from parsed parameters ([`Connector`], [`StoreConfig`]),
//! and the once-only connection guard shared by the store, importer and
//! exporter ([`Connection`]).
//!
//! [`InMemoryObjectClient`] implements the trait over a `BTreeMap` for tests
//! and embedding. It pages listings and can inject failures.

pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod traits;

pub use config::{CredentialSource, StoreConfig};
pub use connection::{Connection, Connector, SharedClientConnector};
pub use error::{ClientError, ClientResult, ConfigError};
pub use memory::InMemoryObjectClient;
pub use traits::{ByteRange, ListPage, ObjectBody, ObjectInfo, ObjectStoreClient};
