//! FBR digital invoicing gateway: reference-data client and offline tables.

pub mod api_types;
pub mod client;
pub mod credentials;
pub mod error;
pub mod fallback;
pub mod types;

pub use client::{FbrClient, RemoteFetch};
pub use error::FetchError;
pub use types::{Environment, ReferenceEntry, ReferenceKind, SlotKey};
