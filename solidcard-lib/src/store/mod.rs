//! Query interface to the remote document store.
//!
//! Both operations take the [`AuthenticatedFetch`] they should run with, so that two editors
//! bound to different sessions never share request state.

use async_trait::async_trait;
use strum::{Display, EnumIs};
use thiserror::Error;

use crate::{Identifier, ProfileDocument, ProfilePatch, session::AuthenticatedFetch};

mod http;
mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

/// Failures reported by a [`ProfileStore`]. Every variant displays its message verbatim so
/// it can be shown to the user as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Malformed(String),
    #[error("{0}")]
    Server(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIs)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Permission,
    NotFound,
    Validation,
    Malformed,
    Server,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Network(_) => ErrorKind::Network,
            StoreError::Permission(_) => ErrorKind::Permission,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Malformed(_) => ErrorKind::Malformed,
            StoreError::Server(_) => ErrorKind::Server,
        }
    }
}

/// Read the node whose `@id` is `where_id` out of the document at `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOne {
    pub from: Identifier,
    pub where_id: Identifier,
}

impl FindOne {
    /// The profile query: the identifier's own node in the identifier's own document.
    pub fn profile(id: &Identifier) -> Self {
        Self {
            from: id.clone(),
            where_id: id.clone(),
        }
    }
}

/// Replace the editable fields of `data.id` inside the document at `doc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateQuery {
    pub doc: Identifier,
    pub data: ProfilePatch,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_one(
        &self,
        query: &FindOne,
        fetch: &AuthenticatedFetch,
    ) -> Result<ProfileDocument, StoreError>;

    /// Apply `query` and return the store's canonical post-write document. A failed update
    /// leaves the remote document untouched.
    async fn update(
        &self,
        query: &UpdateQuery,
        fetch: &AuthenticatedFetch,
    ) -> Result<ProfileDocument, StoreError>;
}
