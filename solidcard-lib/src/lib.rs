//! Profile synchronization for Solid pods.
//!
//! A user's profile lives in a linked-data document addressed by their WebID. This crate
//! loads that document, tracks edits made to it through a [`ProfileEditor`], and writes the
//! edited fields back in a single request.

use thiserror::Error;

pub mod config;
pub mod document;
pub mod editor;
pub mod fs;
pub mod identifier;
pub mod session;
pub mod store;

pub use config::{Cfg, CoreConfig};
pub use document::{Email, FormState, ProfileDocument, ProfilePatch};
pub use editor::{ProfileEditor, UiState};
pub use identifier::Identifier;
pub use session::{AuthenticatedFetch, FileSessionStore, Session, SessionTerminator};
pub use store::{ErrorKind, FindOne, ProfileStore, StoreError, UpdateQuery};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identifier(#[from] identifier::IdentifierError),
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse {file}: {source}")]
    Deserialize {
        file: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("No session found, log in first")]
    NoSession,
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
