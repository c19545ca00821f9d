use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Identifier must not be empty")]
    Empty,
    #[error("Identifier is not an absolute URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Identifier must use http or https, found `{0}`")]
    Scheme(String),
}

/// A WebID: names both the user and the location of their profile document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct Identifier(Url);

impl Identifier {
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IdentifierError::Empty);
        }

        let url = Url::parse(input)?;
        match url.scheme() {
            "http" | "https" => Ok(Self(url)),
            other => Err(IdentifierError::Scheme(other.into())),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// URL of the document holding this identifier's profile, i.e. the identifier without
    /// its fragment.
    pub fn document(&self) -> Url {
        let mut doc = self.0.clone();
        doc.set_fragment(None);
        doc
    }

    /// Resolve a fragment against the profile document, e.g. `#email`.
    pub fn sibling(&self, fragment: &str) -> Url {
        let mut url = self.document();
        url.set_fragment(Some(fragment));
        url
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0.into()
    }
}
