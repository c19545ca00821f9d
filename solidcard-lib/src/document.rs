//! The profile document and the flattened form derived from it.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Identifier, store::StoreError};

pub const MAILTO: &str = "mailto:";

/// A user's profile as held by the remote store. Every field besides `id` may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    pub id: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_email: Option<Email>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Conventionally a `mailto:` URL
    pub value: Url,
}

impl Email {
    /// Build a `mailto:` email from a display address. Blank input means "no email".
    pub fn from_display(address: &str) -> Result<Option<Self>, StoreError> {
        let address = address.trim();
        let address = address.strip_prefix(MAILTO).unwrap_or(address);
        if address.is_empty() {
            return Ok(None);
        }

        Url::parse(&format!("{MAILTO}{address}"))
            .map(|value| Some(Self { value }))
            .map_err(|e| StoreError::Validation(format!("Invalid email `{address}`: {e}")))
    }

    /// The address as shown to the user, without its `mailto:` scheme and with any
    /// percent-encoding undone.
    pub fn display(&self) -> Cow<'_, str> {
        let value = self.value.as_str();
        let address = value.strip_prefix(MAILTO).unwrap_or(value);

        percent_decode_str(address)
            .decode_utf8()
            .unwrap_or(Cow::Borrowed(address))
    }
}

impl ProfileDocument {
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            name: None,
            has_email: None,
        }
    }

    /// Replace the editable fields with the ones carried by `patch`.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        self.name = Some(patch.name.clone());
        self.has_email = patch.email.clone();
    }
}

/// Full replacement for the editable fields of a [`ProfileDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub id: Identifier,
    pub name: String,
    /// `None` unsets the email
    pub email: Option<Email>,
}

/// The editable, flattened view of a [`ProfileDocument`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub name: String,
    pub email: String,
}

impl From<&ProfileDocument> for FormState {
    fn from(doc: &ProfileDocument) -> Self {
        Self {
            name: doc.name.clone().unwrap_or_default(),
            email: doc
                .has_email
                .as_ref()
                .map(|e| e.display().into_owned())
                .unwrap_or_default(),
        }
    }
}

impl FormState {
    pub fn to_patch(&self, id: &Identifier) -> Result<ProfilePatch, StoreError> {
        Ok(ProfilePatch {
            id: id.clone(),
            name: self.name.clone(),
            email: Email::from_display(&self.email)?,
        })
    }
}
