//! The read-modify-write cycle behind the profile form.
//!
//! [`ProfileEditor`] holds no store of its own. It hands out [`LoadRequest`]s and
//! [`SubmitRequest`]s, the caller runs them against a [`ProfileStore`] however it likes, and
//! feeds the outcome back. Every request is tagged with the editor's generation so outcomes
//! belonging to a previous session are dropped.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    FormState, ProfileDocument, Session,
    session::AuthenticatedFetch,
    store::{FindOne, ProfileStore, StoreError, UpdateQuery},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiState {
    Loading,
    Error(String),
    Ready(ProfileDocument),
    /// A write is in flight. Holds the document as it was before the write.
    Submitting(ProfileDocument),
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    generation: u64,
    query: FindOne,
    fetch: AuthenticatedFetch,
}

#[derive(Debug, Clone)]
pub struct Loaded {
    generation: u64,
    result: Result<ProfileDocument, StoreError>,
}

impl Loaded {
    pub fn result(&self) -> &Result<ProfileDocument, StoreError> {
        &self.result
    }
}

impl LoadRequest {
    pub async fn run(self, store: Arc<dyn ProfileStore>) -> Loaded {
        debug!("Loading profile {}", self.query.where_id);
        Loaded {
            generation: self.generation,
            result: store.find_one(&self.query, &self.fetch).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    generation: u64,
    query: UpdateQuery,
    fetch: AuthenticatedFetch,
}

#[derive(Debug, Clone)]
pub struct Submitted {
    generation: u64,
    result: Result<ProfileDocument, StoreError>,
}

impl Submitted {
    pub fn result(&self) -> &Result<ProfileDocument, StoreError> {
        &self.result
    }
}

impl SubmitRequest {
    pub fn query(&self) -> &UpdateQuery {
        &self.query
    }

    pub async fn run(self, store: Arc<dyn ProfileStore>) -> Submitted {
        debug!("Updating profile {}", self.query.data.id);
        Submitted {
            generation: self.generation,
            result: store.update(&self.query, &self.fetch).await,
        }
    }
}

#[derive(Debug)]
pub struct ProfileEditor {
    session: Option<Session>,
    state: UiState,
    /// The form as seeded from the last document
    seed: FormState,
    form: FormState,
    submit_error: Option<String>,
    generation: u64,
}

impl Default for ProfileEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileEditor {
    pub fn new() -> Self {
        Self {
            session: None,
            state: UiState::Loading,
            seed: FormState::default(),
            form: FormState::default(),
            submit_error: None,
            generation: 0,
        }
    }

    /// Attach the editor to `session`. Returns the load to run, or `None` if the editor is
    /// already bound to this exact session.
    pub fn bind(&mut self, session: Session) -> Option<LoadRequest> {
        if self
            .session
            .as_ref()
            .is_some_and(|current| current.same_as(&session))
        {
            return None;
        }

        self.generation = self.generation.wrapping_add(1);
        self.state = UiState::Loading;
        self.seed = FormState::default();
        self.form = FormState::default();
        self.submit_error = None;

        let request = LoadRequest {
            generation: self.generation,
            query: FindOne::profile(session.identifier()),
            fetch: session.fetch().clone(),
        };
        self.session = Some(session);

        Some(request)
    }

    pub fn loaded(&mut self, loaded: Loaded) {
        if loaded.generation != self.generation {
            debug!("Dropping stale load result");
            return;
        }

        match loaded.result {
            Ok(doc) => {
                info!("Loaded profile {}", doc.id);
                self.reseed(doc);
            }
            Err(e) => {
                warn!(kind = %e.kind(), "Failed to load profile: {e}");
                self.state = UiState::Error(e.to_string());
            }
        }
    }

    /// Start a write of the current form. The editor is `Submitting` once this returns
    /// `Some`. Returns `None` if there is nothing to submit or the form doesn't make a valid
    /// document, in which case [`ProfileEditor::submit_error`] says why.
    pub fn begin_submit(&mut self) -> Option<SubmitRequest> {
        if !self.can_submit() {
            return None;
        }
        let (UiState::Ready(doc), Some(session)) = (&self.state, &self.session) else {
            return None;
        };

        let patch = match self.form.to_patch(&doc.id) {
            Ok(patch) => patch,
            Err(e) => {
                self.submit_error = Some(e.to_string());
                return None;
            }
        };

        let request = SubmitRequest {
            generation: self.generation,
            query: UpdateQuery {
                doc: session.identifier().clone(),
                data: patch,
            },
            fetch: session.fetch().clone(),
        };

        self.submit_error = None;
        self.state = UiState::Submitting(doc.clone());

        Some(request)
    }

    pub fn finish_submit(&mut self, submitted: Submitted) {
        if submitted.generation != self.generation {
            debug!("Dropping stale submit result");
            return;
        }
        let UiState::Submitting(previous) = &self.state else {
            return;
        };

        match submitted.result {
            Ok(doc) => {
                info!("Updated profile {}", doc.id);
                self.reseed(doc);
            }
            Err(e) => {
                warn!(kind = %e.kind(), "Failed to update profile: {e}");
                // Keep the user's edits so they can retry
                self.state = UiState::Ready(previous.clone());
                self.submit_error = Some(e.to_string());
            }
        }
    }

    pub fn set_name(&mut self, name: String) {
        if self.is_ready() {
            self.form.name = name;
        }
    }

    pub fn set_email(&mut self, email: String) {
        if self.is_ready() {
            self.form.email = email;
        }
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.form != self.seed
    }

    pub fn can_submit(&self) -> bool {
        self.is_ready() && self.is_dirty()
    }

    fn is_ready(&self) -> bool {
        matches!(self.state, UiState::Ready(_))
    }

    /// Replace local state with `doc`.
    fn reseed(&mut self, doc: ProfileDocument) {
        self.seed = FormState::from(&doc);
        self.form = self.seed.clone();
        self.submit_error = None;
        self.state = UiState::Ready(doc);
    }
}

#[cfg(test)]
mod test {
    use url::Url;

    use super::*;
    use crate::{Email, Identifier, store::MemoryStore};

    fn id() -> Identifier {
        Identifier::parse("https://u.example/profile").unwrap()
    }

    fn ana() -> ProfileDocument {
        ProfileDocument {
            id: id(),
            name: Some("Ana".into()),
            has_email: Some(Email {
                value: Url::parse("mailto:ana@example.com").unwrap(),
            }),
        }
    }

    fn session() -> Session {
        Session::new(
            id(),
            AuthenticatedFetch::with_client(reqwest::Client::new(), None),
        )
    }

    async fn loaded_editor(store: &MemoryStore) -> ProfileEditor {
        let mut editor = ProfileEditor::new();
        let request = editor.bind(session()).unwrap();
        editor.loaded(request.run(Arc::new(store.clone())).await);
        editor
    }

    async fn submit(editor: &mut ProfileEditor, store: &MemoryStore) {
        let request = editor.begin_submit().unwrap();
        editor.finish_submit(request.run(Arc::new(store.clone())).await);
    }

    #[tokio::test]
    async fn test_load() {
        let store = MemoryStore::with_document(ana());
        let editor = loaded_editor(&store).await;

        assert_eq!(editor.state(), &UiState::Ready(ana()));
        assert_eq!(
            editor.form(),
            &FormState {
                name: "Ana".into(),
                email: "ana@example.com".into()
            }
        );
    }

    #[tokio::test]
    async fn test_load_failure() {
        let store = MemoryStore::with_document(ana());
        store.fail_reads(Some(StoreError::NotFound("not found".into())));

        let editor = loaded_editor(&store).await;

        assert_eq!(editor.state(), &UiState::Error("not found".into()));
        assert!(!editor.can_submit());
    }

    #[tokio::test]
    async fn test_unchanged_round_trip() {
        let store = MemoryStore::with_document(ana());
        let mut editor = loaded_editor(&store).await;
        let original = editor.form().clone();

        // Change a field, then write the original values back through the editor
        editor.set_name("Bo".into());
        submit(&mut editor, &store).await;
        editor.set_name(original.name.clone());
        submit(&mut editor, &store).await;

        assert_eq!(store.writes(), 2);
        assert_eq!(store.get(&id()), Some(ana()));
        assert_eq!(editor.state(), &UiState::Ready(ana()));
        assert_eq!(editor.form(), &original);

        let reloaded = loaded_editor(&store).await;
        assert_eq!(reloaded.state(), &UiState::Ready(ana()));
        assert_eq!(reloaded.form(), &original);
    }

    #[tokio::test]
    async fn test_dirty_gating() {
        let store = MemoryStore::with_document(ana());
        let mut editor = loaded_editor(&store).await;

        assert!(!editor.can_submit());
        assert!(editor.begin_submit().is_none());

        editor.set_email("ana@elsewhere.example".into());
        assert!(editor.can_submit());

        editor.set_email("ana@example.com".into());
        assert!(!editor.can_submit());
    }

    #[tokio::test]
    async fn test_submit_blocks_edits_and_resubmits() {
        let store = MemoryStore::with_document(ana());
        let mut editor = loaded_editor(&store).await;

        editor.set_name("Bo".into());
        let request = editor.begin_submit().unwrap();

        assert_eq!(editor.state(), &UiState::Submitting(ana()));
        assert!(!editor.can_submit());
        assert!(editor.begin_submit().is_none());
        editor.set_name("Cy".into());
        assert_eq!(editor.form().name, "Bo");

        editor.finish_submit(request.run(Arc::new(store.clone())).await);

        assert_eq!(store.writes(), 1);
        let UiState::Ready(doc) = editor.state() else {
            panic!("editor should be ready after a write");
        };
        assert_eq!(doc.name.as_deref(), Some("Bo"));
        assert!(!editor.is_dirty());
    }

    #[tokio::test]
    async fn test_empty_email_unsets() {
        let store = MemoryStore::with_document(ana());
        let mut editor = loaded_editor(&store).await;

        editor.set_email("".into());
        submit(&mut editor, &store).await;

        let stored = store.get(&id()).unwrap();
        assert_eq!(stored.has_email, None);
        assert_eq!(editor.form().email, "");
    }

    #[tokio::test]
    async fn test_write_failure_restores_form() {
        let store = MemoryStore::with_document(ana());
        let mut editor = loaded_editor(&store).await;
        store.fail_writes(Some(StoreError::Permission("403 Forbidden".into())));

        editor.set_name("Bo".into());
        submit(&mut editor, &store).await;

        assert_eq!(editor.state(), &UiState::Ready(ana()));
        assert_eq!(editor.submit_error(), Some("403 Forbidden"));
        assert_eq!(editor.form().name, "Bo");
        assert!(editor.can_submit());
        assert_eq!(store.get(&id()), Some(ana()));
    }

    #[tokio::test]
    async fn test_rebind_same_session() {
        let store = MemoryStore::with_document(ana());
        let mut editor = ProfileEditor::new();
        let current = session();

        let request = editor.bind(current.clone()).unwrap();
        editor.loaded(request.run(Arc::new(store.clone())).await);

        assert!(editor.bind(current).is_none());
        assert_eq!(editor.state(), &UiState::Ready(ana()));

        // A new fetch capability reloads
        assert!(editor.bind(session()).is_some());
        assert_eq!(editor.state(), &UiState::Loading);
    }

    #[tokio::test]
    async fn test_rebind_other_identifier() {
        let store = MemoryStore::with_document(ana());
        let mut editor = ProfileEditor::new();
        let current = session();

        let request = editor.bind(current.clone()).unwrap();
        editor.loaded(request.run(Arc::new(store.clone())).await);
        assert_eq!(editor.state(), &UiState::Ready(ana()));

        // Same fetch capability, different WebID
        let other = Identifier::parse("https://bo.example/profile").unwrap();
        let request = editor
            .bind(Session::new(other.clone(), current.fetch().clone()))
            .unwrap();

        assert_eq!(editor.state(), &UiState::Loading);
        assert_eq!(editor.form(), &FormState::default());
        assert_eq!(request.query, FindOne::profile(&other));
    }

    #[tokio::test]
    async fn test_stale_load_dropped() {
        let store = MemoryStore::with_document(ana());
        let mut editor = ProfileEditor::new();

        let stale = editor.bind(session()).unwrap();
        let current = editor.bind(session()).unwrap();

        store.fail_reads(Some(StoreError::Network("offline".into())));
        editor.loaded(stale.run(Arc::new(store.clone())).await);
        assert_eq!(editor.state(), &UiState::Loading);

        store.fail_reads(None);
        editor.loaded(current.run(Arc::new(store.clone())).await);
        assert_eq!(editor.state(), &UiState::Ready(ana()));
    }
}
