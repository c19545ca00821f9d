//! Sessions: who the user is and how to make requests on their behalf.

use std::{
    fmt::{self, Debug, Formatter},
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use getset::Getters;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{CoreConfig, Error, Identifier, Result, fs::state_dir};

const FILE_NAME: &str = "session.toml";

/// A credential-bearing request function.
///
/// Clones share the same underlying client; [`AuthenticatedFetch::same_as`] tells whether two
/// handles are the same capability.
#[derive(Clone)]
pub struct AuthenticatedFetch {
    inner: Arc<FetchInner>,
}

struct FetchInner {
    client: reqwest::Client,
    token: Option<String>,
}

impl AuthenticatedFetch {
    pub fn new(cfg: &CoreConfig, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .user_agent(cfg.user_agent.clone())
            .build()?;

        Ok(Self::with_client(client, token))
    }

    pub fn with_client(client: reqwest::Client, token: Option<String>) -> Self {
        Self {
            inner: Arc::new(FetchInner { client, token }),
        }
    }

    /// Start a request carrying this capability's credentials.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match &self.inner.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub fn same_as(&self, other: &AuthenticatedFetch) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for AuthenticatedFetch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedFetch")
            .field("authenticated", &self.inner.token.is_some())
            .finish()
    }
}

/// An authenticated session, passed explicitly to everything that talks to the pod.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Session {
    identifier: Identifier,
    fetch: AuthenticatedFetch,
}

impl Session {
    pub fn new(identifier: Identifier, fetch: AuthenticatedFetch) -> Self {
        Self { identifier, fetch }
    }

    /// Whether `other` would need the profile to be loaded again.
    pub fn same_as(&self, other: &Session) -> bool {
        self.identifier == other.identifier && self.fetch.same_as(&other.fetch)
    }
}

/// Ends a session. Callers are expected to throw away all state derived from the session
/// once this resolves.
#[async_trait]
pub trait SessionTerminator: Send + Sync {
    async fn logout(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Credentials {
    webid: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Persists the credentials handed over by the identity provider between runs.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Session file in the user's state directory.
    pub fn new() -> Result<Self> {
        Ok(Self::at(state_dir()?.join(FILE_NAME)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a WebID and the access token issued for it.
    pub fn login(&self, webid: Identifier, token: Option<String>) -> Result<()> {
        let contents = toml::to_string_pretty(&Credentials {
            webid: webid.clone(),
            token,
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        create_private(&self.path)?.write_all(contents.as_bytes())?;

        info!("Logged in as {webid}");

        Ok(())
    }

    /// Build a [`Session`] from the stored credentials, or `None` if nobody is logged in.
    pub fn load(&self, cfg: &CoreConfig) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let credentials: Credentials =
            toml::from_str(&contents).map_err(|source| Error::Deserialize {
                file: self.path.display().to_string(),
                source,
            })?;

        let fetch = AuthenticatedFetch::new(cfg, credentials.token)?;
        Ok(Some(Session::new(credentials.webid, fetch)))
    }

    /// Like [`FileSessionStore::load`], but a missing session is an error.
    pub fn require(&self, cfg: &CoreConfig) -> Result<Session> {
        self.load(cfg)?.ok_or(Error::NoSession)
    }
}

/// Open `path` for writing so that only the current user can read it. The file holds a
/// bearer token.
#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies to newly created files
    file.set_permissions(fs::Permissions::from_mode(0o600))?;

    Ok(file)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[async_trait]
impl SessionTerminator for FileSessionStore {
    async fn logout(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Logged out");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No session to remove at {}", self.path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;

    fn webid() -> Identifier {
        Identifier::parse("https://u.example/profile/card#me").unwrap()
    }

    #[test]
    fn test_load_without_login() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::at(dir.path().join(FILE_NAME));

        assert!(store.load(&CoreConfig::default()).unwrap().is_none());
        assert!(matches!(
            store.require(&CoreConfig::default()),
            Err(Error::NoSession)
        ));
    }

    #[test]
    fn test_login_then_load() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::at(dir.path().join(FILE_NAME));

        store.login(webid(), Some("secret".into())).unwrap();
        let session = store.load(&CoreConfig::default()).unwrap().unwrap();

        assert_eq!(session.identifier(), &webid());
        assert!(!format!("{:?}", session.fetch()).contains("secret"));
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);

        // A file left behind with looser permissions gets tightened too
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSessionStore::at(&path);
        store.login(webid(), Some("secret".into())).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(store.load(&CoreConfig::default()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_logout() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::at(dir.path().join(FILE_NAME));
        store.login(webid(), None).unwrap();

        store.logout().await.unwrap();

        assert!(!store.path().exists());
        // Logging out twice is fine
        store.logout().await.unwrap();
    }

    #[test]
    fn test_same_session() {
        let fetch = AuthenticatedFetch::with_client(reqwest::Client::new(), None);
        let a = Session::new(webid(), fetch.clone());
        let b = Session::new(webid(), fetch);
        let c = Session::new(
            webid(),
            AuthenticatedFetch::with_client(reqwest::Client::new(), None),
        );

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }
}
