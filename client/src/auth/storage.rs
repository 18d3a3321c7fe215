use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::User;

pub(crate) const AUTH_FILE: &str = "auth.json";

/// Everything the client persists between runs: the token pair plus a
/// display-only cache of the user record. Stored as a single JSON document so
/// that logout clears all of it in one operation.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct StoredAuth {
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: String,

    /// Cache only; the profile endpoint is the source of truth and is
    /// re-fetched after every token acquisition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<DateTime<Utc>>,
}

impl StoredAuth {
    /// An access token without its refresh token (or vice versa) is not a
    /// usable session.
    pub fn has_token_pair(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

/// Backend selector for [`create_token_storage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialsStoreMode {
    #[default]
    File,
    /// Process-local storage, for tests and embedded consumers.
    Memory,
}

pub trait TokenStorage: Send + Sync + Debug {
    fn load(&self) -> io::Result<Option<StoredAuth>>;
    fn save(&self, auth: &StoredAuth) -> io::Result<()>;
    /// Returns `Ok(true)` if credentials were present and removed.
    fn delete(&self) -> io::Result<bool>;
}

pub fn create_token_storage(home: PathBuf, mode: CredentialsStoreMode) -> Arc<dyn TokenStorage> {
    match mode {
        CredentialsStoreMode::File => Arc::new(FileTokenStorage::new(home)),
        CredentialsStoreMode::Memory => Arc::new(MemoryTokenStorage::default()),
    }
}

pub(crate) fn get_auth_file(home: &Path) -> PathBuf {
    home.join(AUTH_FILE)
}

#[derive(Debug)]
pub struct FileTokenStorage {
    home: PathBuf,
}

impl FileTokenStorage {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> io::Result<Option<StoredAuth>> {
        let contents = match std::fs::read_to_string(get_auth_file(&self.home)) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let auth = serde_json::from_str::<StoredAuth>(&contents).map_err(io::Error::other)?;
        Ok(Some(auth))
    }

    fn save(&self, auth: &StoredAuth) -> io::Result<()> {
        let json = serde_json::to_string_pretty(auth).map_err(io::Error::other)?;
        let mut options = OpenOptions::new();
        options.truncate(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(get_auth_file(&self.home))?;
        file.write_all(json.as_bytes())?;
        file.flush()
    }

    fn delete(&self) -> io::Result<bool> {
        match std::fs::remove_file(get_auth_file(&self.home)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    inner: Mutex<Option<StoredAuth>>,
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> io::Result<Option<StoredAuth>> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| io::Error::other("credentials store poisoned"))
    }

    fn save(&self, auth: &StoredAuth) -> io::Result<()> {
        self.inner
            .lock()
            .map(|mut guard| *guard = Some(auth.clone()))
            .map_err(|_| io::Error::other("credentials store poisoned"))
    }

    fn delete(&self) -> io::Result<bool> {
        self.inner
            .lock()
            .map(|mut guard| guard.take().is_some())
            .map_err(|_| io::Error::other("credentials store poisoned"))
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used)]

    use super::*;
    use crate::models::Role;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn sample_auth() -> StoredAuth {
        StoredAuth {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            user: Some(User {
                id: 1,
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                role: Role::Student,
                mobile_no: None,
            }),
            last_refresh: Some(Utc::now()),
        }
    }

    #[test]
    fn file_storage_round_trips() {
        let home = tempdir().expect("tempdir");
        let storage = FileTokenStorage::new(home.path().to_path_buf());

        assert_eq!(storage.load().expect("load"), None);
        let auth = sample_auth();
        storage.save(&auth).expect("save");
        assert_eq!(storage.load().expect("load"), Some(auth));

        assert!(storage.delete().expect("delete"));
        assert!(!storage.delete().expect("second delete is a no-op"));
        assert!(!get_auth_file(home.path()).exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_storage_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let home = tempdir().expect("tempdir");
        let storage = FileTokenStorage::new(home.path().to_path_buf());
        storage.save(&sample_auth()).expect("save");

        let metadata = std::fs::metadata(get_auth_file(home.path())).expect("metadata");
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn partial_file_parses_with_empty_tokens() {
        let home = tempdir().expect("tempdir");
        std::fs::write(get_auth_file(home.path()), r#"{"access_token":"only-access"}"#)
            .expect("write");

        let storage = FileTokenStorage::new(home.path().to_path_buf());
        let auth = storage.load().expect("load").expect("present");
        assert!(!auth.has_token_pair());
    }

    #[test]
    fn memory_storage_round_trips() {
        let storage = MemoryTokenStorage::default();
        assert_eq!(storage.load().expect("load"), None);

        let auth = sample_auth();
        storage.save(&auth).expect("save");
        assert_eq!(storage.load().expect("load"), Some(auth));
        assert!(storage.delete().expect("delete"));
        assert_eq!(storage.load().expect("load"), None);
    }
}
