//! Login state that survives between runs.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    api::OptoComClient,
    error::ClientError,
    models::{Credentials, UserProfile},
    state::AppState,
    traits::TokenStore,
};

/// Bearer token kept in a plain file under the user's data directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/optocom/token`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("optocom")
            .join("token")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// An API client paired with the store its token lives in.
pub struct Session<T: TokenStore> {
    client: OptoComClient,
    store: T,
}

impl<T: TokenStore> Session<T> {
    pub fn new(client: OptoComClient, store: T) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &OptoComClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut OptoComClient {
        &mut self.client
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn is_logged_in(&self) -> bool {
        self.client.is_authenticated()
    }

    /// Resume a stored session.
    ///
    /// Returns `Ok(None)` when no token is stored, or when the stored token
    /// was rejected (it is cleared). Transport failures are returned and the
    /// token is kept.
    pub async fn restore(&mut self) -> Result<Option<UserProfile>, ClientError> {
        let Some(token) = self.store.load()? else {
            return Ok(None);
        };
        self.client.set_token(Some(token));

        match self.client.current_user().await {
            Ok(user) => {
                tracing::debug!(username = %user.username, "Restored session");
                Ok(Some(user))
            }
            Err(ClientError::Unauthorized) => {
                tracing::warn!("Stored token rejected, logging out");
                self.logout()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Log in, persist the token, and fetch the profile.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<UserProfile, ClientError> {
        self.client.set_token(None);
        let token = self.client.login(credentials).await?;
        self.store.save(&token)?;
        self.client.set_token(Some(token));

        let user = self.client.current_user().await?;
        tracing::info!(username = %user.username, "Logged in");
        Ok(user)
    }

    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.client.set_token(None);
        self.store.clear()?;
        Ok(())
    }

    /// Pass `result` through, forcing a silent logout on a 401.
    pub fn check<R>(
        &mut self,
        state: &mut AppState,
        result: Result<R, ClientError>,
    ) -> Result<R, ClientError> {
        if let Err(ClientError::Unauthorized) = &result {
            tracing::warn!("Session expired, logging out");
            if let Err(e) = self.logout() {
                tracing::warn!(error = %e, "Failed to clear stored token");
            }
            state.sign_out();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{config::NetworkConfig, traits::MemoryTokenStore};

    fn client() -> OptoComClient {
        OptoComClient::new("http://localhost:8000", &NetworkConfig::default()).unwrap()
    }

    // ==================== FileTokenStore Tests ====================

    #[test]
    fn test_file_store_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_roundtrip_creates_parent() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token"));

        store.save("abc.def").unwrap();
        assert_eq!(store.load().unwrap(), Some("abc.def".to_string()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_blank_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token");
        fs::write(&path, "  \n").unwrap();
        assert_eq!(FileTokenStore::new(path).load().unwrap(), None);
    }

    #[test]
    fn test_default_path_ends_with_token() {
        let path = FileTokenStore::default_path();
        assert!(path.ends_with("optocom/token"));
    }

    // ==================== Session Tests ====================

    #[tokio::test]
    async fn test_restore_without_token() {
        let mut session = Session::new(client(), MemoryTokenStore::new());
        assert_eq!(session.restore().await.unwrap(), None);
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_check_unauthorized_forces_logout() {
        let store = MemoryTokenStore::with_token("expired");
        let mut session = Session::new(client(), store.clone());
        session.client_mut().set_token(Some("expired".to_string()));

        let mut state = AppState::default();
        state.sign_in(UserProfile {
            id: Some(1),
            username: "optom".to_string(),
            email: None,
            practice_name: None,
        });

        let result: Result<(), _> = session.check(&mut state, Err(ClientError::Unauthorized));

        assert!(result.unwrap_err().is_unauthorized());
        assert!(!session.is_logged_in());
        assert_eq!(store.current(), None);
        assert!(state.user().is_none());
    }

    #[test]
    fn test_check_other_errors_keep_session() {
        let store = MemoryTokenStore::with_token("t");
        let mut session = Session::new(client(), store.clone());
        session.client_mut().set_token(Some("t".to_string()));
        let mut state = AppState::default();

        let result: Result<(), _> = session.check(
            &mut state,
            Err(ClientError::Decode("bad json".to_string())),
        );

        assert!(result.is_err());
        assert!(session.is_logged_in());
        assert_eq!(store.current(), Some("t".to_string()));
    }
}
