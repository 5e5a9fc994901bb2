use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::api::{self, ApiRequest, Backend};
use crate::error::ApiError;
use crate::models::LoginGrant;

/// Credential held for the lifetime of one signed-in user.
///
/// Passed explicitly to whatever talks to the backend. `init` on a
/// successful login, `teardown` on logout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    token: Option<String>,
    role: Option<String>,
}

impl Session {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            role: None,
        }
    }

    /// Reads a saved session; a missing file is an anonymous session.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("session file {} is not valid", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self).context("failed to serialize session")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write session file {}", path.display()))
    }

    pub fn init(&mut self, grant: LoginGrant) {
        self.token = Some(grant.token);
        self.role = grant.role;
    }

    pub fn teardown(&mut self) {
        self.token = None;
        self.role = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

pub async fn login<B: Backend>(
    backend: &B,
    username: &str,
    password: &str,
) -> Result<LoginGrant, ApiError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ApiError::precondition("Please enter a username and password."));
    }
    api::fetch(backend, &ApiRequest::login(username, password)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn init_and_teardown_bracket_the_credential() {
        let mut session = Session::default();
        assert!(!session.is_authenticated());

        session.init(LoginGrant {
            token: "fake-jwt-token".to_string(),
            role: Some("admin".to_string()),
        });
        assert_eq!(session.token(), Some("fake-jwt-token"));
        assert_eq!(session.role(), Some("admin"));

        session.teardown();
        assert!(!session.is_authenticated());
        assert!(session.role().is_none());
    }

    #[test]
    fn saved_session_loads_back() {
        let path = std::env::temp_dir().join(format!(
            "vax-session-{}.json",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        assert_eq!(Session::load(&path).unwrap(), Session::default());

        let session = Session::with_token("abc");
        session.save(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), session);

        let _ = std::fs::remove_file(path);
    }
}
