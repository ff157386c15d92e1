use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use activity_feed_api::auth::AuthProvider;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::Config;
use crate::config::FEED_TOKEN_ENV_VAR;
use crate::error::FeedError;

pub const AUTH_JSON_FILE: &str = "auth.json";

/// Sign-in capability injected into a feed session. The session only asks
/// whether a user is signed in and, if not, asks the implementation to make
/// that happen.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn is_signed_in(&self) -> bool;

    /// Try to reach a signed-in state. Fails with
    /// [`FeedError::AuthRequired`] when that is not possible without the
    /// user.
    async fn initiate_sign_in(&self) -> Result<(), FeedError>;
}

/// Contents of `$ACTIVITY_FEED_HOME/auth.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDotJson {
    pub token: String,
}

/// Bearer-token sign-in. The token comes from the environment, then the
/// `token` config key, then `auth.json`.
#[derive(Debug)]
pub struct TokenAuth {
    feed_home: PathBuf,
    env_token: Option<String>,
    config_token: Option<String>,
    token: Mutex<Option<String>>,
}

impl TokenAuth {
    pub fn new(feed_home: PathBuf, env_token: Option<String>, config_token: Option<String>) -> Self {
        let auth = Self {
            feed_home,
            env_token: env_token.and_then(non_blank),
            config_token: config_token.and_then(non_blank),
            token: Mutex::new(None),
        };
        let token = auth.resolve();
        *auth.token.lock().unwrap_or_else(PoisonError::into_inner) = token;
        auth
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.feed_home.clone(),
            std::env::var(FEED_TOKEN_ENV_VAR).ok(),
            config.token.clone(),
        )
    }

    fn resolve(&self) -> Option<String> {
        if let Some(token) = &self.env_token {
            return Some(token.clone());
        }
        if let Some(token) = &self.config_token {
            return Some(token.clone());
        }
        match load_auth(&self.feed_home) {
            Ok(auth) => auth.and_then(|auth| non_blank(auth.token)),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable {AUTH_JSON_FILE}");
                None
            }
        }
    }

    fn current(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Authenticator for TokenAuth {
    fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    async fn initiate_sign_in(&self) -> Result<(), FeedError> {
        let token = self.resolve();
        let signed_in = token.is_some();
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token;
        if signed_in {
            debug!("signed in with bearer token");
            Ok(())
        } else {
            Err(FeedError::AuthRequired)
        }
    }
}

impl AuthProvider for TokenAuth {
    fn bearer_token(&self) -> Option<String> {
        self.current()
    }
}

pub fn auth_file(feed_home: &Path) -> PathBuf {
    feed_home.join(AUTH_JSON_FILE)
}

/// Returns `Ok(None)` when no `auth.json` exists.
pub fn load_auth(feed_home: &Path) -> io::Result<Option<AuthDotJson>> {
    let contents = match fs::read_to_string(auth_file(feed_home)) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let auth = serde_json::from_str(&contents)?;
    Ok(Some(auth))
}

/// Write `auth.json`, readable by the current user only.
pub fn save_auth(feed_home: &Path, token: &str) -> io::Result<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "token must not be empty",
        ));
    }
    fs::create_dir_all(feed_home)?;
    let json_data = serde_json::to_string_pretty(&AuthDotJson {
        token: token.to_string(),
    })?;
    let mut options = fs::OpenOptions::new();
    options.truncate(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(auth_file(feed_home))?;
    file.write_all(json_data.as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Remove `auth.json`. Returns whether a file was removed.
pub fn logout(feed_home: &Path) -> io::Result<bool> {
    match fs::remove_file(auth_file(feed_home)) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

fn non_blank(token: String) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
