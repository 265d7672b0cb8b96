//! Hosting-site credentials from the secrets file.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::{WorkerError, WorkerResult};

/// Login for the podcast hosting site.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

// Keep the password out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Secrets file layout. Other keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    vodio_login: Option<String>,
    #[serde(default)]
    vodio_password: Option<String>,
}

/// Read hosting credentials from `path`.
///
/// A missing file, or a missing or blank entry, is a `MissingCredentials`
/// error.
pub async fn load_credentials(path: &Path) -> WorkerResult<Credentials> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorkerError::missing_credentials(format!(
                "secrets file {} not found",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    parse_credentials(&bytes)
}

fn parse_credentials(bytes: &[u8]) -> WorkerResult<Credentials> {
    let secrets: SecretsFile = serde_json::from_slice(bytes)?;
    let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let login = non_blank(secrets.vodio_login)
        .ok_or_else(|| WorkerError::missing_credentials("vodio_login is not set"))?;
    let password = non_blank(secrets.vodio_password)
        .ok_or_else(|| WorkerError::missing_credentials("vodio_password is not set"))?;

    Ok(Credentials { login, password })
}
