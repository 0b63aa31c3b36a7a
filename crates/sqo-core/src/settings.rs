use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::creds::GOOGLE_APPLICATION_CREDENTIALS;

/// Environment variable overriding the instance lock location.
pub const LOCK_FILE_ENV: &str = "SQO_LOCK_FILE";

/// Default lock location, shared via a mounted volume (Docker Compose) or a
/// PVC (Kubernetes) so cooperating instances contend on the same file.
pub const DEFAULT_LOCK_FILE: &str = "/app/data/oracle.lock";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// The two values this core consumes from the deployment's configuration
/// loader: the credential input (inline JSON, file path, or absent) and the
/// lock file location. Everything else in the configuration schema belongs
/// to the worker, not to the startup guard.
#[derive(Debug, Clone)]
pub struct Settings {
    pub(crate) lock_file: PathBuf,
    pub(crate) credential_input: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    /// For hosting processes that already ran their own configuration
    /// loader: hand the two values over directly instead of going through
    /// the environment.
    pub fn new(lock_file: impl Into<PathBuf>, credential_input: Option<String>) -> Self {
        Self {
            lock_file: lock_file.into(),
            credential_input,
        }
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        Self {
            lock_file: snapshot
                .var(LOCK_FILE_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_LOCK_FILE), PathBuf::from),
            credential_input: snapshot
                .var(GOOGLE_APPLICATION_CREDENTIALS)
                .map(ToString::to_string),
        }
    }

    #[must_use]
    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    #[must_use]
    pub fn credential_input(&self) -> Option<&str> {
        self.credential_input.as_deref()
    }
}
