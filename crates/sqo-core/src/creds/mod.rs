//! Google Cloud credential resolution.
//!
//! One configuration string comes in: inline JSON, a file path, or nothing.
//! Out comes a validated in-memory credential, staged to a private file when
//! the downstream ambient-discovery mechanism needs a path to point at.
//!
//! Every failure path in this module is sanitized: no error message may
//! carry a private-key fragment, a credential JSON object, or any value of
//! `private_key` / `client_secret` / `refresh_token`. Underlying parse and
//! construction errors are swallowed into fixed generic messages because
//! their text can echo the secrets that produced them.

mod descriptor;
mod resolver;
mod staging;
#[cfg(test)]
pub(crate) mod testdata;

use std::fmt;

pub use descriptor::{parse_and_validate, CredentialDescriptor};
pub use resolver::{build_credential, get_credentials, ResolvedCredential};
pub use staging::{prepare_for_ambient_discovery, STAGED_CREDENTIALS_FILE};

/// Name of the process-wide configuration value holding the credential
/// input, and the variable ambient discovery reads downstream.
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ServiceAccount,
    AuthorizedUser,
}

impl CredentialKind {
    pub(crate) fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::ServiceAccount => &["private_key", "client_email", "project_id"],
            Self::AuthorizedUser => &["client_id", "client_secret", "refresh_token"],
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceAccount => "service_account",
            Self::AuthorizedUser => "authorized_user",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The input did not parse as a JSON object. The message is fixed and
    /// carries no fragment of the input.
    #[error("Invalid credentials JSON format")]
    InvalidJson,
    #[error("Unsupported credential type: '{kind}'")]
    UnsupportedType { kind: String },
    #[error("Incomplete {kind} credentials")]
    Incomplete { kind: CredentialKind },
    /// Construction failed; the underlying error text is dropped because it
    /// may echo secret fields.
    #[error("Invalid {kind} credentials")]
    InvalidCredential { kind: CredentialKind },
    /// Ambient discovery failed; the platform error text is dropped for the
    /// same reason.
    #[error(
        "Failed to load Google Cloud credentials - check GOOGLE_APPLICATION_CREDENTIALS configuration"
    )]
    DiscoveryFailed,
    #[error("failed to stage credentials for ambient discovery")]
    Staging(#[source] std::io::Error),
}
