use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use once_cell::sync::OnceCell;
use zeroize::Zeroizing;

use super::descriptor::{parse_and_validate, CredentialDescriptor};
use super::{CredentialError, CredentialKind, GOOGLE_APPLICATION_CREDENTIALS};

/// OAuth2 token endpoint shared by both credential variants.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for every ambient resolution.
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/bigquery",
    "https://www.googleapis.com/auth/cloud-platform",
];

/// Process-lifetime credential object for downstream cloud API clients.
///
/// Secret members live in [`Zeroizing`] wrappers so their backing storage is
/// wiped when the value drops. `Debug` never renders them.
#[derive(Clone)]
pub enum ResolvedCredential {
    ServiceAccount {
        client_email: String,
        project_id: String,
        private_key: Zeroizing<String>,
        token_uri: String,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: Zeroizing<String>,
        refresh_token: Zeroizing<String>,
        token_uri: String,
    },
}

impl ResolvedCredential {
    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::ServiceAccount { .. } => CredentialKind::ServiceAccount,
            Self::AuthorizedUser { .. } => CredentialKind::AuthorizedUser,
        }
    }

    #[must_use]
    pub fn scopes(&self) -> &'static [&'static str] {
        SCOPES
    }

    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::ServiceAccount { project_id, .. } => Some(project_id),
            Self::AuthorizedUser { .. } => None,
        }
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount {
                client_email,
                project_id,
                ..
            } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("project_id", project_id)
                .field("private_key", &"<redacted>")
                .finish(),
            Self::AuthorizedUser { client_id, .. } => f
                .debug_struct("AuthorizedUser")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .field("refresh_token", &"<redacted>")
                .finish(),
        }
    }
}

/// Construct the variant-specific credential from a validated descriptor.
///
/// The descriptor is consumed and scrubbed whether construction succeeds or
/// fails. Any underlying failure is re-raised as the generic
/// `Invalid <variant> credentials` error; the original error text is
/// discarded because it may echo secret fields.
pub fn build_credential(
    mut descriptor: CredentialDescriptor,
) -> Result<ResolvedCredential, CredentialError> {
    let kind = descriptor.kind();
    let result = match kind {
        CredentialKind::ServiceAccount => build_service_account(&mut descriptor),
        CredentialKind::AuthorizedUser => build_authorized_user(&mut descriptor),
    };
    descriptor.scrub();
    result.map_err(|_| {
        tracing::warn!(%kind, "credential construction failed");
        CredentialError::InvalidCredential { kind }
    })
}

fn build_service_account(
    descriptor: &mut CredentialDescriptor,
) -> anyhow::Result<ResolvedCredential> {
    let private_key = Zeroizing::new(
        descriptor
            .take_string("private_key")
            .context("private_key missing")?,
    );
    // The downstream signer needs PEM-framed key material; reject anything
    // else here rather than at first use.
    if !private_key.contains("-----BEGIN ") || !private_key.contains("PRIVATE KEY-----") {
        bail!("private_key is not PEM-framed");
    }
    Ok(ResolvedCredential::ServiceAccount {
        client_email: descriptor
            .take_string("client_email")
            .context("client_email missing")?,
        project_id: descriptor
            .take_string("project_id")
            .context("project_id missing")?,
        private_key,
        token_uri: descriptor
            .take_string("token_uri")
            .unwrap_or_else(|| TOKEN_URI.to_string()),
    })
}

fn build_authorized_user(
    descriptor: &mut CredentialDescriptor,
) -> anyhow::Result<ResolvedCredential> {
    Ok(ResolvedCredential::AuthorizedUser {
        client_id: descriptor
            .take_string("client_id")
            .context("client_id missing")?,
        client_secret: Zeroizing::new(
            descriptor
                .take_string("client_secret")
                .context("client_secret missing")?,
        ),
        refresh_token: Zeroizing::new(
            descriptor
                .take_string("refresh_token")
                .context("refresh_token missing")?,
        ),
        token_uri: descriptor
            .take_string("token_uri")
            .unwrap_or_else(|| TOKEN_URI.to_string()),
    })
}

// Written at most once per process: the first successful ambient resolution
// lands here and every later call reads it back. Nothing else in-process
// races to populate it before the first caller.
static PROCESS_CREDENTIALS: OnceCell<ResolvedCredential> = OnceCell::new();

/// Resolve the ambient (application-default) credential for this process,
/// memoizing the first success for the remainder of the process lifetime.
///
/// # Errors
///
/// `CredentialError::DiscoveryFailed` with a fixed message; the underlying
/// discovery error is never propagated verbatim.
pub fn get_credentials() -> Result<&'static ResolvedCredential, CredentialError> {
    PROCESS_CREDENTIALS.get_or_try_init(|| {
        discover_ambient().map_err(|err| {
            tracing::warn!(%err, "ambient credential discovery failed");
            CredentialError::DiscoveryFailed
        })
    })
}

// Discovery order mirrors application-default-credentials: the explicit
// environment variable first, then the gcloud well-known file.
pub(crate) fn discover_ambient() -> anyhow::Result<ResolvedCredential> {
    if let Some(path) = env::var_os(GOOGLE_APPLICATION_CREDENTIALS) {
        let path = PathBuf::from(path);
        return load_credential_file(&path)
            .with_context(|| format!("loading {}", path.display()));
    }
    if let Some(path) = well_known_adc_file() {
        if path.exists() {
            return load_credential_file(&path)
                .with_context(|| format!("loading {}", path.display()));
        }
    }
    bail!("no ambient credential source available")
}

fn load_credential_file(path: &Path) -> anyhow::Result<ResolvedCredential> {
    let raw = Zeroizing::new(fs::read_to_string(path)?);
    let descriptor = parse_and_validate(&raw)?;
    Ok(build_credential(descriptor)?)
}

fn well_known_adc_file() -> Option<PathBuf> {
    dirs_next::config_dir()
        .map(|dir| dir.join("gcloud").join("application_default_credentials.json"))
}
