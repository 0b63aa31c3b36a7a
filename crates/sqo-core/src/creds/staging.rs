use std::env;
use std::fs::{self, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use super::descriptor::{parse_and_validate, CredentialDescriptor};
use super::{CredentialError, GOOGLE_APPLICATION_CREDENTIALS};
use crate::settings::Settings;

/// Fixed staging filename under the temporary directory, so repeated
/// startups reuse one location instead of accumulating secret files.
pub const STAGED_CREDENTIALS_FILE: &str = "sqo-adc-credentials.json";

/// Make the configured credential input consumable by path-based ambient
/// discovery.
///
/// Inline JSON is validated, written to a private owner-only file, and the
/// process-wide `GOOGLE_APPLICATION_CREDENTIALS` value is repointed at it.
/// An existing file path is left untouched. A missing path or absent input
/// degrades gracefully with a warning: the deployment may be running under a
/// pre-configured ambient identity, and if not, discovery itself will fail
/// clearly later.
///
/// # Errors
///
/// Fails only for inline JSON that does not validate, or when the staging
/// file cannot be written.
pub fn prepare_for_ambient_discovery(settings: &Settings) -> Result<(), CredentialError> {
    let Some(input) = settings.credential_input() else {
        tracing::warn!(
            "GOOGLE_APPLICATION_CREDENTIALS not set; relying on pre-configured ambient credentials"
        );
        return Ok(());
    };
    let trimmed = input.trim();
    if trimmed.is_empty() {
        tracing::warn!(
            "GOOGLE_APPLICATION_CREDENTIALS is empty; relying on pre-configured ambient credentials"
        );
        return Ok(());
    }

    if trimmed.starts_with('{') {
        let descriptor = parse_and_validate(trimmed)?;
        let staged = staging_path();
        write_staged(&staged, &descriptor).map_err(CredentialError::Staging)?;
        env::set_var(GOOGLE_APPLICATION_CREDENTIALS, &staged);
        tracing::info!(
            path = %staged.display(),
            kind = %descriptor.kind(),
            "staged inline credentials for ambient discovery"
        );
        return Ok(());
    }

    let path = Path::new(trimmed);
    if path.exists() {
        tracing::debug!(
            path = %path.display(),
            "credential input is an existing file; configuration left unchanged"
        );
    } else {
        tracing::warn!(
            path = %path.display(),
            "credential file not found; ambient discovery may fail"
        );
    }
    Ok(())
}

fn staging_path() -> PathBuf {
    env::temp_dir().join(STAGED_CREDENTIALS_FILE)
}

fn write_staged(path: &Path, descriptor: &CredentialDescriptor) -> std::io::Result<()> {
    // Owner-only from the moment the file exists; the explicit
    // set_permissions repairs a leftover file from an earlier run before any
    // fresh content lands in it.
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    fs::set_permissions(path, Permissions::from_mode(0o600))?;
    serde_json::to_writer(&mut file, descriptor)?;
    file.write_all(b"\n")?;
    file.flush()
}
