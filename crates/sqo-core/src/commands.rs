//! The startup-guard workflow as operator-facing commands.

use serde_json::json;

use crate::creds::{get_credentials, prepare_for_ambient_discovery, CredentialError};
use crate::lock::{holder_info, LockError, LockManager};
use crate::outcome::ExecutionOutcome;
use crate::settings::Settings;

/// Rehearse the worker's startup sequence: take the instance lock, prepare
/// the configured credentials for ambient discovery, resolve them, release.
///
/// Contention and credential problems come back as user errors with a
/// machine-readable `reason`; unexpected I/O comes back as a failure.
pub fn preflight(settings: &Settings) -> ExecutionOutcome {
    let manager = match LockManager::new(settings.lock_file()) {
        Ok(manager) => manager,
        Err(err) => {
            return ExecutionOutcome::user_error(
                err.to_string(),
                json!({ "reason": "invalid_lock_path" }),
            )
        }
    };

    let mut guard = match manager.acquire() {
        Ok(guard) => guard,
        Err(LockError::AlreadyHeld { holder }) => {
            return ExecutionOutcome::user_error(
                "another instance holds the lock",
                json!({
                    "reason": "lock_held",
                    "lock_file": manager.path().display().to_string(),
                    "holder": holder,
                    "hint": "Wait for the running instance to finish or check its host.",
                }),
            )
        }
        Err(err) => {
            return ExecutionOutcome::failure(
                err.to_string(),
                json!({ "reason": "lock_io_error" }),
            )
        }
    };

    let resolution = resolve_credentials(settings);
    guard.release();

    match resolution {
        Ok(kind) => ExecutionOutcome::success(
            "startup preflight passed",
            json!({
                "lock_file": manager.path().display().to_string(),
                "credential_type": kind,
            }),
        ),
        Err(err) => ExecutionOutcome::user_error(
            err.to_string(),
            json!({ "reason": "credential_error" }),
        ),
    }
}

fn resolve_credentials(settings: &Settings) -> Result<&'static str, CredentialError> {
    prepare_for_ambient_discovery(settings)?;
    let credential = get_credentials()?;
    Ok(credential.kind().as_str())
}

/// Read-only lock diagnostics for operator tooling.
pub fn lock_status(settings: &Settings) -> ExecutionOutcome {
    let path = settings.lock_file();
    match holder_info(path) {
        Some(info) => ExecutionOutcome::success(
            "lock metadata present",
            json!({
                "lock_file": path.display().to_string(),
                "holder": info,
            }),
        ),
        None => ExecutionOutcome::success(
            "no lock metadata",
            json!({
                "lock_file": path.display().to_string(),
                "holder": null,
            }),
        ),
    }
}
