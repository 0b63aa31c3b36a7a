#![deny(clippy::all, warnings)]

mod commands;
mod creds;
mod lock;
mod outcome;
mod settings;

pub use crate::commands::{lock_status, preflight};
pub use crate::creds::{
    build_credential, get_credentials, parse_and_validate, prepare_for_ambient_discovery,
    CredentialDescriptor, CredentialError, CredentialKind, ResolvedCredential,
    GOOGLE_APPLICATION_CREDENTIALS, STAGED_CREDENTIALS_FILE,
};
pub use crate::lock::{holder_info, HolderInfo, LockError, LockGuard, LockManager};
pub use crate::outcome::{to_json_response, CommandStatus, ExecutionOutcome};
pub use crate::settings::{Settings, DEFAULT_LOCK_FILE, LOCK_FILE_ENV};
