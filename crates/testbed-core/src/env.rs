//! Process environment patching.
//!
//! The process environment is global state. Tests that patch it must not run
//! concurrently with each other; this crate's own tests serialize on the
//! `env` key of `serial_test`.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while patching the environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The name is empty or contains `=` or NUL.
    #[error("invalid environment variable name: {0:?}")]
    InvalidName(String),

    /// The value contains NUL.
    #[error("invalid value for environment variable {0}: contains NUL")]
    InvalidValue(String),

    /// A path list could not be joined.
    #[error("cannot build path list for {name}: {message}")]
    JoinPaths { name: String, message: String },
}

/// Restores an environment variable to its captured state when dropped.
#[must_use = "dropping the guard restores the variable immediately"]
#[derive(Debug)]
pub struct EnvGuard {
    name: String,
    previous: Option<OsString>,
    armed: bool,
}

impl EnvGuard {
    /// Returns the patched variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value the variable had before patching, `None` if it was
    /// unset.
    pub fn previous(&self) -> Option<&OsStr> {
        self.previous.as_deref()
    }

    /// Restores the variable now.
    pub fn restore(mut self) {
        self.restore_in_place();
    }

    fn restore_in_place(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match &self.previous {
            Some(value) => set_var(&self.name, value),
            None => remove_var(&self.name),
        }
        debug!(name = %self.name, unset = self.previous.is_none(), "Restored environment variable");
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        self.restore_in_place();
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), EnvError> {
    if name.is_empty() || name.contains(['=', '\0']) {
        return Err(EnvError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Sets `name` to `value`, returning a guard that restores the old state.
///
/// A variable that was unset before the patch is removed again on restore,
/// not set to an empty string.
pub fn patch_environment(name: &str, value: impl AsRef<OsStr>) -> Result<EnvGuard, EnvError> {
    validate_name(name)?;
    let value = value.as_ref();
    if value.as_encoded_bytes().contains(&0) {
        return Err(EnvError::InvalidValue(name.to_string()));
    }

    let previous = env::var_os(name);
    set_var(name, value);
    debug!(name, was_set = previous.is_some(), "Patched environment variable");

    Ok(EnvGuard {
        name: name.to_string(),
        previous,
        armed: true,
    })
}

/// Prepends `dir` to the path list in `PATH`.
pub fn patch_env_path_prepend(dir: impl AsRef<Path>) -> Result<EnvGuard, EnvError> {
    const NAME: &str = "PATH";

    let mut paths: Vec<PathBuf> = vec![dir.as_ref().to_path_buf()];
    if let Some(current) = env::var_os(NAME).filter(|v| !v.is_empty()) {
        paths.extend(env::split_paths(&current));
    }
    let joined = env::join_paths(paths).map_err(|e| EnvError::JoinPaths {
        name: NAME.to_string(),
        message: e.to_string(),
    })?;

    patch_environment(NAME, joined)
}

/// Snapshot of every variable currently set.
pub(crate) fn snapshot() -> Vec<(OsString, OsString)> {
    env::vars_os().collect()
}

/// Replaces the whole environment with `snapshot`.
pub(crate) fn restore_snapshot(snapshot: &[(OsString, OsString)]) {
    for (name, _) in env::vars_os() {
        remove_os_var(&name);
    }
    for (name, value) in snapshot {
        set_os_var(name, value);
    }
}

fn set_var(name: &str, value: &OsStr) {
    set_os_var(OsStr::new(name), value);
}

fn remove_var(name: &str) {
    remove_os_var(OsStr::new(name));
}

#[allow(unsafe_code)]
fn set_os_var(name: &OsStr, value: &OsStr) {
    // SAFETY: environment patching is confined to test code, which runs
    // patching tests one at a time.
    unsafe { env::set_var(name, value) }
}

#[allow(unsafe_code)]
fn remove_os_var(name: &OsStr) {
    // SAFETY: see set_os_var.
    unsafe { env::remove_var(name) }
}
