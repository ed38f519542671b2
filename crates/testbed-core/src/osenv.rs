//! Isolation from the host process environment.

use crate::env;
use crate::{EnvConfig, Suite, TestContext};
use std::ffi::OsString;
use tracing::{debug, warn};

/// System variables kept on Windows; standard library functions such as
/// `std::env::temp_dir` and child shells depend on them.
#[cfg(windows)]
const PLATFORM_VARIABLES: &[&str] = &[
    "ALLUSERSPROFILE",
    "APPDATA",
    "CommonProgramFiles",
    "CommonProgramFiles(x86)",
    "CommonProgramW6432",
    "COMPUTERNAME",
    "ComSpec",
    "FP_NO_HOST_CHECK",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "LOGONSERVER",
    "NUMBER_OF_PROCESSORS",
    "OS",
    "Path",
    "PATHEXT",
    "PROCESSOR_ARCHITECTURE",
    "PROCESSOR_IDENTIFIER",
    "PROCESSOR_LEVEL",
    "PROCESSOR_REVISION",
    "ProgramData",
    "ProgramFiles",
    "ProgramFiles(x86)",
    "ProgramW6432",
    "PROMPT",
    "PSModulePath",
    "PUBLIC",
    "SESSIONNAME",
    "SystemDrive",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERDOMAIN",
    "USERDOMAIN_ROAMINGPROFILE",
    "USERNAME",
    "USERPROFILE",
    "windir",
];

#[cfg(not(windows))]
const PLATFORM_VARIABLES: &[&str] = &[];

/// Clears the process environment for the duration of a suite.
///
/// At suite start the environment is saved and replaced by the retained
/// variables only: `PATH`, the platform's system variables and any extra
/// names given to [`with_retained`](Self::with_retained). Each test starts
/// from that same reduced environment, with the retained variables reset to
/// their saved values. At suite end the saved environment is restored
/// exactly.
#[derive(Debug)]
pub struct OsEnvSuite {
    retained: Vec<String>,
    saved: Option<Vec<(OsString, OsString)>>,
}

impl Default for OsEnvSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl OsEnvSuite {
    pub fn new() -> Self {
        let mut retained = vec!["PATH".to_string()];
        retained.extend(PLATFORM_VARIABLES.iter().map(ToString::to_string));
        Self {
            retained,
            saved: None,
        }
    }

    /// Keeps additional variables.
    pub fn with_retained<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.retained.contains(&name) {
                self.retained.push(name);
            }
        }
        self
    }

    /// Builds a suite keeping the configured names. Names that cannot be
    /// environment variables are skipped.
    pub fn from_config(config: &EnvConfig) -> Self {
        let names = config.retain.iter().filter(|name| {
            let valid = env::validate_name(name).is_ok();
            if !valid {
                warn!(name = %name, "Ignoring invalid retained variable name");
            }
            valid
        });
        Self::new().with_retained(names.cloned())
    }

    /// Names of the variables kept when the environment is cleared.
    pub fn retained(&self) -> &[String] {
        &self.retained
    }

    fn isolate(&self) {
        let current;
        let saved = match &self.saved {
            Some(saved) => saved,
            None => {
                current = env::snapshot();
                &current
            }
        };
        let kept: Vec<(OsString, OsString)> = saved
            .iter()
            .filter(|(name, _)| {
                name.to_str()
                    .is_some_and(|name| self.retained.iter().any(|r| r == name))
            })
            .cloned()
            .collect();
        debug!(kept = kept.len(), "Isolating process environment");
        env::restore_snapshot(&kept);
    }
}

impl Suite for OsEnvSuite {
    fn set_up_suite(&mut self, _c: &mut TestContext) {
        self.saved = Some(env::snapshot());
        self.isolate();
    }

    fn tear_down_suite(&mut self, _c: &mut TestContext) {
        if let Some(saved) = self.saved.take() {
            debug!(count = saved.len(), "Restoring process environment");
            env::restore_snapshot(&saved);
        }
    }

    fn set_up_test(&mut self, _c: &mut TestContext) {
        self.isolate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SECRET: &str = "TESTBED_OSENV_SECRET";
    const KEPT: &str = "TESTBED_OSENV_KEPT";

    #[test]
    #[serial(env)]
    fn test_environment_cleared_and_restored() {
        let _secret = env::patch_environment(SECRET, "hunter2").unwrap();
        let path = std::env::var_os("PATH");

        let mut s = OsEnvSuite::new();
        let mut c = TestContext::new("osenv");
        s.set_up_suite(&mut c);

        assert!(std::env::var_os(SECRET).is_none());
        assert_eq!(std::env::var_os("PATH"), path);

        s.set_up_test(&mut c);
        assert!(std::env::var_os(SECRET).is_none());
        s.tear_down_test(&mut c);

        s.tear_down_suite(&mut c);
        assert_eq!(std::env::var(SECRET).unwrap(), "hunter2");
        assert_eq!(std::env::var_os("PATH"), path);
        c.finish();
    }

    #[test]
    #[serial(env)]
    fn test_test_start_resets_changes() {
        let _kept = env::patch_environment(KEPT, "original").unwrap();

        let mut s = OsEnvSuite::new().with_retained([KEPT]);
        let mut c = TestContext::new("osenv");
        s.set_up_suite(&mut c);
        assert_eq!(std::env::var(KEPT).unwrap(), "original");

        s.set_up_test(&mut c);
        // Leak both patches, as a test that forgets to restore would.
        std::mem::forget(env::patch_environment(KEPT, "changed by test").unwrap());
        std::mem::forget(env::patch_environment(SECRET, "leaked").unwrap());
        s.tear_down_test(&mut c);

        s.set_up_test(&mut c);
        assert_eq!(std::env::var(KEPT).unwrap(), "original");
        assert!(std::env::var_os(SECRET).is_none());
        s.tear_down_test(&mut c);

        s.tear_down_suite(&mut c);
        assert!(std::env::var_os(SECRET).is_none());
        c.finish();
    }

    #[test]
    fn test_from_config_adds_retained_names() {
        let config = EnvConfig {
            retain: vec!["HOME".to_string(), "PATH".to_string()],
        };
        let s = OsEnvSuite::from_config(&config);
        assert_eq!(s.retained().iter().filter(|n| *n == "PATH").count(), 1);
        assert!(s.retained().iter().any(|n| n == "HOME"));
    }

    #[test]
    fn test_from_config_skips_invalid_names() {
        let config = EnvConfig {
            retain: vec![String::new(), "A=B".to_string(), "HOME".to_string()],
        };
        let s = OsEnvSuite::from_config(&config);
        assert!(s.retained().iter().any(|n| n == "HOME"));
        assert!(!s.retained().iter().any(|n| n.is_empty() || n == "A=B"));

        let config = crate::TestbedConfig {
            env: config,
            ..Default::default()
        };
        let warnings = config.validate();
        assert_eq!(
            warnings
                .iter()
                .filter(|w| matches!(w, crate::ConfigWarning::InvalidValue { .. }))
                .count(),
            2
        );
    }
}
