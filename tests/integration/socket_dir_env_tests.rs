//! Integration tests for socket directory resolution.
//!
//! These mutate process environment variables and run serially.

use std::path::{Path, PathBuf};

use serial_test::serial;

use agent_beacon::config::GlobalConfig;
use agent_beacon::paths::{resolve_socket_dir, SOCKET_DIR_ENV};

struct EnvGuard {
    key: &'static str,
    previous: Option<std::ffi::OsString>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let previous = std::env::var_os(key);
        std::env::set_var(key, value);
        Self { key, previous }
    }

    fn unset(key: &'static str) -> Self {
        let previous = std::env::var_os(key);
        std::env::remove_var(key);
        Self { key, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => std::env::set_var(self.key, value),
            None => std::env::remove_var(self.key),
        }
    }
}

#[test]
#[serial]
fn env_override_wins_over_config() {
    let _guard = EnvGuard::set(SOCKET_DIR_ENV, "/tmp/from-env");
    let config = GlobalConfig {
        socket_dir: Some(PathBuf::from("/tmp/from-config")),
        ..GlobalConfig::default()
    };
    assert_eq!(config.socket_dir(), PathBuf::from("/tmp/from-env"));
}

#[test]
#[serial]
fn config_wins_when_env_unset() {
    let _guard = EnvGuard::unset(SOCKET_DIR_ENV);
    assert_eq!(
        resolve_socket_dir(Some(Path::new("/tmp/from-config"))),
        PathBuf::from("/tmp/from-config")
    );
}

#[test]
#[serial]
fn empty_env_value_is_ignored() {
    let _guard = EnvGuard::set(SOCKET_DIR_ENV, "");
    assert_eq!(
        resolve_socket_dir(Some(Path::new("/tmp/cfg"))),
        PathBuf::from("/tmp/cfg")
    );
}

#[test]
#[serial]
fn runtime_dir_is_default() {
    let _env = EnvGuard::unset(SOCKET_DIR_ENV);
    let _xdg = EnvGuard::set("XDG_RUNTIME_DIR", "/run/user/4242");
    assert_eq!(
        resolve_socket_dir(None),
        PathBuf::from("/run/user/4242/agent-beacon")
    );
}

#[test]
#[serial]
fn temp_dir_fallback_is_per_user() {
    let _env = EnvGuard::unset(SOCKET_DIR_ENV);
    let _xdg = EnvGuard::unset("XDG_RUNTIME_DIR");
    let dir = resolve_socket_dir(None);
    assert!(dir.starts_with(std::env::temp_dir()));
    let name = dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("agent-beacon-"), "{name}");
}
