//! RPC socket address computation, grounded in `original_source/ipc-addr.c`.
//! Spec.md §4.6/§6; the `-s` override is a supplemented feature (see
//! SPEC_FULL.md).

use std::path::PathBuf;

use crate::error::RpcError;

/// Socket path: `$XDG_RUNTIME_DIR/fr.emersion.kanshi.$WAYLAND_DISPLAY`, or
/// `override_path` if given. Fails if either env var is empty and no
/// override is provided.
pub fn socket_addr(override_path: Option<&str>) -> Result<PathBuf, RpcError> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map_err(|_| RpcError::Address("XDG_RUNTIME_DIR is not set".to_string()))?;
    let display = std::env::var("WAYLAND_DISPLAY")
        .map_err(|_| RpcError::Address("WAYLAND_DISPLAY is not set".to_string()))?;
    if runtime_dir.is_empty() || display.is_empty() {
        return Err(RpcError::Address(
            "XDG_RUNTIME_DIR or WAYLAND_DISPLAY is empty".to_string(),
        ));
    }

    Ok(PathBuf::from(runtime_dir).join(format!("fr.emersion.kanshi.{display}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_env() {
        let path = socket_addr(Some("/tmp/explicit.sock")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/explicit.sock"));
    }

    #[test]
    fn composes_from_env_vars() {
        temp_env(&[("XDG_RUNTIME_DIR", "/run/user/1000"), ("WAYLAND_DISPLAY", "wayland-1")], || {
            let path = socket_addr(None).unwrap();
            assert_eq!(path, PathBuf::from("/run/user/1000/fr.emersion.kanshi.wayland-1"));
        });
    }

    #[test]
    fn missing_env_is_an_error() {
        temp_env(&[("XDG_RUNTIME_DIR", ""), ("WAYLAND_DISPLAY", "")], || {
            assert!(socket_addr(None).is_err());
        });
    }

    // std::env mutation isn't thread-safe across parallel tests; serialize
    // the handful that need it behind a single lock.
    fn temp_env(vars: &[(&str, &str)], f: impl FnOnce()) {
        use std::sync::Mutex;
        static LOCK: Mutex<()> = Mutex::new(());
        let _guard = LOCK.lock().unwrap();
        let saved: Vec<_> = vars.iter().map(|(k, _)| (*k, std::env::var(*k).ok())).collect();
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        f();
        for (k, v) in saved {
            match v {
                Some(v) => std::env::set_var(k, v),
                None => std::env::remove_var(k),
            }
        }
    }
}
