//! `pass` password manager backend

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use super::backend::BackendKind;
use super::traits::{SecretBackend, SecretStoreError, SecretStoreResult};

/// Secret backend that shells out to `pass`
///
/// Entries live under `<prefix>/<key>` in the password store. The label is
/// written as a second line so `pass show` output stays self-describing;
/// only the first line is returned as the secret.
#[derive(Debug, Clone)]
pub struct PassBackend {
    binary: PathBuf,
    prefix: String,
}

impl PassBackend {
    /// Locate `pass` on `PATH`
    pub fn open(prefix: impl Into<String>) -> SecretStoreResult<Self> {
        let binary = which::which("pass").map_err(|e| SecretStoreError::Unavailable {
            backend: BackendKind::Pass,
            reason: e.to_string(),
        })?;
        Ok(Self::with_binary(binary, prefix))
    }

    /// Use an explicit `pass` executable
    pub fn with_binary(binary: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            prefix: prefix.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn entry_path(&self, key: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), key)
    }

    fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> SecretStoreResult<Output> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn()?;
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input)?;
            }
        }
        Ok(child.wait_with_output()?)
    }
}

fn is_missing_entry(stderr: &str) -> bool {
    stderr.contains("is not in the password store")
}

impl SecretBackend for PassBackend {
    fn name(&self) -> &str {
        BackendKind::Pass.as_str()
    }

    fn set(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<()> {
        let path = self.entry_path(key);
        tracing::debug!(path = %path, "writing pass entry");

        let mut payload = data.to_vec();
        if !label.is_empty() {
            payload.push(b'\n');
            payload.extend_from_slice(label.as_bytes());
        }
        payload.push(b'\n');

        let output = self.run(&["insert", "--multiline", "--force", &path], Some(&payload))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SecretStoreError::backend(
                "pass",
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }

    fn get(&self, key: &str) -> SecretStoreResult<Vec<u8>> {
        let path = self.entry_path(key);
        let output = self.run(&["show", &path], None)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_entry(&stderr) {
                return Err(SecretStoreError::not_found(key));
            }
            return Err(SecretStoreError::backend("pass", stderr.trim()));
        }

        let first_line = output
            .stdout
            .split(|b| *b == b'\n')
            .next()
            .unwrap_or_default();
        Ok(first_line.to_vec())
    }

    fn remove(&self, key: &str) -> SecretStoreResult<()> {
        let path = self.entry_path(key);
        tracing::debug!(path = %path, "removing pass entry");
        let output = self.run(&["rm", "--force", &path], None)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_entry(&stderr) {
            Err(SecretStoreError::not_found(key))
        } else {
            Err(SecretStoreError::backend("pass", stderr.trim()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_path() {
        let backend = PassBackend::with_binary("/usr/bin/pass", "sabx/");
        assert_eq!(
            backend.entry_path("profile/default/abc"),
            "sabx/profile/default/abc"
        );
    }

    #[test]
    fn test_missing_entry_detection() {
        assert!(is_missing_entry(
            "Error: sabx/profile/default/abc is not in the password store.\n"
        ));
        assert!(!is_missing_entry("gpg: decryption failed: No secret key"));
    }

    #[test]
    fn test_spawn_failure_is_io_error() {
        let backend = PassBackend::with_binary("/nonexistent/sabx-test/pass", "sabx");
        let err = backend.get("profile/default/abc").unwrap_err();
        assert!(matches!(err, SecretStoreError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_round_trip_with_fake_pass() {
        use std::os::unix::fs::PermissionsExt;

        // A tiny stand-in for `pass` that keeps entries as plain files.
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let script = dir.path().join("pass");
        std::fs::write(
            &script,
            format!(
                r#"#!/bin/sh
root="{root}"
cmd="$1"; shift
case "$cmd" in
  insert) path="$3"; mkdir -p "$root/$(dirname "$path")"; cat > "$root/$path" ;;
  show) path="$1"; [ -f "$root/$path" ] || {{ echo "Error: $path is not in the password store." >&2; exit 1; }}; cat "$root/$path" ;;
  rm) path="$2"; [ -f "$root/$path" ] || {{ echo "Error: $path is not in the password store." >&2; exit 1; }}; rm "$root/$path" ;;
esac
"#,
                root = store.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = PassBackend::with_binary(&script, "sabx");
        backend
            .set("profile/default/abc", b"sk-123", "sabx profile default API key")
            .unwrap();
        assert_eq!(backend.get("profile/default/abc").unwrap(), b"sk-123");

        backend.remove("profile/default/abc").unwrap();
        assert!(backend.get("profile/default/abc").unwrap_err().is_not_found());
        assert!(backend
            .remove("profile/default/abc")
            .unwrap_err()
            .is_not_found());
    }
}
