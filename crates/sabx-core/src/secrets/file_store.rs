//! Encrypted file backend
//!
//! Opt-in fallback for hosts without a usable OS keyring. Each record is a
//! small JSON envelope holding an Argon2 salt, a nonce and the
//! ChaCha20-Poly1305 ciphertext of the secret. The derived key is bound in
//! as associated data, so envelopes cannot be swapped between records.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use argon2::Argon2;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::backend::BackendKind;
use super::traits::{SecretBackend, SecretStoreError, SecretStoreResult};
use crate::atomic::{ensure_private_dir, write_atomic};

const ENVELOPE_VERSION: u32 = 1;
const KDF_NAME: &str = "argon2id";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const FILE_SUFFIX: &str = ".json";

/// Where the file backend gets its passphrase from
#[derive(Clone)]
pub enum PassphraseSource {
    /// A passphrase supplied up front (option or environment)
    Fixed(Zeroizing<String>),
    /// Ask on the terminal the first time one is needed
    Terminal,
}

impl PassphraseSource {
    pub fn fixed(passphrase: impl Into<String>) -> Self {
        Self::Fixed(Zeroizing::new(passphrase.into()))
    }
}

impl fmt::Debug for PassphraseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassphraseSource::Fixed(_) => f.write_str("Fixed(<redacted>)"),
            PassphraseSource::Terminal => f.write_str("Terminal"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    label: String,
    kdf: String,
    salt: String,
    nonce: String,
    ciphertext: String,
}

/// Secret backend storing one encrypted file per record
pub struct FileBackend {
    dir: PathBuf,
    source: PassphraseSource,
    passphrase: OnceCell<Zeroizing<String>>,
}

impl FileBackend {
    /// Open (creating if needed, owner-only) the directory `dir`
    pub fn open(dir: impl Into<PathBuf>, source: PassphraseSource) -> SecretStoreResult<Self> {
        let dir = dir.into();
        ensure_private_dir(&dir).map_err(|e| SecretStoreError::Unavailable {
            backend: BackendKind::File,
            reason: format!("cannot create {}: {e}", dir.display()),
        })?;
        tracing::debug!(dir = %dir.display(), "opened encrypted file backend");
        Ok(Self {
            dir,
            source,
            passphrase: OnceCell::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{FILE_SUFFIX}", URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }

    fn passphrase(&self) -> SecretStoreResult<&str> {
        let passphrase = self.passphrase.get_or_try_init(
            || -> SecretStoreResult<Zeroizing<String>> {
                match &self.source {
                    PassphraseSource::Fixed(value) => Ok(value.clone()),
                    PassphraseSource::Terminal => {
                        let value = dialoguer::Password::new()
                            .with_prompt("Passphrase to unlock sabx secrets")
                            .interact()
                            .map_err(|e| SecretStoreError::Passphrase(e.to_string()))?;
                        Ok(Zeroizing::new(value))
                    }
                }
            },
        )?;
        if passphrase.is_empty() {
            return Err(SecretStoreError::Passphrase(
                "the encrypted file backend needs a non-empty passphrase".to_string(),
            ));
        }
        Ok(passphrase.as_str())
    }

    fn derive_cipher(&self, salt: &[u8]) -> SecretStoreResult<ChaCha20Poly1305> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        Argon2::default()
            .hash_password_into(self.passphrase()?.as_bytes(), salt, &mut key[..])
            .map_err(|e| SecretStoreError::Crypto(format!("key derivation failed: {e}")))?;
        Ok(ChaCha20Poly1305::new(Key::from_slice(&key[..])))
    }

    fn seal(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<Envelope> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .derive_cipher(&salt)?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: data,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| SecretStoreError::Crypto("encryption failed".to_string()))?;

        Ok(Envelope {
            version: ENVELOPE_VERSION,
            label: label.to_string(),
            kdf: KDF_NAME.to_string(),
            salt: STANDARD.encode(salt),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    fn open_envelope(&self, key: &str, envelope: &Envelope) -> SecretStoreResult<Vec<u8>> {
        if envelope.version != ENVELOPE_VERSION || envelope.kdf != KDF_NAME {
            return Err(SecretStoreError::Crypto(format!(
                "unsupported envelope (version {}, kdf {})",
                envelope.version, envelope.kdf
            )));
        }
        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| SecretStoreError::Crypto(format!("invalid {field} encoding: {e}")))
        };
        let salt = decode("salt", &envelope.salt)?;
        let nonce = decode("nonce", &envelope.nonce)?;
        let ciphertext = decode("ciphertext", &envelope.ciphertext)?;
        if nonce.len() != NONCE_LEN {
            return Err(SecretStoreError::Crypto("invalid nonce length".to_string()));
        }

        self.derive_cipher(&salt)?
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| {
                SecretStoreError::Crypto(
                    "decryption failed (wrong passphrase or corrupted file)".to_string(),
                )
            })
    }

    /// Label stored alongside `key`, without decrypting anything
    pub fn label(&self, key: &str) -> SecretStoreResult<String> {
        Ok(self.read_envelope(key)?.label)
    }

    fn read_envelope(&self, key: &str) -> SecretStoreResult<Envelope> {
        let raw = match fs::read(self.path_for(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SecretStoreError::not_found(key))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackend")
            .field("dir", &self.dir)
            .field("source", &self.source)
            .field("unlocked", &self.passphrase.get().is_some())
            .finish()
    }
}

impl SecretBackend for FileBackend {
    fn name(&self) -> &str {
        BackendKind::File.as_str()
    }

    fn set(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<()> {
        let envelope = self.seal(key, data, label)?;
        let body = serde_json::to_vec_pretty(&envelope)?;
        write_atomic(&self.path_for(key), &body)?;
        tracing::debug!(key, "wrote encrypted secret file");
        Ok(())
    }

    fn get(&self, key: &str) -> SecretStoreResult<Vec<u8>> {
        let envelope = self.read_envelope(key)?;
        self.open_envelope(key, &envelope)
    }

    fn remove(&self, key: &str) -> SecretStoreResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SecretStoreError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }
}
