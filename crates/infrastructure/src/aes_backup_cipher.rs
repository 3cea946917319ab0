//! AES-256-GCM protection for backup artifacts at rest.
//!
//! Encrypted artifacts carry a fixed 64-byte header
//! `[salt:32][iv:16][tag:16]` followed by ciphertext of the same length as
//! the plaintext. The GCM tag makes every artifact tamper-evident: a flipped
//! bit anywhere in the ciphertext or header fails decryption outright
//! instead of yielding corrupt plaintext.

use std::io::ErrorKind;
use std::path::Path;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use async_trait::async_trait;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use casekeep_application::FileCipher;
use casekeep_core::{AppError, AppResult};

const SALT_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

const PBKDF2_ROUNDS: u32 = 100_000;

/// AES-256-GCM with the 16-byte IV the artifact format prescribes.
type BackupGcm = AesGcm<Aes256, U16>;

/// Authenticated file encryption for backup artifacts.
#[derive(Clone)]
pub struct AesBackupCipher {
    cipher: BackupGcm,
}

impl AesBackupCipher {
    /// Creates a cipher from a raw 32-byte key.
    #[must_use]
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let cipher = BackupGcm::new(key_bytes.into());
        Self { cipher }
    }

    /// Creates a cipher from the configured key material.
    ///
    /// A 64-character hex string is used as the raw 256-bit key. Any other
    /// value is treated as a passphrase and run through PBKDF2-HMAC-SHA256
    /// with a random installation salt persisted at
    /// `installation_salt_path` (generated on first use).
    pub fn from_key_material(value: &str, installation_salt_path: &Path) -> AppResult<Self> {
        if let Ok(decoded) = hex::decode(value) {
            if decoded.len() == 32 {
                let mut key = [0u8; 32];
                key.copy_from_slice(decoded.as_slice());
                return Ok(Self::new(&key));
            }
        }

        let salt = load_or_create_installation_salt(installation_salt_path)?;
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(value.as_bytes(), salt.as_slice(), PBKDF2_ROUNDS, &mut key);
        Ok(Self::new(&key))
    }

    async fn write_encrypted(&self, plain: &Path, out: &Path) -> AppResult<()> {
        let mut buffer = tokio::fs::read(plain).await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to read plaintext dump '{}': {error}",
                plain.display()
            ))
        })?;

        // The per-file salt is stored for format parity; the key itself is
        // fixed at construction time.
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let nonce = BackupGcm::generate_nonce(&mut OsRng);

        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|error| {
                AppError::Internal(format!("failed to encrypt backup dump: {error}"))
            })?;

        let mut file = tokio::fs::File::create(out).await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to create encrypted backup '{}': {error}",
                out.display()
            ))
        })?;

        for part in [
            salt.as_slice(),
            nonce.as_slice(),
            tag.as_slice(),
            buffer.as_slice(),
        ] {
            file.write_all(part).await.map_err(|error| {
                AppError::Filesystem(format!(
                    "failed to write encrypted backup '{}': {error}",
                    out.display()
                ))
            })?;
        }

        file.sync_all().await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to flush encrypted backup '{}': {error}",
                out.display()
            ))
        })
    }

    async fn write_decrypted(&self, enc: &Path, out: &Path) -> AppResult<()> {
        let data = tokio::fs::read(enc).await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to read encrypted backup '{}': {error}",
                enc.display()
            ))
        })?;

        if data.len() < HEADER_LEN {
            return Err(AppError::Integrity(format!(
                "encrypted backup '{}' is shorter than its {HEADER_LEN}-byte header",
                enc.display()
            )));
        }

        let (_salt, rest) = data.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let iv_array: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| AppError::Internal("iv must be exactly 16 bytes".to_owned()))?;
        let nonce = Nonce::from(iv_array);

        let mut buffer = ciphertext.to_vec();
        self.cipher
            .decrypt_in_place_detached(&nonce, b"", &mut buffer, Tag::from_slice(tag))
            .map_err(|_| {
                AppError::Integrity(format!(
                    "authentication tag verification failed for '{}': tampered, corrupted, or encrypted under a different key",
                    enc.display()
                ))
            })?;

        let mut file = tokio::fs::File::create(out).await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to create decrypted dump '{}': {error}",
                out.display()
            ))
        })?;
        file.write_all(buffer.as_slice()).await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to write decrypted dump '{}': {error}",
                out.display()
            ))
        })?;
        file.sync_all().await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to flush decrypted dump '{}': {error}",
                out.display()
            ))
        })
    }
}

#[async_trait]
impl FileCipher for AesBackupCipher {
    async fn encrypt_file(&self, plain: &Path, out: &Path) -> AppResult<()> {
        if let Err(error) = self.write_encrypted(plain, out).await {
            remove_partial(out).await;
            return Err(error);
        }

        // The plaintext is only removed once the encrypted file is durable.
        tokio::fs::remove_file(plain).await.map_err(|error| {
            AppError::Filesystem(format!(
                "failed to remove plaintext dump '{}': {error}",
                plain.display()
            ))
        })
    }

    async fn decrypt_file(&self, enc: &Path, out: &Path) -> AppResult<()> {
        if let Err(error) = self.write_decrypted(enc, out).await {
            remove_partial(out).await;
            return Err(error);
        }
        Ok(())
    }
}

fn load_or_create_installation_salt(path: &Path) -> AppResult<[u8; SALT_LEN]> {
    match std::fs::read_to_string(path) {
        Ok(stored) => {
            let decoded = hex::decode(stored.trim()).map_err(|error| {
                AppError::Configuration(format!(
                    "installation salt file '{}' is not valid hex: {error}",
                    path.display()
                ))
            })?;
            decoded.try_into().map_err(|_| {
                AppError::Configuration(format!(
                    "installation salt file '{}' must hold exactly {SALT_LEN} bytes",
                    path.display()
                ))
            })
        }
        Err(error) if error.kind() == ErrorKind::NotFound => {
            let mut salt = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    AppError::Filesystem(format!(
                        "failed to create directory for installation salt '{}': {error}",
                        path.display()
                    ))
                })?;
            }
            std::fs::write(path, hex::encode(salt)).map_err(|error| {
                AppError::Filesystem(format!(
                    "failed to persist installation salt '{}': {error}",
                    path.display()
                ))
            })?;
            Ok(salt)
        }
        Err(error) => Err(AppError::Filesystem(format!(
            "failed to read installation salt '{}': {error}",
            path.display()
        ))),
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => {
            warn!(
                path = %path.display(),
                error = %error,
                "failed to remove partial cipher output"
            );
        }
    }
}
