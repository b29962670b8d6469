//! Per-block encryption and Argon2id key derivation.
//!
//! Key derivation: Argon2id(passphrase, fixed salt) → 32-byte key
//!
//! Encrypted payload layouts, by cipher id:
//!   1 AES-256-GCM:        [ nonce (12 B) | ciphertext | GCM tag (16 B) ]
//!   2 XChaCha20-Poly1305: [ nonce (24 B) | ciphertext | tag (16 B) ]
//!
//! Like compression, the cipher is a closed id registry: the write side
//! falls back to [`CipherId::Plain`] on an unknown id, the read side
//! (`block.rs`) rejects unknown ids outright.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use aes_gcm::Aes256Gcm;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use thiserror::Error;

/// Byte length of the AES-GCM nonce prepended to every encrypted payload.
pub const GCM_NONCE_LEN: usize = 12;
/// Byte length of the XChaCha20 nonce prepended to every encrypted payload.
pub const XCHACHA_NONCE_LEN: usize = 24;

/// Secrets applied when a store is written without an explicit passphrase.
/// Changing either value breaks every store already written with them.
pub const DEFAULT_PASSPHRASE: &str = "password";
const KEY_SALT: [u8; 16] = [
    0xb8, 0x81, 0x29, 0x13, 0xd3, 0xfc, 0x8c, 0x97, 0xe1, 0xc1, 0x5b, 0xd5, 0xed, 0x18, 0x93,
    0x21,
];

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Encrypted payload too short")]
    TooShort,
    #[error("No decryption key available")]
    MissingKey,
}

/// Derive a 256-bit key from a passphrase using Argon2id.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let params = Params::new(64 * 1024, 3, 1, Some(32))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

// ── Cipher identifiers ───────────────────────────────────────────────────────

/// Wire id of an encryption algorithm, as stored in every block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipherId {
    Plain = 0,
    Aes256Gcm = 1,
    XChaCha20Poly1305 = 2,
}

impl CipherId {
    pub const ALL: [CipherId; 3] = [
        CipherId::Plain,
        CipherId::Aes256Gcm,
        CipherId::XChaCha20Poly1305,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CipherId::Plain),
            1 => Some(CipherId::Aes256Gcm),
            2 => Some(CipherId::XChaCha20Poly1305),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherId::Plain => "none",
            CipherId::Aes256Gcm => "aes-gcm",
            CipherId::XChaCha20Poly1305 => "xchacha20",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        let name = s.to_lowercase();
        CipherId::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub fn describe(self) -> &'static str {
        match self {
            CipherId::Plain => "no encryption",
            CipherId::Aes256Gcm => "AES-256-GCM",
            CipherId::XChaCha20Poly1305 => "XChaCha20-Poly1305",
        }
    }

    /// Encrypt with a random nonce; the nonce is prepended to the result.
    pub fn encrypt(self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            CipherId::Plain => Ok(plaintext.to_vec()),
            CipherId::Aes256Gcm => {
                let cipher =
                    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
                let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, plaintext)
                    .map_err(|_| CryptoError::EncryptionFailed)?;
                let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
                out.extend_from_slice(nonce.as_slice());
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
            CipherId::XChaCha20Poly1305 => {
                let cipher = XChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| CryptoError::EncryptionFailed)?;
                let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
                let ciphertext = cipher
                    .encrypt(&nonce, plaintext)
                    .map_err(|_| CryptoError::EncryptionFailed)?;
                let mut out = Vec::with_capacity(XCHACHA_NONCE_LEN + ciphertext.len());
                out.extend_from_slice(nonce.as_slice());
                out.extend_from_slice(&ciphertext);
                Ok(out)
            }
        }
    }

    /// Decrypt a payload produced by [`CipherId::encrypt`].
    pub fn decrypt(self, key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            CipherId::Plain => Ok(data.to_vec()),
            CipherId::Aes256Gcm => {
                if data.len() < GCM_NONCE_LEN {
                    return Err(CryptoError::TooShort);
                }
                let cipher =
                    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
                let nonce = aes_gcm::Nonce::from_slice(&data[..GCM_NONCE_LEN]);
                cipher
                    .decrypt(nonce, &data[GCM_NONCE_LEN..])
                    .map_err(|_| CryptoError::DecryptionFailed)
            }
            CipherId::XChaCha20Poly1305 => {
                if data.len() < XCHACHA_NONCE_LEN {
                    return Err(CryptoError::TooShort);
                }
                let cipher = XChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| CryptoError::DecryptionFailed)?;
                let nonce = XNonce::from_slice(&data[..XCHACHA_NONCE_LEN]);
                cipher
                    .decrypt(nonce, &data[XCHACHA_NONCE_LEN..])
                    .map_err(|_| CryptoError::DecryptionFailed)
            }
        }
    }
}

// ── Write-side holder ────────────────────────────────────────────────────────

/// Write-side cipher strategy plus the key material shared by both sides.
///
/// The Argon2 derivation is deferred until a non-plain cipher actually needs
/// the key, so plain stores never pay for it. The derived key is kept for
/// the life of the suite; clones carry it along.
#[derive(Debug, Clone)]
pub struct CipherSuite {
    id: CipherId,
    passphrase: String,
    key: Option<[u8; 32]>,
}

impl CipherSuite {
    /// Build a suite from a wire id, falling back to [`CipherId::Plain`]
    /// (with a warning) when the id is unknown. A missing passphrase uses
    /// the built-in [`DEFAULT_PASSPHRASE`].
    pub fn new(id: u8, passphrase: Option<&str>) -> Result<Self, CryptoError> {
        let id = match CipherId::from_id(id) {
            Some(cipher) => cipher,
            None => {
                log::warn!("unknown cipher id {id}, storing unencrypted");
                CipherId::Plain
            }
        };
        let mut suite = CipherSuite {
            id,
            passphrase: passphrase.unwrap_or(DEFAULT_PASSPHRASE).to_owned(),
            key: None,
        };
        if suite.id != CipherId::Plain {
            suite.ensure_key()?;
        }
        Ok(suite)
    }

    pub fn id(&self) -> CipherId {
        self.id
    }

    pub fn set_type(&mut self, id: u8) {
        self.id = match CipherId::from_id(id) {
            Some(cipher) => cipher,
            None => {
                log::warn!("unknown cipher id {id}, storing unencrypted");
                CipherId::Plain
            }
        };
    }

    /// Encrypt with the configured cipher.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.id == CipherId::Plain {
            return Ok(plaintext.to_vec());
        }
        let id = self.id;
        let key = self.ensure_key()?;
        id.encrypt(key, plaintext)
    }

    /// Decrypt a payload written under `id`, which may differ from the
    /// configured cipher: every block names its own.
    pub fn decrypt_as(&mut self, id: CipherId, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if id == CipherId::Plain {
            return Ok(data.to_vec());
        }
        let key = self.ensure_key()?;
        id.decrypt(key, data)
    }

    fn ensure_key(&mut self) -> Result<&[u8; 32], CryptoError> {
        if self.key.is_none() {
            self.key = Some(derive_key(&self.passphrase, &KEY_SALT)?);
        }
        self.key.as_ref().ok_or(CryptoError::MissingKey)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
