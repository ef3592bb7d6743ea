use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes128Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;
use zeroize::Zeroizing;

/// The size of the AES-128 key in bytes, and the length of a key seed in characters.
pub const KEY_SIZE: usize = 16;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// The legacy initialization vector. Every legacy ciphertext uses it.
const ZERO_IV: [u8; 16] = [0u8; 16];

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Errors raised by the session secret cipher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The key seed is not exactly 16 ASCII characters.
    #[error("Invalid key size: key must be 16 ASCII characters, got {0}")]
    InvalidKey(usize),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// The ciphertext could not be decrypted with the given key.
    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// The cipher used to protect a session password under a key taken from the
/// tail of the session identifier.
///
/// Both suites share the key contract: a 16 character ASCII seed used verbatim
/// as an AES-128 key. They differ in how the IV is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherSuite {
    /// AES-128-CBC, PKCS#7 padding and an all-zero IV.
    ///
    /// ⚠️ A static IV leaks equality of plaintexts encrypted under the same
    /// key. Only use this to read or write data shared with a legacy directory.
    LegacyCbc,
    /// AES-128-GCM with a random nonce stored after the ciphertext:
    /// `base64(ciphertext || nonce)`.
    #[default]
    Sealed,
}

impl CipherSuite {
    /// Parses a suite name as found in configuration (`legacy` or `sealed`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "legacy" | "legacy-cbc" | "cbc" => Some(CipherSuite::LegacyCbc),
            "sealed" | "gcm" => Some(CipherSuite::Sealed),
            _ => None,
        }
    }

    /// Encrypts `plaintext` under `key_seed` and returns standard Base64.
    ///
    /// # Errors
    ///
    /// `CryptoError::InvalidKey` when `key_seed` is not 16 ASCII characters.
    pub fn encrypt(&self, key_seed: &str, plaintext: &str) -> Result<String, CryptoError> {
        let key = key_from_seed(key_seed)
            .ok_or(CryptoError::InvalidKey(key_seed.chars().count()))?;

        let ciphertext = match self {
            CipherSuite::LegacyCbc => Aes128CbcEnc::new((&*key).into(), &ZERO_IV.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
            CipherSuite::Sealed => {
                let cipher = Aes128Gcm::new((&*key).into());

                let mut nonce_bytes = [0u8; NONCE_SIZE];
                OsRng.fill_bytes(&mut nonce_bytes);
                let nonce = Nonce::from(nonce_bytes);

                let mut sealed = cipher
                    .encrypt(&nonce, plaintext.as_bytes())
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                sealed.extend_from_slice(&nonce_bytes);
                sealed
            }
        };

        Ok(general_purpose::STANDARD.encode(ciphertext))
    }

    /// Decrypts a Base64 `ciphertext` produced by [`CipherSuite::encrypt`].
    ///
    /// # Errors
    ///
    /// `CryptoError::Decryption` for a malformed ciphertext, a wrong key or a
    /// key seed of the wrong length.
    pub fn decrypt(
        &self,
        key_seed: &str,
        ciphertext: &str,
    ) -> Result<Zeroizing<String>, CryptoError> {
        let key = key_from_seed(key_seed).ok_or_else(|| {
            CryptoError::Decryption(format!(
                "key must be {} ASCII characters, got {}",
                KEY_SIZE,
                key_seed.chars().count()
            ))
        })?;

        let raw = general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {}", e)))?;

        let plaintext = match self {
            CipherSuite::LegacyCbc => Aes128CbcDec::new((&*key).into(), &ZERO_IV.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&raw)
                .map_err(|_| CryptoError::Decryption("bad padding or key".to_string()))?,
            CipherSuite::Sealed => {
                if raw.len() < NONCE_SIZE {
                    return Err(CryptoError::Decryption("ciphertext too short".to_string()));
                }
                let (sealed, nonce_bytes) = raw.split_at(raw.len() - NONCE_SIZE);
                let nonce = Nonce::from_slice(nonce_bytes);

                Aes128Gcm::new((&*key).into())
                    .decrypt(nonce, sealed)
                    .map_err(|e| CryptoError::Decryption(e.to_string()))?
            }
        };

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".to_string()))
    }
}

/// Uses the seed bytes verbatim as the AES key. No truncation, no padding.
fn key_from_seed(key_seed: &str) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
    if !key_seed.is_ascii() {
        return None;
    }
    let bytes: [u8; KEY_SIZE] = key_seed.as_bytes().try_into().ok()?;
    Some(Zeroizing::new(bytes))
}
