//! C4: authenticated... in practice confidentiality-only... encryption of
//! payloads (spec §4.4). AES-256-CBC under a key either supplied directly
//! (a 64-hex-character pre-shared key) or derived from a passphrase via
//! PBKDF2-HMAC-SHA-512.

use crate::error::{Result, StorageError};
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde_json::Value;
use sha2::Sha512;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const PBKDF2_ROUNDS: u32 = 100_000;
const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;

/// Either a 64-hex-character pre-shared key, or a passphrase subject to
/// key derivation (spec §4.4 "Modes").
#[derive(Debug, Clone)]
pub enum KeyInput {
    Raw([u8; KEY_LEN]),
    Passphrase(String),
}

impl KeyInput {
    pub fn parse(input: &str) -> Self {
        if input.len() == 64 {
            if let Ok(bytes) = hex::decode(input) {
                if let Ok(raw) = <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
                    return KeyInput::Raw(raw);
                }
            }
        }
        KeyInput::Passphrase(input.to_string())
    }

    fn derive(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        match self {
            KeyInput::Raw(key) => *key,
            KeyInput::Passphrase(pass) => {
                let mut out = [0u8; KEY_LEN];
                pbkdf2::pbkdf2_hmac::<Sha512>(pass.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
                out
            }
        }
    }
}

/// Encrypts `value` into the wire format `salt_hex:iv_hex:ciphertext_hex`.
pub fn encrypt(value: &Value, key: &KeyInput) -> Result<String> {
    let plaintext = serde_json::to_vec(value)?;

    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let derived = key.derive(&salt);
    let ciphertext = Aes256CbcEnc::new(&derived.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    Ok(format!("{}:{}:{}", hex::encode(salt), hex::encode(iv), hex::encode(ciphertext)))
}

/// Decrypts a `salt_hex:iv_hex:ciphertext_hex` blob back into a value.
/// Falls back to treating the input as plaintext JSON if it carries no
/// colon, per spec §4.4 — but a blob that *looks* encrypted and fails to
/// decrypt never silently downgrades to plaintext.
pub fn decrypt(blob: &str, key: &KeyInput) -> Result<Value> {
    let parts: Vec<&str> = blob.splitn(3, ':').collect();
    if parts.len() != 3 {
        return serde_json::from_str(blob).map_err(|e| {
            StorageError::DecryptionError(format!("not an encrypted blob and not valid JSON: {e}")).into()
        });
    }

    let [salt_hex, iv_hex, ct_hex] = [parts[0], parts[1], parts[2]];
    let salt = hex::decode(salt_hex).map_err(|e| StorageError::DecryptionError(format!("bad salt: {e}")))?;
    let iv = hex::decode(iv_hex).map_err(|e| StorageError::DecryptionError(format!("bad iv: {e}")))?;
    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| StorageError::DecryptionError("iv has wrong length".to_string()))?;
    let ciphertext = hex::decode(ct_hex).map_err(|e| StorageError::DecryptionError(format!("bad ciphertext: {e}")))?;

    let derived = key.derive(&salt);
    let plaintext = Aes256CbcDec::new(&derived.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| StorageError::DecryptionError("MAC/padding failure".to_string()))?;

    serde_json::from_slice(&plaintext).map_err(|e| StorageError::DecryptionError(format!("decrypted payload wasn't valid JSON: {e}")).into())
}
