//! AES envelope codec for request parameters and response payloads.
//!
//! Wire format: `base64(AES-CBC(key, iv = 0, PKCS#7(json(params))))`
//!
//! The key is the per-session secret handed out at login, transported as
//! base64 text. Responses are sometimes percent-encoded on top of that.

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ZaloError, ZaloResult};

/// Ordered parameter map. Key order is preserved through encoding because
/// the service checks the structure of the decrypted payload.
pub type ParamMap = Map<String, Value>;

const BLOCK_SIZE: usize = 16;
const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// The per-session codec secret.
///
/// Keeps the original base64 text next to the decoded bytes so the secret
/// can be exported exactly as it was imported.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    text: String,
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Parse a base64 secret. The decoded key must be 16, 24 or 32 bytes.
    pub fn from_base64(text: &str) -> ZaloResult<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| ZaloError::InvalidSecret(e.to_string()))?;

        match bytes.len() {
            16 | 24 | 32 => Ok(Self {
                text: text.to_string(),
                bytes,
            }),
            n => Err(ZaloError::InvalidSecret(format!(
                "expected a 16, 24 or 32 byte key, got {n} bytes"
            ))),
        }
    }

    /// The secret exactly as it was imported.
    pub fn to_base64(&self) -> &str {
        &self.text
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Encode a parameter map into the transport form.
pub fn encode(params: &ParamMap, secret: &SecretKey) -> ZaloResult<String> {
    let plaintext = serde_json::to_vec(params)?;
    let ciphertext = match secret.bytes.len() {
        16 => seal::<cbc::Encryptor<Aes128>>(&secret.bytes, &plaintext)?,
        24 => seal::<cbc::Encryptor<Aes192>>(&secret.bytes, &plaintext)?,
        _ => seal::<cbc::Encryptor<Aes256>>(&secret.bytes, &plaintext)?,
    };
    Ok(STANDARD.encode(ciphertext))
}

/// Decode a transport payload back into a parameter map.
///
/// Fails with [`ZaloError::Decode`] when the payload is malformed or does not
/// decrypt under `secret`.
pub fn decode(payload: &str, secret: &SecretKey) -> ZaloResult<ParamMap> {
    let unquoted = urlencoding::decode(payload.trim())
        .map_err(|e| ZaloError::Decode(format!("bad percent-encoding: {e}")))?;
    let ciphertext = STANDARD
        .decode(unquoted.as_bytes())
        .map_err(|e| ZaloError::Decode(format!("bad base64: {e}")))?;

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(ZaloError::Decode(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let plaintext = match secret.bytes.len() {
        16 => open::<cbc::Decryptor<Aes128>>(&secret.bytes, &ciphertext)?,
        24 => open::<cbc::Decryptor<Aes192>>(&secret.bytes, &ciphertext)?,
        _ => open::<cbc::Decryptor<Aes256>>(&secret.bytes, &ciphertext)?,
    };

    let value: Value = serde_json::from_slice(&plaintext)
        .map_err(|e| ZaloError::Decode(format!("payload is not JSON: {e}")))?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ZaloError::Decode(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn seal<C: KeyIvInit + BlockEncryptMut>(key: &[u8], plaintext: &[u8]) -> ZaloResult<Vec<u8>> {
    let cipher = C::new_from_slices(key, &ZERO_IV)
        .map_err(|e| ZaloError::InvalidSecret(e.to_string()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn open<C: KeyIvInit + BlockDecryptMut>(key: &[u8], ciphertext: &[u8]) -> ZaloResult<Vec<u8>> {
    let cipher = C::new_from_slices(key, &ZERO_IV)
        .map_err(|e| ZaloError::InvalidSecret(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ZaloError::Decode("bad padding (wrong secret?)".into()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
