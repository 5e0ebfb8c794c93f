//! Default descriptor cipher: RSA-OAEP key wrap over ChaCha20-Poly1305.
//!
//! Servers hand out an RSA public key (PEM, PKCS#1 `RSA PUBLIC KEY` or SPKI
//! `PUBLIC KEY`).  Each descriptor gets a fresh 256-bit content key that is
//! wrapped to the server key with RSA-OAEP (SHA-256); the hostname is sealed
//! under the content key with ChaCha20-Poly1305 and a random nonce:
//!
//! ```text
//! [wrapped key: modulus bytes][nonce:12][ciphertext:N][tag:16]
//! ```
//!
//! Only the holder of the matching private key can unwrap the content key.
//! `KEY_CONTEXT` is the associated data, so a block sealed for another
//! purpose does not authenticate here.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::{DescriptorCipher, DescriptorError};

const KEY_CONTEXT: &[u8] = b"ds3os connection descriptor v2";
const CONTENT_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Hybrid RSA-OAEP / ChaCha20-Poly1305 descriptor cipher.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaHybridCipher;

fn pem_text<'a>(key: &'a [u8], what: &str) -> Result<&'a str, DescriptorError> {
    std::str::from_utf8(key)
        .map(str::trim)
        .map_err(|_| DescriptorError::InvalidKey(format!("{what} is not PEM text")))
}

/// Parses a PKCS#1 or SPKI PEM public key.
pub fn parse_public_key(key: &[u8]) -> Result<RsaPublicKey, DescriptorError> {
    let pem = pem_text(key, "public key")?;
    RsaPublicKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
        .map_err(|e| DescriptorError::InvalidKey(format!("public key: {e}")))
}

/// Parses a PKCS#1 or PKCS#8 PEM private key.
pub fn parse_private_key(key: &[u8]) -> Result<RsaPrivateKey, DescriptorError> {
    let pem = pem_text(key, "private key")?;
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| DescriptorError::InvalidKey(format!("private key: {e}")))
}

impl DescriptorCipher for RsaHybridCipher {
    fn overhead(&self, public_key: &[u8]) -> Result<usize, DescriptorError> {
        Ok(parse_public_key(public_key)?.size() + NONCE_LEN + TAG_LEN)
    }

    fn seal(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DescriptorError> {
        let server_key = parse_public_key(public_key)?;
        let content_key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let wrapped = server_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), content_key.as_slice())
            .map_err(|e| DescriptorError::Cipher(format!("key wrap: {e}")))?;

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = ChaCha20Poly1305::new(&content_key)
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: KEY_CONTEXT,
                },
            )
            .map_err(|e| DescriptorError::Cipher(e.to_string()))?;

        let mut sealed = Vec::with_capacity(wrapped.len() + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&wrapped);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, private_key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, DescriptorError> {
        let server_key = parse_private_key(private_key)?;
        let wrapped_len = server_key.size();
        if sealed.len() < wrapped_len + NONCE_LEN + TAG_LEN {
            return Err(DescriptorError::Corrupt(format!(
                "sealed payload is {} bytes, shorter than wrapped key, nonce and tag",
                sealed.len()
            )));
        }

        let (wrapped, rest) = sealed.split_at(wrapped_len);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let content_key = server_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| DescriptorError::Cipher(format!("key unwrap: {e}")))?;
        if content_key.len() != CONTENT_KEY_LEN {
            return Err(DescriptorError::Corrupt(format!(
                "unwrapped key is {} bytes",
                content_key.len()
            )));
        }

        ChaCha20Poly1305::new(Key::from_slice(&content_key))
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: KEY_CONTEXT,
                },
            )
            .map_err(|e| DescriptorError::Cipher(e.to_string()))
    }
}
