//! Connection descriptor codec.
//!
//! The connection descriptor is the block of bytes the loader writes into the
//! suspended game process.  It tells the game which hostname to connect to,
//! sealed to the server's public key so that only the private key opens it.
//!
//! Block layout (exactly `capacity` bytes, all integers little-endian):
//! ```text
//! [magic "DS3O":4][version:1][reserved:1][sealed_len:2][sealed:N][zero padding]
//! ```
//!
//! The plaintext inside `sealed` is the hostname as UTF-16LE followed by a
//! NUL code unit, the string representation the game uses natively.
//!
//! `capacity` is the size of the region reserved at the patch address of a
//! particular executable build, so it is supplied per launch by the caller.
//! The encryption itself is a [`DescriptorCipher`] strategy; the default is
//! [`cipher::RsaHybridCipher`].

pub mod cipher;

use thiserror::Error;

pub use cipher::RsaHybridCipher;

/// Leading bytes of every descriptor block.
pub const MAGIC: [u8; 4] = *b"DS3O";

/// Descriptor layout version written at offset 4.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the fixed header preceding the sealed payload.
pub const HEADER_SIZE: usize = 8;

/// Errors produced while building or reading a descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// The hostname does not fit into the space available in the executable.
    #[error("descriptor needs {needed} bytes but only {capacity} are available")]
    TooLarge { needed: usize, capacity: usize },

    #[error("connection hostname is empty")]
    EmptyHostname,

    #[error("server public key is empty")]
    MissingKey,

    /// The key bytes are not a usable RSA key.
    #[error("invalid server key: {0}")]
    InvalidKey(String),

    /// The cipher strategy refused to seal or open the payload.
    #[error("cipher failure: {0}")]
    Cipher(String),

    /// The block does not follow the descriptor layout.
    #[error("corrupt descriptor: {0}")]
    Corrupt(String),
}

/// Encryption strategy for descriptor payloads.
///
/// The game process must be able to reverse whatever the strategy produces,
/// so the strategy is an external contract and can be swapped per build.
pub trait DescriptorCipher: Send + Sync {
    /// Number of bytes [`seal`](Self::seal) adds to the plaintext when
    /// sealing to `public_key`.
    fn overhead(&self, public_key: &[u8]) -> Result<usize, DescriptorError>;

    /// Encrypts `plaintext` to the server's `public_key`.
    fn seal(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DescriptorError>;

    /// Reverses [`seal`](Self::seal) with the server's `private_key`.
    fn open(&self, private_key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, DescriptorError>;
}

/// Builds and reads connection descriptor blocks.
pub struct DescriptorCodec {
    cipher: Box<dyn DescriptorCipher>,
}

impl Default for DescriptorCodec {
    fn default() -> Self {
        Self::new(RsaHybridCipher)
    }
}

impl DescriptorCodec {
    pub fn new(cipher: impl DescriptorCipher + 'static) -> Self {
        Self {
            cipher: Box::new(cipher),
        }
    }

    /// Encodes `connection_hostname` into a block of exactly `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::TooLarge`] when the sealed hostname plus
    /// header exceeds `capacity`, [`DescriptorError::EmptyHostname`] /
    /// [`DescriptorError::MissingKey`] for degenerate input, and
    /// [`DescriptorError::InvalidKey`] if the cipher cannot use the key.
    pub fn encode(
        &self,
        connection_hostname: &str,
        public_key: &[u8],
        capacity: usize,
    ) -> Result<Vec<u8>, DescriptorError> {
        if connection_hostname.trim().is_empty() {
            return Err(DescriptorError::EmptyHostname);
        }
        if public_key.is_empty() {
            return Err(DescriptorError::MissingKey);
        }

        let plaintext = encode_wide(connection_hostname);
        let needed = HEADER_SIZE + self.cipher.overhead(public_key)? + plaintext.len();
        if needed > capacity {
            return Err(DescriptorError::TooLarge { needed, capacity });
        }

        let sealed = self.cipher.seal(public_key, &plaintext)?;
        let needed = HEADER_SIZE + sealed.len();
        let sealed_len = u16::try_from(sealed.len())
            .map_err(|_| DescriptorError::TooLarge { needed, capacity })?;
        if needed > capacity {
            return Err(DescriptorError::TooLarge { needed, capacity });
        }

        let mut block = vec![0u8; capacity];
        block[..4].copy_from_slice(&MAGIC);
        block[4] = FORMAT_VERSION;
        block[6..8].copy_from_slice(&sealed_len.to_le_bytes());
        block[HEADER_SIZE..needed].copy_from_slice(&sealed);
        Ok(block)
    }

    /// Recovers the hostname from a block produced by [`encode`](Self::encode).
    /// This is the game server's side of the exchange and needs the
    /// server's private key.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::Corrupt`] for a malformed block and
    /// [`DescriptorError::Cipher`] if the key is wrong or authentication
    /// fails.
    pub fn decode(&self, block: &[u8], private_key: &[u8]) -> Result<String, DescriptorError> {
        if block.len() < HEADER_SIZE {
            return Err(DescriptorError::Corrupt(format!(
                "block is {} bytes, header alone is {HEADER_SIZE}",
                block.len()
            )));
        }
        if block[..4] != MAGIC {
            return Err(DescriptorError::Corrupt("bad magic".to_string()));
        }
        if block[4] != FORMAT_VERSION {
            return Err(DescriptorError::Corrupt(format!("unsupported version {}", block[4])));
        }

        let sealed_len = u16::from_le_bytes([block[6], block[7]]) as usize;
        let end = HEADER_SIZE + sealed_len;
        let sealed = block.get(HEADER_SIZE..end).ok_or_else(|| {
            DescriptorError::Corrupt(format!("sealed length {sealed_len} overruns block"))
        })?;

        let plaintext = self.cipher.open(private_key, sealed)?;
        decode_wide(&plaintext)
    }
}

fn encode_wide(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn decode_wide(bytes: &[u8]) -> Result<String, DescriptorError> {
    if bytes.len() % 2 != 0 {
        return Err(DescriptorError::Corrupt("odd-length wide string".to_string()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16(&units).map_err(|e| DescriptorError::Corrupt(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = include_bytes!("../../tests/fixtures/server_public.pem");
    const PRIVATE: &[u8] = include_bytes!("../../tests/fixtures/server_private.pem");
    const OTHER_PRIVATE: &[u8] = include_bytes!("../../tests/fixtures/other_private.pem");
    const CAPACITY: usize = 0x200;

    /// Identity cipher so layout tests can inspect the plaintext.
    struct PlainCipher;

    impl DescriptorCipher for PlainCipher {
        fn overhead(&self, _key: &[u8]) -> Result<usize, DescriptorError> {
            Ok(0)
        }
        fn seal(&self, _key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DescriptorError> {
            Ok(plaintext.to_vec())
        }
        fn open(&self, _key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, DescriptorError> {
            Ok(sealed.to_vec())
        }
    }

    #[test]
    fn test_encode_fills_exact_capacity_with_header() {
        // Arrange
        let codec = DescriptorCodec::new(PlainCipher);

        // Act
        let block = codec.encode("ab", KEY, 32).expect("encode");

        // Assert
        assert_eq!(block.len(), 32);
        assert_eq!(&block[..4], b"DS3O");
        assert_eq!(block[4], FORMAT_VERSION);
        assert_eq!(u16::from_le_bytes([block[6], block[7]]), 6);
        assert_eq!(&block[8..14], &[b'a', 0, b'b', 0, 0, 0]);
        assert!(block[14..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_rejects_hostname_that_does_not_fit() {
        // Arrange
        let codec = DescriptorCodec::default();
        let long_host = "a".repeat(200);

        // Act
        let result = codec.encode(&long_host, KEY, CAPACITY);

        // Assert
        let overhead = RsaHybridCipher.overhead(KEY).unwrap();
        assert_eq!(
            result,
            Err(DescriptorError::TooLarge {
                needed: HEADER_SIZE + overhead + 402,
                capacity: CAPACITY,
            })
        );
    }

    #[test]
    fn test_encode_accepts_hostname_that_exactly_fits() {
        let codec = DescriptorCodec::default();
        // 8 header + 284 overhead + 2 * (n + 1) == 320  =>  n == 13
        let host = "a".repeat(13);

        let block = codec.encode(&host, KEY, 320).expect("exact fit");

        assert_eq!(block.len(), 320);
        assert!(codec.encode(&"a".repeat(14), KEY, 320).is_err());
    }

    #[test]
    fn test_encode_rejects_empty_hostname_and_key() {
        let codec = DescriptorCodec::default();
        assert_eq!(codec.encode("  ", KEY, CAPACITY), Err(DescriptorError::EmptyHostname));
        assert_eq!(codec.encode("host", b"", CAPACITY), Err(DescriptorError::MissingKey));
    }

    #[test]
    fn test_decode_recovers_hostname_with_private_key() {
        let codec = DescriptorCodec::default();
        let block = codec.encode("ds3.example.org", KEY, CAPACITY).expect("encode");

        assert_eq!(codec.decode(&block, PRIVATE).expect("decode"), "ds3.example.org");
    }

    #[test]
    fn test_decode_needs_the_matching_private_key() {
        // Arrange
        let codec = DescriptorCodec::default();
        let block = codec.encode("secret.example", KEY, CAPACITY).expect("encode");

        // Act
        let with_public = codec.decode(&block, KEY);
        let with_other = codec.decode(&block, OTHER_PRIVATE);

        // Assert
        assert!(with_public.is_err(), "public key alone must not reveal the hostname");
        assert!(matches!(with_other, Err(DescriptorError::Cipher(_))));
    }

    #[test]
    fn test_encode_rejects_key_that_is_not_rsa() {
        let codec = DescriptorCodec::default();
        let result = codec.encode("ds3.example.org", b"opaque bytes", CAPACITY);
        assert!(matches!(result, Err(DescriptorError::InvalidKey(_))));
    }

    #[test]
    fn test_decode_rejects_bad_magic_and_overrun() {
        let codec = DescriptorCodec::new(PlainCipher);
        let mut block = codec.encode("h", KEY, 16).expect("encode");

        let mut bad_magic = block.clone();
        bad_magic[0] = b'X';
        assert!(matches!(codec.decode(&bad_magic, KEY), Err(DescriptorError::Corrupt(_))));

        block[6] = 0xFF;
        assert!(matches!(codec.decode(&block, KEY), Err(DescriptorError::Corrupt(_))));
    }

    #[test]
    fn test_wide_encoding_handles_non_ascii() {
        let bytes = encode_wide("é");
        assert_eq!(bytes, vec![0xE9, 0x00, 0x00, 0x00]);
        assert_eq!(decode_wide(&bytes).unwrap(), "é");
    }
}
