use std::fmt;
use std::str::FromStr;

use get_size::GetSize;
use log::error;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::DecodeError;

pub const HASH_SIZE: usize = 32;

/// Bumped whenever the byte layout produced by `CanonicalEncoder` changes.
/// Nodes running different versions will never agree on a block hash.
pub const CANONICAL_VERSION: u8 = 2;

const INVALID_HASH_SEED: &[u8] = b"Invalid block hash";

/// SHA-256 digest. Travels as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_SIZE]);

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn digest(data: &[u8]) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Sentinel returned when a value cannot be canonically encoded.
    pub fn invalid() -> Hash {
        Hash::digest(INVALID_HASH_SEED)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Hash, DecodeError> {
        decode_hex_array::<HASH_SIZE>("hash", s).map(Hash)
    }

    /// True when the first `difficulty` hex characters of the digest are all '0'.
    pub fn has_leading_zeros(&self, difficulty: usize) -> bool {
        if difficulty > HASH_SIZE * 2 {
            return false;
        }
        self.to_hex().bytes().take(difficulty).all(|c| c == b'0')
    }
}

impl GetSize for Hash {}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Decodes exactly `N` bytes from `2 * N` hex characters.
pub fn decode_hex_array<const N: usize>(
    what: &'static str,
    s: &str,
) -> Result<[u8; N], DecodeError> {
    if s.len() != N * 2 {
        return Err(DecodeError::InvalidLength {
            what,
            expected: N * 2,
            actual: s.len(),
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out)?;
    Ok(out)
}

/// Explicit byte layout fed to SHA-256 for blocks and transfers.
///
/// Every value is written big-endian; strings are u32 length-prefixed; the
/// stream starts with a domain tag and `CANONICAL_VERSION`. The layout never
/// depends on a serialization library, so any implementation that writes the
/// same bytes computes the same hashes.
pub struct CanonicalEncoder {
    buf: Vec<u8>,
    overflow: bool,
}

impl CanonicalEncoder {
    pub fn new(domain: &str) -> CanonicalEncoder {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(domain.as_bytes());
        buf.push(CANONICAL_VERSION);
        CanonicalEncoder {
            buf,
            overflow: false,
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
        self
    }

    pub fn hash(&mut self, value: &Hash) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn count(&mut self, len: usize) -> &mut Self {
        match u32::try_from(len) {
            Ok(len) => self.buf.extend_from_slice(&len.to_be_bytes()),
            Err(_) => self.overflow = true,
        }
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.count(value.len());
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// SHA-256 of the encoded stream, or the invalid-hash sentinel if a
    /// length did not fit the u32 prefix.
    pub fn digest(&self) -> Hash {
        if self.overflow {
            error!("hash: length prefix overflow, using invalid hash sentinel");
            return Hash::invalid();
        }
        Hash::digest(&self.buf)
    }
}
