use std::fmt;

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::DecodeError;
use crate::hash::decode_hex_array;

const COORDINATE_SIZE: usize = 32;
const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// ECDSA P-256 verifying key. Wire form: X‖Y, 64 hex characters each.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_hex(s: &str) -> Result<PublicKey, DecodeError> {
        let xy = decode_hex_array::<{ COORDINATE_SIZE * 2 }>("public key", s)?;
        let mut sec1 = [0u8; COORDINATE_SIZE * 2 + 1];
        sec1[0] = SEC1_UNCOMPRESSED_TAG;
        sec1[1..].copy_from_slice(&xy);
        VerifyingKey::from_sec1_bytes(&sec1)
            .map(PublicKey)
            .map_err(|_| DecodeError::InvalidPublicKey)
    }

    pub fn to_hex(&self) -> String {
        let point = self.0.to_encoded_point(false);
        // drop the SEC1 tag byte, keep X‖Y
        hex::encode(&point.as_bytes()[1..])
    }

    /// Verifies `signature` over SHA-256(`message`).
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.0.verify(message, &signature.0).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// ECDSA signature. Wire form: r‖s as two 256-bit big-endian integers.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(EcdsaSignature);

impl Signature {
    pub fn from_hex(s: &str) -> Result<Signature, DecodeError> {
        let rs = decode_hex_array::<{ COORDINATE_SIZE * 2 }>("signature", s)?;
        EcdsaSignature::from_slice(&rs)
            .map(Signature)
            .map_err(|_| DecodeError::InvalidSignature)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// Signing side of a wallet. Key material never leaves the process except
/// through `private_key_hex`, which the CLI prints once at creation.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    pub fn generate() -> KeyPair {
        KeyPair {
            signing: SigningKey::random(&mut OsRng),
        }
    }

    pub fn from_private_hex(s: &str) -> Result<KeyPair, DecodeError> {
        let bytes = decode_hex_array::<COORDINATE_SIZE>("private key", s)?;
        let signing =
            SigningKey::from_slice(&bytes).map_err(|_| DecodeError::InvalidPrivateKey)?;
        Ok(KeyPair { signing })
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().clone())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature: EcdsaSignature = self.signing.sign(message);
        Signature(signature)
    }
}
