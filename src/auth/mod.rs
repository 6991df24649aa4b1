use alloy_primitives::{Address, B256};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::calls::TokenCall;

/// Ledger address of an ed25519 key: the last 20 bytes of SHA-256(pk).
pub fn address_of(key: &VerifyingKey) -> Address {
    let digest = Sha256::digest(key.as_bytes());
    Address::from_slice(&digest[12..])
}

pub fn call_digest(call: &TokenCall, nonce: u64) -> Result<B256, AuthError> {
    let mut hasher = Sha256::new();
    hasher.update(b"cprx-call");
    hasher.update(nonce.to_le_bytes());
    hasher.update(serde_json::to_vec(call)?);
    let digest: [u8; 32] = hasher.finalize().into();
    Ok(B256::from(digest))
}

/// A call authenticated by the key whose address becomes the caller.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedCall {
    pub call: TokenCall,
    pub nonce: u64,
    #[serde(with = "crate::auth::serde_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::auth::serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedCall {
    pub fn sign(key: &SigningKey, call: TokenCall, nonce: u64) -> Result<Self, AuthError> {
        let digest = call_digest(&call, nonce)?;
        let signature = key.sign(digest.as_slice());
        Ok(Self {
            call,
            nonce,
            public_key: key.verifying_key().as_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        })
    }

    pub fn digest(&self) -> Result<B256, AuthError> {
        call_digest(&self.call, self.nonce)
    }

    /// Checks the signature and returns the signer's address.
    pub fn verify(&self) -> Result<Address, AuthError> {
        let key_bytes: [u8; 32] = self
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::MalformedKey)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| AuthError::MalformedKey)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| AuthError::MalformedSignature)?;
        let digest = self.digest()?;
        key.verify_strict(digest.as_slice(), &signature)
            .map_err(|_| AuthError::InvalidSignature)?;
        Ok(address_of(&key))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("public key is not a valid ed25519 key")]
    MalformedKey,
    #[error("signature is not 64 bytes")]
    MalformedSignature,
    #[error("signature does not match call")]
    InvalidSignature,
    #[error("call encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded.trim_start_matches("0x")).map_err(D::Error::custom)
    }
}
