//! Cryptographic primitives for the Attestor kernel.
//!
//! Wraps Ed25519 signing with strong types. Keys carry their class in the
//! type: a `Keypair<role::Checkpoint>` can only produce checkpoint signatures,
//! and a `PublicKey<role::PolicyIssuer>` can only verify policy signatures.
//! The class is also mixed into every signed message as a domain prefix, so a
//! signature made under one class never verifies under another even if the
//! same key bytes were reused.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use subtle::ConstantTimeEq;

use crate::canonical::compute_bytes_hash;
use crate::error::CoreError;

/// The only signature algorithm the kernel issues or accepts.
pub const ALGORITHM: &str = "Ed25519";

/// Closed set of key classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyClass {
    /// Signs policy artifacts.
    PolicyIssuer,
    /// Signs receipts recording measurement and enforcement events.
    Enforcement,
    /// Reserved for chain-level attestations.
    Chain,
    /// Signs checkpoint records.
    Checkpoint,
    /// Reserved for bundle-level attestations.
    Bundle,
}

impl KeyClass {
    /// All key classes.
    pub const ALL: [KeyClass; 5] = [
        KeyClass::PolicyIssuer,
        KeyClass::Enforcement,
        KeyClass::Chain,
        KeyClass::Checkpoint,
        KeyClass::Bundle,
    ];

    /// Stable textual name.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyClass::PolicyIssuer => "policy-issuer",
            KeyClass::Enforcement => "enforcement",
            KeyClass::Chain => "chain",
            KeyClass::Checkpoint => "checkpoint",
            KeyClass::Bundle => "bundle",
        }
    }

    /// Domain separation prefix for signatures made with this class.
    pub fn domain(self) -> &'static [u8] {
        match self {
            KeyClass::PolicyIssuer => b"attestor/policy-issuer/v1\0",
            KeyClass::Enforcement => b"attestor/enforcement/v1\0",
            KeyClass::Chain => b"attestor/chain/v1\0",
            KeyClass::Checkpoint => b"attestor/checkpoint/v1\0",
            KeyClass::Bundle => b"attestor/bundle/v1\0",
        }
    }
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Type-level key class marker.
///
/// Sealed: the set of roles is exactly [`KeyClass`].
pub trait KeyRole:
    sealed::Sealed + Clone + Copy + PartialEq + Eq + std::hash::Hash + fmt::Debug + Send + Sync + 'static
{
    /// The runtime class this role stands for.
    const CLASS: KeyClass;
}

/// Marker types for each [`KeyClass`].
pub mod role {
    use super::{sealed, KeyClass, KeyRole};

    macro_rules! key_role {
        ($(#[$doc:meta])* $name:ident => $class:expr) => {
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name;

            impl sealed::Sealed for $name {}

            impl KeyRole for $name {
                const CLASS: KeyClass = $class;
            }
        };
    }

    key_role!(
        /// Policy artifact issuer.
        PolicyIssuer => KeyClass::PolicyIssuer
    );
    key_role!(
        /// Receipt signer.
        Enforcement => KeyClass::Enforcement
    );
    key_role!(
        /// Chain-level signer.
        Chain => KeyClass::Chain
    );
    key_role!(
        /// Checkpoint signer.
        Checkpoint => KeyClass::Checkpoint
    );
    key_role!(
        /// Bundle-level signer.
        Bundle => KeyClass::Bundle
    );
}

fn domain_message(class: KeyClass, message: &[u8]) -> Vec<u8> {
    let domain = class.domain();
    let mut buf = Vec::with_capacity(domain.len() + message.len());
    buf.extend_from_slice(domain);
    buf.extend_from_slice(message);
    buf
}

/// Compare two byte strings in time independent of where they first differ.
///
/// Lengths are not secret; differing lengths return `false` immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// An 8-byte key fingerprint: the first 8 bytes of SHA-256(public key).
///
/// Rendered as 16 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub [u8; 8]);

impl KeyId {
    /// Derive the fingerprint of raw public key bytes.
    pub fn derive(public_key: &[u8; 32]) -> Self {
        let digest = compute_bytes_hash(public_key);
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&digest.0[..8]);
        Self(arr)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 16-character lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 16 || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(CoreError::MalformedKey(format!("invalid key id: {s}")));
        }
        let mut arr = [0u8; 8];
        hex::decode_to_slice(s, &mut arr).map_err(|e| CoreError::MalformedKey(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Constant-time comparison.
    pub fn ct_eq(&self, other: &KeyId) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for KeyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A 64-byte Ed25519 signature, rendered as 128 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let mut arr = [0u8; 64];
        hex::decode_to_slice(s, &mut arr)
            .map_err(|e| CoreError::DecodingError(format!("signature: {e}")))?;
        Ok(Self(arr))
    }

    /// Constant-time comparison.
    pub fn ct_eq(&self, other: &Signature) -> bool {
        constant_time_eq(&self.0, &other.0)
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; 64]);
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A 32-byte Ed25519 public key of a fixed class.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey<R: KeyRole> {
    bytes: [u8; 32],
    _role: PhantomData<R>,
}

impl<R: KeyRole> PublicKey<R> {
    /// Create from raw bytes, rejecting points that are not valid keys.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CoreError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self {
            bytes,
            _role: PhantomData,
        })
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// The class this key belongs to.
    pub fn class(&self) -> KeyClass {
        R::CLASS
    }

    /// The key fingerprint.
    pub fn key_id(&self) -> KeyId {
        KeyId::derive(&self.bytes)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr).map_err(|e| CoreError::MalformedKey(e.to_string()))?;
        Self::from_bytes(arr)
    }

    /// Export as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }

    /// Import from standard base64.
    pub fn from_base64(s: &str) -> Result<Self, CoreError> {
        let decoded = BASE64
            .decode(s)
            .map_err(|e| CoreError::MalformedKey(e.to_string()))?;
        let arr: [u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::MalformedKey(format!("expected 32 bytes, got {}", decoded.len())))?;
        Self::from_bytes(arr)
    }

    /// Verify a signature over a message made by a key of this class.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CoreError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.bytes).map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = DalekSignature::from_bytes(&signature.0);
        verifying_key
            .verify(&domain_message(R::CLASS, message), &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }

    /// Boolean form of [`verify`](Self::verify).
    pub fn verifies(&self, message: &[u8], signature: &Signature) -> bool {
        self.verify(message, signature).is_ok()
    }

    /// Describe this key for inclusion in a bundle.
    pub fn to_info(&self) -> PublicKeyInfo {
        PublicKeyInfo {
            key_class: R::CLASS,
            algorithm: ALGORITHM.to_string(),
            key_id: self.key_id(),
            public_key: self.to_base64(),
        }
    }
}

impl<R: KeyRole> fmt::Debug for PublicKey<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey<{}>({})", R::CLASS, self.key_id())
    }
}

/// A public key together with its declared class, as carried in bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PublicKeyInfo {
    /// Declared key class.
    pub key_class: KeyClass,
    /// Signature algorithm; always `Ed25519`.
    pub algorithm: String,
    /// Declared fingerprint.
    pub key_id: KeyId,
    /// Base64 public key bytes.
    pub public_key: String,
}

impl PublicKeyInfo {
    /// Recover a typed key.
    ///
    /// Fails if the declared class is not `R`'s class, the algorithm is not
    /// Ed25519, the key bytes are invalid, or the declared key id does not
    /// match the key bytes.
    pub fn to_public_key<R: KeyRole>(&self) -> Result<PublicKey<R>, CoreError> {
        if self.key_class != R::CLASS {
            return Err(CoreError::KeyClassMismatch {
                expected: R::CLASS,
                got: self.key_class,
            });
        }
        if self.algorithm != ALGORITHM {
            return Err(CoreError::UnsupportedAlgorithm(self.algorithm.clone()));
        }
        let key = PublicKey::<R>::from_base64(&self.public_key)?;
        let derived = key.key_id();
        if !derived.ct_eq(&self.key_id) {
            return Err(CoreError::KeyIdMismatch {
                declared: self.key_id.to_hex(),
                derived: derived.to_hex(),
            });
        }
        Ok(key)
    }
}

/// An Ed25519 signing keypair of a fixed class.
///
/// Private key material never leaves this type except through
/// [`seed`](Self::seed); custody is the caller's concern.
pub struct Keypair<R: KeyRole> {
    signing_key: SigningKey,
    _role: PhantomData<R>,
}

impl<R: KeyRole> Keypair<R> {
    /// Generate a new random keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            signing_key,
            _role: PhantomData,
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
            _role: PhantomData,
        }
    }

    /// The class of this keypair.
    pub fn class(&self) -> KeyClass {
        R::CLASS
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey<R> {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
            _role: PhantomData,
        }
    }

    /// The key fingerprint.
    pub fn key_id(&self) -> KeyId {
        self.public_key().key_id()
    }

    /// Sign a message under this key's class domain.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(&domain_message(R::CLASS, message));
        Signature(sig.to_bytes())
    }

    /// Get the raw seed bytes (secret key material).
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl<R: KeyRole> Clone for Keypair<R> {
    fn clone(&self) -> Self {
        Self {
            signing_key: self.signing_key.clone(),
            _role: PhantomData,
        }
    }
}

impl<R: KeyRole> fmt::Debug for Keypair<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair<{}>({})", R::CLASS, self.key_id())
    }
}
