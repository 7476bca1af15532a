//! # Attestor Core
//!
//! Pure primitives for the Attestor kernel: canonical JSON, typed Ed25519
//! keys, signed receipts, and hash-linked receipt chains.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Digest`] - A SHA-256 digest, always rendered as 64 lowercase hex
//! - [`Keypair`] / [`PublicKey`] - Ed25519 keys typed by [`KeyClass`]
//! - [`SignedReceipt`] - One signed, hash-linked event
//! - [`ReceiptChain`] - The single-writer chain that issues receipts
//!
//! ## Canonicalization
//!
//! Every hash and signature input is canonical JSON. See [`canonical`].

pub mod canonical;
pub mod chain;
pub mod crypto;
pub mod error;
pub mod receipt;
pub mod types;
pub mod validation;

pub use canonical::{
    canonical_json, canonical_json_without, canonicalize, compute_bytes_hash, generate_salt,
    hash_canonical, hash_concat,
};
pub use chain::{ChainEvent, ChainHead, ReceiptChain, SourceEvent};
pub use crypto::{
    constant_time_eq, role, KeyClass, KeyId, KeyRole, Keypair, PublicKey, PublicKeyInfo, Signature,
};
pub use error::{ChainError, CoreError, FailureKind};
pub use receipt::{
    compute_leaf_hash, DriftSeverity, EnforcementAction, EventPayload, EventType, ReceiptBuilder,
    RunOutcome, SignedReceipt,
};
pub use types::{Digest, Timestamp};
pub use validation::{
    verify_chain_integrity, verify_receipt_signatures, ChainReport, SignatureReport,
};
