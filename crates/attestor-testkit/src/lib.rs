//! # Attestor Testkit
//!
//! Testing utilities for the Attestor kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Pinned hashes, key ids and signatures for cross-implementation verification
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Seeded issuers, chains, and bundles for setting up test scenarios
//!
//! ## Golden Vectors
//!
//! Golden vectors pin canonical encoding and signing byte for byte:
//!
//! ```rust
//! use attestor_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, got) in verify_all_vectors() {
//!     assert!(matches, "{name}: {got}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use attestor_testkit::generators::{chain_from_params, ChainParams};
//!
//! proptest! {
//!     #[test]
//!     fn chain_is_deterministic(params: ChainParams) {
//!         let a = chain_from_params(&params);
//!         let b = chain_from_params(&params);
//!         prop_assert_eq!(a.head(), b.head());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust
//! use attestor_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::with_seed(0x11);
//! let bundle = fixture.bundle(3);
//! assert_eq!(bundle.receipts.len(), 5);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, issuer_fixtures, TestFixture};
pub use generators::{chain_from_params, ChainParams};
pub use vectors::{
    all_vectors, digest_vectors, generate_receipt_from_vector, key_vectors, verify_all_vectors,
    GoldenVector,
};
