//! Cryptographic primitives used by the codec: AES-256-GCM chunk decryption.
//!
//! Deriving the AES key from a `Repository::password` (Argon2id or
//! otherwise) is out of scope here — `Codec::new` takes an already-derived
//! key directly. That derivation belongs to the out-of-scope config-file
//! store this crate's cipher-auth error message stays compatible with.

pub mod aes;

pub use aes::AesGcm;
