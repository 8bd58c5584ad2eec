//! Cryptographic engines: AEAD envelopes, HMAC signatures, hashing and KDF.
//!
//! This module is free of configuration and I/O. The cipher and the
//! authenticator borrow key copies from [`KeyManager`](crate::keys::KeyManager)
//! for one operation at a time; the hasher and the KDF need no managed key.
//!
//! # Envelope format
//!
//! ```text
//! {"keyId":"<id>","nonce":"<b64>","cipherText":"<b64>","authTag":"<b64>"}
//! ```
//!
//! The embedded key id lets envelopes outlive key rotation.

pub mod cipher;
pub mod hash;
pub mod kdf;
pub mod mac;

pub use cipher::{EnvelopeCipher, NONCE_LEN, TAG_LEN};
pub use hash::Hasher;
pub use kdf::{derive_key, DerivedKey, DEFAULT_ITERATIONS};
pub use mac::MessageAuthenticator;
