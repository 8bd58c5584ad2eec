//! PBKDF2-HMAC-SHA256 password-based key derivation.

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use envcrypt_common::CryptoError;
use sha2::Sha256;

use crate::keys::{KeyMaterial, KEY_LEN};

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Byte length of a generated salt (256 bits).
pub const SALT_LEN: usize = 32;

/// A derived key together with the salt needed to derive it again.
///
/// Persist the salt next to whatever the key protects.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: KeyMaterial,
    pub salt: Vec<u8>,
}

/// Derive a 256-bit key from `password`.
///
/// Without a `salt`, a fresh random one is generated. The salt is always
/// returned alongside the key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidArgument`] if `password` is empty,
/// `iterations` is zero, or an explicit `salt` is empty.
pub fn derive_key(
    password: &[u8],
    salt: Option<&[u8]>,
    iterations: u32,
) -> Result<DerivedKey, CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::InvalidArgument("password must not be empty".into()));
    }
    if iterations == 0 {
        return Err(CryptoError::InvalidArgument("iterations must be > 0".into()));
    }
    let salt = match salt {
        Some([]) => {
            return Err(CryptoError::InvalidArgument("salt must not be empty".into()));
        }
        Some(salt) => salt.to_vec(),
        None => {
            let mut salt = vec![0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            salt
        }
    };

    let mut out = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, &salt, iterations, &mut out);
    let key = KeyMaterial::new(out);
    zeroize::Zeroize::zeroize(&mut out);
    Ok(DerivedKey { key, salt })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_sha256_reference_vector() {
        // PBKDF2-HMAC-SHA256("password", "salt", 1, 32)
        let derived = derive_key(b"password", Some(b"salt"), 1).unwrap();
        let expected: [u8; 32] = [
            0x12, 0x0f, 0xb6, 0xcf, 0xfc, 0xf8, 0xb3, 0x2c, 0x43, 0xe7, 0x22, 0x52, 0x56, 0xc4,
            0xf8, 0x37, 0xa8, 0x65, 0x48, 0xc9, 0x2c, 0xcc, 0x35, 0x48, 0x08, 0x05, 0x98, 0x7c,
            0xb7, 0x0b, 0xe1, 0x7b,
        ];
        assert_eq!(derived.key.as_bytes(), &expected);
        assert_eq!(derived.salt, b"salt");
    }

    #[test]
    fn same_inputs_same_key() {
        let a = derive_key(b"hunter2", Some(b"pepper"), 1_000).unwrap();
        let b = derive_key(b"hunter2", Some(b"pepper"), 1_000).unwrap();
        assert_eq!(a.key.as_bytes(), b.key.as_bytes());
    }

    #[test]
    fn generated_salt_is_returned_and_reusable() {
        let first = derive_key(b"hunter2", None, 1_000).unwrap();
        assert_eq!(first.salt.len(), SALT_LEN);
        let again = derive_key(b"hunter2", Some(&first.salt), 1_000).unwrap();
        assert_eq!(first.key.as_bytes(), again.key.as_bytes());
    }

    #[test]
    fn fresh_salts_differ() {
        let a = derive_key(b"hunter2", None, 1_000).unwrap();
        let b = derive_key(b"hunter2", None, 1_000).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.key.as_bytes(), b.key.as_bytes());
    }

    #[test]
    fn iteration_count_matters() {
        let a = derive_key(b"hunter2", Some(b"salt"), 1_000).unwrap();
        let b = derive_key(b"hunter2", Some(b"salt"), 1_001).unwrap();
        assert_ne!(a.key.as_bytes(), b.key.as_bytes());
    }

    #[test]
    fn default_iterations_derive_full_length_key() {
        let derived = derive_key(b"hunter2", None, DEFAULT_ITERATIONS).unwrap();
        assert_eq!(derived.key.as_bytes().len(), KEY_LEN);
    }

    #[test]
    fn invalid_arguments_rejected() {
        assert!(matches!(
            derive_key(b"", None, DEFAULT_ITERATIONS),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            derive_key(b"pw", None, 0),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            derive_key(b"pw", Some(b""), 1),
            Err(CryptoError::InvalidArgument(_))
        ));
    }
}
