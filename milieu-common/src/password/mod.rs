use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::threadrand::SecureRng;

pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;

pub struct HashedPassword {
    pub hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub iterations: u32,
}

/// Derives a PBKDF2-HMAC-SHA256 verifier with a fresh random salt. The
/// iteration count is stored alongside the hash so it can be raised for new
/// users without invalidating old records.
pub fn hash_password(password: &str, iterations: u32) -> HashedPassword {
    let mut salt = vec![0u8; SALT_LENGTH];
    SecureRng.fill_bytes(&mut salt);

    let mut hash = vec![0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut hash);

    HashedPassword {
        hash,
        salt,
        iterations,
    }
}

pub fn verify_password(password: &str, salt: &[u8], iterations: u32, expected_hash: &[u8]) -> bool {
    let mut derived = Zeroizing::new(vec![0u8; expected_hash.len()]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut derived);

    constant_time_eq(&derived, expected_hash)
}

#[inline]
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }

    let mut diff = 0u8;

    // Do bitwise comparison to prevent timing attacks
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        diff |= a_byte ^ b_byte;
    }

    diff == 0
}
