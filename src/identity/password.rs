//! PBKDF2-HMAC-SHA256 password hashing

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::pbkdf2;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Iterations used for new hashes
pub const DEFAULT_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Stored password hash; carries its own parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub iterations: u32,
    /// Base64 salt
    pub salt: String,
    /// Base64 derived key
    pub hash: String,
}

impl PasswordHash {
    /// Hash `password` with a fresh random salt
    pub fn new(password: &str, iterations: u32) -> Self {
        let iterations = iterations.max(1);
        let salt: [u8; SALT_LEN] = rand::random();
        let mut out = [0u8; HASH_LEN];
        pbkdf2::derive(
            ALGORITHM,
            non_zero(iterations),
            &salt,
            password.as_bytes(),
            &mut out,
        );

        Self {
            iterations,
            salt: STANDARD.encode(salt),
            hash: STANDARD.encode(out),
        }
    }

    /// Constant-time check of `password` against this hash
    pub fn verify(&self, password: &str) -> bool {
        let (Ok(salt), Ok(hash)) = (STANDARD.decode(&self.salt), STANDARD.decode(&self.hash))
        else {
            tracing::warn!("Stored password hash is not valid base64");
            return false;
        };
        pbkdf2::verify(
            ALGORITHM,
            non_zero(self.iterations),
            &salt,
            password.as_bytes(),
            &hash,
        )
        .is_ok()
    }
}

fn non_zero(iterations: u32) -> NonZeroU32 {
    NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN)
}
