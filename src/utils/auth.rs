use rand::RngCore;
use sha2::{Digest, Sha256};

/// Verify API key using constant-time comparison
pub fn verify_api_key(provided: &str, expected: &str) -> bool {
    constant_time_eq(provided.as_bytes(), expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Random 32-byte salt, hex encoded.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256(password ":" SHA-256(salt)), hex encoded.
pub fn hash_password(password: &str, salt: &str) -> String {
    let salt_digest = hex::encode(Sha256::digest(salt.as_bytes()));

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(b":");
    hasher.update(salt_digest.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a password against a stored hash. An empty stored hash never matches.
pub fn verify_password(password: &str, salt: &str, stored_hash: &str) -> bool {
    if stored_hash.is_empty() {
        return false;
    }
    let computed = hash_password(password, salt);
    constant_time_eq(computed.as_bytes(), stored_hash.as_bytes())
}
