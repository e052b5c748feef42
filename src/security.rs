//! Security helpers (join tokens, admin key hashing, constant-time compare)

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::AdminKeyHash;

const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const JOIN_TOKEN_LEN: usize = 32;

/// Generate an unguessable join token for a watch session link.
pub fn generate_join_token() -> String {
    let mut rng = rand::rng();

    (0..JOIN_TOKEN_LEN)
        .map(|_| {
            let idx = rng.random_range(0..TOKEN_CHARSET.len());
            TOKEN_CHARSET[idx] as char
        })
        .collect()
}

/// Cheap shape check before a registry lookup.
pub fn is_well_formed_join_token(token: &str) -> bool {
    token.len() == JOIN_TOKEN_LEN && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Generate a random salt (hex) for hashing secrets.
pub fn generate_salt_hex() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

/// Hash `secret` with a `salt_hex` using SHA-256.
/// Output is hex-encoded.
pub fn hash_secret_sha256_hex(secret: &str, salt_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Constant-time equality for token strings.
pub fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check a presented admin key against the configured hash.
pub fn verify_admin_key(presented: &str, expected: &AdminKeyHash) -> bool {
    let hashed = hash_secret_sha256_hex(presented.trim(), &expected.salt_hex);
    ct_eq(&hashed, &expected.hash_hex)
}
