use rand::Rng;
use sha2::{Digest, Sha256};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Returns an `n`-character string drawn uniformly from the 62-character
/// alphanumeric alphabet. `thread_rng` is a CSPRNG, so the output is safe to
/// use as grant and token material.
pub fn nonce(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Lowercase hex digest of the SHA-256 hash of `input`.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Token constructor shared by every flow: an 8-character flow identifier
/// followed by the hex SHA-256 digest of the concatenated parts, 72
/// characters in total.
pub fn flow_hash(flow_id: &str, parts: &[&str]) -> String {
    format!("{}{}", flow_id, sha256_hex(&parts.concat()))
}
