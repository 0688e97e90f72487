//! Agent resale code generation.
//!
//! # Purpose
//! Mints the six-character codes agents quote to customers and present as
//! their bearer credential.
use rand::Rng;

/// Uppercase letters and digits keep codes readable over the phone.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of every agent code.
pub const CODE_LEN: usize = 6;

/// Reserved code for the seeded admin account.
pub const ADMIN_AGENT_CODE: &str = "ADMIN1";

/// Generate a random agent code.
///
/// Uniqueness is enforced by the store's unique index, not by construction.
pub fn generate_agent_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}
