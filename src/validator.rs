//! Structural validation for Solana wallet addresses
//!
//! A Solana pubkey renders as 32-44 base58 characters. The base58 alphabet
//! excludes the ambiguous characters `0`, `O`, `I` and `l`.
//!
//! Validation here is structural only: a string that passes may still not be
//! a live account on chain.

/// Minimum length of a base58-encoded pubkey
pub const MIN_ADDRESS_LEN: usize = 32;

/// Maximum length of a base58-encoded pubkey
pub const MAX_ADDRESS_LEN: usize = 44;

/// Check whether a candidate string is a plausible base58 Solana address.
///
/// Returns `false` for empty strings, strings outside the 32-44 length
/// bounds, and strings containing any character outside the base58 alphabet.
/// Never panics.
pub fn is_valid_address(candidate: &str) -> bool {
    let len = candidate.len();
    if len < MIN_ADDRESS_LEN || len > MAX_ADDRESS_LEN {
        return false;
    }

    candidate.bytes().all(is_base58_byte)
}

fn is_base58_byte(b: u8) -> bool {
    matches!(b,
        b'1'..=b'9'
        | b'A'..=b'H'
        | b'J'..=b'N'
        | b'P'..=b'Z'
        | b'a'..=b'k'
        | b'm'..=b'z')
}
