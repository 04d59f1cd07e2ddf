//! NSEC3 hashing per RFC 5155 §5.
//!
//! The walker's pre-filter and the offline cracker both sit in a tight
//! loop around [`nsec3_hash`], so this stays free of allocations beyond
//! the wire buffer and the final encoding.

use data_encoding::{BASE32HEX_NOPAD, HEXLOWER_PERMISSIVE};
use sha1::{Digest, Sha1};

use crate::error::{Result, WalkError};

/// Longest label the wire format can carry
pub const MAX_LABEL_LEN: usize = 63;

/// Decode an NSEC3 salt from its hex presentation. An empty string is a
/// valid (absent) salt.
pub fn decode_salt(salt_hex: &str) -> Result<Vec<u8>> {
    HEXLOWER_PERMISSIVE
        .decode(salt_hex.as_bytes())
        .map_err(|err| WalkError::hash(format!("invalid salt '{salt_hex}': {err}")))
}

/// Convert a domain name to its canonical wire form: each label prefixed
/// by its length, terminated by the zero root label. A trailing dot is
/// ignored.
pub fn name_to_wire(name: &str) -> Result<Vec<u8>> {
    let name = name.trim_end_matches('.');
    if name.is_empty() {
        return Err(WalkError::hash("empty domain name"));
    }

    let mut wire = Vec::with_capacity(name.len() + 2);
    for label in name.split('.') {
        if label.is_empty() {
            return Err(WalkError::hash(format!("empty label in '{name}'")));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(WalkError::hash(format!("label too long: '{label}'")));
        }
        wire.push(label.len() as u8);
        wire.extend_from_slice(label.as_bytes());
    }
    wire.push(0);

    Ok(wire)
}

/// Hash a fully qualified name: `H0 = SHA1(wire || salt)`, then
/// `H_i = SHA1(H_{i-1} || salt)` for each extra iteration, base32hex
/// encoded without padding and lowercased.
pub fn nsec3_hash(name: &str, salt: &[u8], iterations: u16) -> Result<String> {
    let wire = name_to_wire(&name.to_lowercase())?;

    let mut hasher = Sha1::new();
    hasher.update(&wire);
    hasher.update(salt);
    let mut digest = hasher.finalize();

    for _ in 0..iterations {
        let mut hasher = Sha1::new();
        hasher.update(digest);
        hasher.update(salt);
        digest = hasher.finalize();
    }

    Ok(BASE32HEX_NOPAD.encode(&digest).to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors from RFC 5155 appendix A: salt aabbccdd, 12 iterations.
    #[test]
    fn test_rfc5155_vectors() {
        let salt = decode_salt("aabbccdd").unwrap();
        assert_eq!(
            nsec3_hash("example", &salt, 12).unwrap(),
            "0p9mhaveqvm6t7vbl5lop2u3t2rp3tom"
        );
        assert_eq!(
            nsec3_hash("a.example", &salt, 12).unwrap(),
            "35mthgpgcu1qg68fab165klnsnk3dpvl"
        );
        assert_eq!(
            nsec3_hash("ai.example", &salt, 12).unwrap(),
            "gjeqe526plbf1g8mklp59enfd789njgi"
        );
    }

    #[test]
    fn test_hash_shape_and_determinism() {
        let salt = decode_salt("aabbccdd").unwrap();
        let first = nsec3_hash("example.com", &salt, 5).unwrap();
        let second = nsec3_hash("example.com", &salt, 5).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_digit() || ('a'..='v').contains(&c)));
    }

    #[test]
    fn test_name_canonicalisation() {
        let salt = decode_salt("").unwrap();
        assert_eq!(
            nsec3_hash("example.com.", &salt, 0).unwrap(),
            nsec3_hash("example.com", &salt, 0).unwrap()
        );
        assert_eq!(
            nsec3_hash("EXAMPLE.com", &salt, 0).unwrap(),
            nsec3_hash("example.com", &salt, 0).unwrap()
        );
    }

    #[test]
    fn test_wire_format() {
        let wire = name_to_wire("ab.cd").unwrap();
        assert_eq!(wire, vec![2, b'a', b'b', 2, b'c', b'd', 0]);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(name_to_wire("").is_err());
        assert!(name_to_wire(".").is_err());
        assert!(name_to_wire("a..b").is_err());
        assert!(name_to_wire(&format!("{}.com", "x".repeat(64))).is_err());
        assert!(decode_salt("abc").is_err());
        assert!(decode_salt("zz").is_err());
    }
}
