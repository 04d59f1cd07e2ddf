//! Core types shared by the walker, the cracker, and the file utilities.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WalkError};
use crate::hasher;

/// Length of a base32hex-encoded SHA-1 NSEC3 hash
pub const HASH_LEN: usize = 32;

/// Regex matching a lowercase base32hex NSEC3 hash
pub const HASH_PATTERN: &str = "^[0-9a-v]{32}$";

/// The NSEC3 parameters of a zone, fixed for the lifetime of a walk.
///
/// The salt is kept both as the hex string that appears on the wire
/// artefacts and as raw bytes for hashing. The derived `key` uniquely
/// identifies a parameter set and is what the cracked store indexes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec3Params {
    apex: String,
    salt_hex: String,
    salt: Vec<u8>,
    iterations: u16,
    key: String,
}

impl Nsec3Params {
    pub fn new(apex: &str, salt_hex: &str, iterations: u16) -> Result<Self> {
        let apex = apex.trim().trim_matches('.').to_lowercase();
        if apex.is_empty() {
            return Err(WalkError::config("empty zone apex"));
        }

        let salt_hex = salt_hex.trim().to_lowercase();
        let salt = hasher::decode_salt(&salt_hex)?;
        let key = format!("{apex}|{salt_hex}|{iterations}");

        Ok(Self {
            apex,
            salt_hex,
            salt,
            iterations,
            key,
        })
    }

    /// Zone apex without a trailing dot
    pub fn apex(&self) -> &str {
        &self.apex
    }

    /// Salt as a lowercase hex string
    pub fn salt_hex(&self) -> &str {
        &self.salt_hex
    }

    /// Salt as raw bytes
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Extra SHA-1 iterations applied after the initial digest
    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    /// The `apex|salt|iterations` identity of this parameter set
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Check an observed (salt, iterations) pair against this set
    pub fn matches(&self, salt_hex: &str, iterations: u16) -> bool {
        self.salt_hex == salt_hex.to_lowercase() && self.iterations == iterations
    }

    /// Qualify a label (or label chain) with the zone apex
    pub fn full_name(&self, label: &str) -> String {
        let label = label.trim_end_matches('.');
        if label.is_empty() {
            self.apex.clone()
        } else {
            format!("{}.{}", label, self.apex)
        }
    }

    /// NSEC3 hash of a fully qualified name under these parameters
    pub fn hash_name(&self, name: &str) -> Result<String> {
        hasher::nsec3_hash(name, &self.salt, self.iterations)
    }
}

impl fmt::Display for Nsec3Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl FromStr for Nsec3Params {
    type Err = WalkError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '|');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(apex), Some(salt_hex), Some(iterations)) => {
                let iterations = iterations
                    .parse::<u16>()
                    .map_err(|_| WalkError::config(format!("invalid iterations in key '{s}'")))?;
                Self::new(apex, salt_hex, iterations)
            }
            _ => Err(WalkError::config(format!("invalid params key '{s}'"))),
        }
    }
}

/// One NSEC3 gap observed on the wire: no signed name hashes strictly
/// between `start` and `end` in the circular hash order. `types` holds
/// the RR-type mnemonics present at the name hashing to `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub start: String,
    pub end: String,
    pub types: Vec<String>,
}

/// A generated query name together with its precomputed NSEC3 hash
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_normalisation() {
        let params = Nsec3Params::new("Example.COM.", "AABBCCDD", 5).unwrap();
        assert_eq!(params.apex(), "example.com");
        assert_eq!(params.salt_hex(), "aabbccdd");
        assert_eq!(params.key(), "example.com|aabbccdd|5");
    }

    #[test]
    fn test_params_key_round_trip() {
        let params = Nsec3Params::new("example.com", "aabbccdd", 15).unwrap();
        let parsed: Nsec3Params = params.to_string().parse().unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_params_empty_salt() {
        let params = Nsec3Params::new("example.com", "", 0).unwrap();
        assert!(params.salt().is_empty());
        assert_eq!(params.key(), "example.com||0");
    }

    #[test]
    fn test_params_rejects_bad_input() {
        assert!(Nsec3Params::new("", "aabb", 1).is_err());
        assert!(Nsec3Params::new(".", "aabb", 1).is_err());
        assert!(Nsec3Params::new("example.com", "abc", 1).is_err());
        assert!(Nsec3Params::new("example.com", "zz", 1).is_err());
    }

    #[test]
    fn test_full_name() {
        let params = Nsec3Params::new("example.com", "", 0).unwrap();
        assert_eq!(params.full_name("www"), "www.example.com");
        assert_eq!(params.full_name("a.b"), "a.b.example.com");
        assert_eq!(params.full_name(""), "example.com");
    }

    #[test]
    fn test_params_matches() {
        let params = Nsec3Params::new("example.com", "aabb", 10).unwrap();
        assert!(params.matches("AABB", 10));
        assert!(!params.matches("aabb", 11));
        assert!(!params.matches("ccdd", 10));
    }
}
