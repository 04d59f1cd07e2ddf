//! Hashcat potfile ingestion.
//!
//! One record per line, five colon-separated fields:
//! `hash:.apex:salt_hex:iterations:plaintext-label`. Lines that do not
//! fit the schema are skipped with a verbose log instead of failing the
//! load; potfiles routinely mix hash modes.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::crack::CrackedStore;
use crate::error::{Result, WalkError};
use crate::files::csv::hash_regex;
use crate::output::Output;
use crate::types::Nsec3Params;

pub const POT_FIELDS: usize = 5;

/// Load a potfile into a cracked store keyed by `apex|salt|iterations`.
pub fn load_potfile(path: &Path, output: &Output) -> Result<CrackedStore> {
    let file = File::open(path)
        .map_err(|err| WalkError::io(err.to_string(), Some(path.display().to_string())))?;

    let hash_re = hash_regex();
    let store = CrackedStore::new();

    for line in BufReader::new(file).lines() {
        let line =
            line.map_err(|err| WalkError::io(err.to_string(), Some(path.display().to_string())))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // 0 hash | 1 dotted apex | 2 salt | 3 iterations | 4 plaintext label
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != POT_FIELDS || !hash_re.is_match(parts[0]) {
            output.log_verbose(&format!("invalid line: {line}"));
            continue;
        }

        let Ok(iterations) = parts[3].parse::<u16>() else {
            output.log_verbose(&format!("invalid line: {line}"));
            continue;
        };

        let Ok(params) = Nsec3Params::new(parts[1], parts[2], iterations) else {
            output.log_verbose(&format!("invalid line: {line}"));
            continue;
        };

        store.add(&params, parts[0], parts[4]);
    }

    output.log(&format!(
        "hashcat pot file has {} NSEC3 hashes",
        store.count()
    ));

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_potfile() {
        let path = std::env::temp_dir().join(format!(
            "zonewalk-potfile-{}.potfile",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "c17odk0qjlecpl8eldnctr21vpck06bq:.cz:cb6658404d098de6:0:abtest\n\
             not a potfile line\n\
             zzzz:.cz:cb6658404d098de6:0:short\n",
        )
        .unwrap();

        let store = load_potfile(&path, &Output::new(false)).unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(
            store.get(
                "cz|cb6658404d098de6|0",
                "c17odk0qjlecpl8eldnctr21vpck06bq"
            ),
            Some("abtest.cz".to_string())
        );

        let _ = std::fs::remove_file(&path);
    }
}
