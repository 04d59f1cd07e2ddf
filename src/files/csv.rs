//! The CSV artefact a walk produces and the cracker rewrites.
//!
//! One record per line:
//! `hash,next_hash,apex,salt_hex,iterations,plaintext,types` with `|`
//! separating the RR-type mnemonics. A file with any malformed line is
//! rejected whole; silently skipping rows would corrupt a later
//! rewrite.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{Result, WalkError};
use crate::output::Output;
use crate::types::{Interval, Nsec3Params, HASH_PATTERN};

pub const CSV_SEPARATOR: &str = ",";
pub const CSV_FIELDS: usize = 7;
pub const TYPES_SEPARATOR: &str = "|";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    pub hash: String,
    pub next_hash: String,
    pub apex: String,
    pub salt_hex: String,
    pub iterations: u16,
    pub plaintext: String,
    pub types: Vec<String>,
}

impl CsvRecord {
    pub fn from_interval(interval: &Interval, params: &Nsec3Params) -> Self {
        Self {
            hash: interval.start.clone(),
            next_hash: interval.end.clone(),
            apex: params.apex().to_string(),
            salt_hex: params.salt_hex().to_string(),
            iterations: params.iterations(),
            plaintext: String::new(),
            types: interval.types.clone(),
        }
    }

    pub fn to_line(&self) -> String {
        let fields = [
            self.hash.clone(),
            self.next_hash.clone(),
            self.apex.clone(),
            self.salt_hex.clone(),
            self.iterations.to_string(),
            self.plaintext.clone(),
            self.types.join(TYPES_SEPARATOR),
        ];

        fields.join(CSV_SEPARATOR)
    }

    pub fn parse(line: &str, hash_re: &Regex) -> Result<Self> {
        let parts: Vec<&str> = line.split(CSV_SEPARATOR).collect();
        if parts.len() != CSV_FIELDS {
            return Err(WalkError::invalid_record(
                format!("expected {CSV_FIELDS} fields, got {}", parts.len()),
                Some(line.to_string()),
            ));
        }

        if !hash_re.is_match(parts[0]) || !hash_re.is_match(parts[1]) {
            return Err(WalkError::invalid_record(
                "hash fields must be 32 chars of base32hex",
                Some(line.to_string()),
            ));
        }

        let iterations = parts[4].parse::<u16>().map_err(|_| {
            WalkError::invalid_record(
                format!("iterations '{}' is not a non-negative integer", parts[4]),
                Some(line.to_string()),
            )
        })?;

        let types = if parts[6].is_empty() {
            Vec::new()
        } else {
            parts[6]
                .split(TYPES_SEPARATOR)
                .map(str::to_string)
                .collect()
        };

        Ok(Self {
            hash: parts[0].to_string(),
            next_hash: parts[1].to_string(),
            apex: parts[2].to_string(),
            salt_hex: parts[3].to_string(),
            iterations,
            plaintext: parts[5].to_string(),
            types,
        })
    }

    /// The parameter set this record was hashed under
    pub fn params(&self) -> Result<Nsec3Params> {
        Nsec3Params::new(&self.apex, &self.salt_hex, self.iterations)
    }
}

pub fn hash_regex() -> Regex {
    Regex::new(HASH_PATTERN).expect("hash pattern is a valid regex")
}

/// Load and validate a CSV artefact. Blank lines are skipped; any
/// malformed line fails the whole load.
pub fn load_csv(path: &Path, output: &Output) -> Result<Vec<CsvRecord>> {
    let file = File::open(path)
        .map_err(|err| WalkError::io(err.to_string(), Some(path.display().to_string())))?;

    let hash_re = hash_regex();
    let mut records = Vec::new();
    let mut invalid = 0usize;

    for line in BufReader::new(file).lines() {
        let line =
            line.map_err(|err| WalkError::io(err.to_string(), Some(path.display().to_string())))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match CsvRecord::parse(line, &hash_re) {
            Ok(record) => records.push(record),
            Err(_) => {
                output.log(&format!("invalid line: {line}"));
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        return Err(WalkError::invalid_record(
            format!(
                "csv file has {} valid lines and {invalid} invalid; fix them before continuing",
                records.len()
            ),
            None,
        ));
    }

    output.log(&format!("csv file has {} valid lines", records.len()));
    Ok(records)
}

/// Rewrite the CSV through a temp file and an atomic rename. A result
/// smaller than the original means something went wrong; refuse to
/// replace it.
pub fn rewrite_csv(path: &Path, records: &[CsvRecord]) -> Result<()> {
    let tmp_path = PathBuf::from(format!("{}.tmp", path.display()));

    {
        let file = File::create(&tmp_path).map_err(|err| {
            WalkError::io(err.to_string(), Some(tmp_path.display().to_string()))
        })?;
        let mut writer = BufWriter::new(file);
        for record in records {
            writeln!(writer, "{}", record.to_line()).map_err(|err| {
                WalkError::io(err.to_string(), Some(tmp_path.display().to_string()))
            })?;
        }
        writer.flush().map_err(|err| {
            WalkError::io(err.to_string(), Some(tmp_path.display().to_string()))
        })?;
    }

    let original_size = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
    let new_size = fs::metadata(&tmp_path).map(|meta| meta.len()).unwrap_or(0);
    if new_size < original_size {
        return Err(WalkError::io(
            "temporary csv is smaller than the original, refusing to replace it".to_string(),
            Some(path.display().to_string()),
        ));
    }

    fs::rename(&tmp_path, path)
        .map_err(|err| WalkError::io(err.to_string(), Some(path.display().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "39v2d58t8b4bfbnspoeqm3vns6mrvt5o";
    const HASH_B: &str = "5q2gi7g0pbmjc58rtp7ut0e8dhgaqr63";

    #[test]
    fn test_record_round_trip() {
        let record = CsvRecord {
            hash: HASH_A.to_string(),
            next_hash: HASH_B.to_string(),
            apex: "example.com".to_string(),
            salt_hex: "aabbccdd".to_string(),
            iterations: 15,
            plaintext: "www.example.com".to_string(),
            types: vec!["A".to_string(), "AAAA".to_string(), "RRSIG".to_string()],
        };

        let line = record.to_line();
        assert_eq!(
            line,
            format!("{HASH_A},{HASH_B},example.com,aabbccdd,15,www.example.com,A|AAAA|RRSIG")
        );

        let parsed = CsvRecord::parse(&line, &hash_regex()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        let hash_re = hash_regex();
        // wrong field count
        assert!(CsvRecord::parse("a,b,c", &hash_re).is_err());
        // bad hash alphabet
        let bad_hash = format!("{},{HASH_B},example.com,aabb,1,,A", "z".repeat(32));
        assert!(CsvRecord::parse(&bad_hash, &hash_re).is_err());
        // bad iteration count
        let bad_iter = format!("{HASH_A},{HASH_B},example.com,aabb,minus,,A");
        assert!(CsvRecord::parse(&bad_iter, &hash_re).is_err());
    }

    #[test]
    fn test_load_refuses_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "zonewalk-csv-invalid-{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &path,
            format!("{HASH_A},{HASH_B},example.com,aabb,1,,A\nnot,a,real,line\n"),
        )
        .unwrap();

        let result = load_csv(&path, &Output::new(false));
        assert!(result.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!(
            "zonewalk-csv-blank-{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &path,
            format!("\n{HASH_A},{HASH_B},example.com,aabb,1,,A|NS\n\n"),
        )
        .unwrap();

        let records = load_csv(&path, &Output::new(false)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].types, vec!["A", "NS"]);

        let _ = std::fs::remove_file(&path);
    }
}
