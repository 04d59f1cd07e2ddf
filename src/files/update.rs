//! CSV reconciliation and plaintext dumps.

use std::path::Path;

use crate::crack::CrackedStore;
use crate::error::Result;
use crate::files::{csv, hashcat};
use crate::output::Output;

/// Fill plaintexts from a cracked store into CSV records and rewrite
/// the file. Returns how many rows changed; a second run over the same
/// inputs changes nothing.
pub fn apply_cracked(
    path: &Path,
    mut records: Vec<csv::CsvRecord>,
    cracked: &CrackedStore,
) -> Result<usize> {
    let mut changed = 0usize;

    for record in &mut records {
        let params = record.params()?;
        if let Some(plaintext) = cracked.get(params.key(), &record.hash) {
            if plaintext != record.plaintext {
                record.plaintext = plaintext;
                changed += 1;
            }
        }
    }

    csv::rewrite_csv(path, &records)?;
    Ok(changed)
}

/// `file --update-csv`: reconcile a CSV with a hashcat potfile.
pub fn update_csv(csv_path: &Path, potfile_path: &Path, output: &Output) -> Result<usize> {
    let cracked = hashcat::load_potfile(potfile_path, output)?;
    let records = csv::load_csv(csv_path, output)?;

    let changed = apply_cracked(csv_path, records, &cracked)?;
    output.log(&format!("added {changed} new domains into CSV file"));

    Ok(changed)
}

/// `file --dump-domains`: print every recovered fully qualified name.
pub fn dump_domains(
    csv_path: Option<&Path>,
    potfile_path: Option<&Path>,
    output: &Output,
) -> Result<()> {
    if let Some(path) = csv_path {
        for record in csv::load_csv(path, output)? {
            if !record.plaintext.is_empty() {
                println!("{}", record.plaintext);
            }
        }
    }

    if let Some(path) = potfile_path {
        for name in hashcat::load_potfile(path, output)?.full_names() {
            println!("{name}");
        }
    }

    Ok(())
}

/// `file --dump-wordlist`: print recovered names with the apex
/// stripped, ready to feed back into a wordlist.
pub fn dump_wordlist(
    csv_path: Option<&Path>,
    potfile_path: Option<&Path>,
    output: &Output,
) -> Result<()> {
    if let Some(path) = csv_path {
        for record in csv::load_csv(path, output)? {
            if record.plaintext.is_empty() {
                continue;
            }
            let suffix = format!(".{}", record.apex);
            let label = record
                .plaintext
                .strip_suffix(&suffix)
                .unwrap_or(&record.plaintext);
            println!("{label}");
        }
    }

    if let Some(path) = potfile_path {
        for label in hashcat::load_potfile(path, output)?.wordlist() {
            println!("{label}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Nsec3Params;

    const HASH_A: &str = "39v2d58t8b4bfbnspoeqm3vns6mrvt5o";
    const HASH_B: &str = "5q2gi7g0pbmjc58rtp7ut0e8dhgaqr63";

    #[test]
    fn test_apply_cracked_is_idempotent() {
        let path = std::env::temp_dir().join(format!(
            "zonewalk-update-{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &path,
            format!("{HASH_A},{HASH_B},example.com,aabb,1,,A\n"),
        )
        .unwrap();

        let output = Output::new(false);
        let cracked = CrackedStore::new();
        let params = Nsec3Params::new("example.com", "aabb", 1).unwrap();
        cracked.add(&params, HASH_A, "www");

        let records = csv::load_csv(&path, &output).unwrap();
        let changed = apply_cracked(&path, records, &cracked).unwrap();
        assert_eq!(changed, 1);

        let records = csv::load_csv(&path, &output).unwrap();
        assert_eq!(records[0].plaintext, "www.example.com");

        let changed = apply_cracked(&path, records, &cracked).unwrap();
        assert_eq!(changed, 0, "a second pass must not change anything");

        let _ = std::fs::remove_file(&path);
    }
}
