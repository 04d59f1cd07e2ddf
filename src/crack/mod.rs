//! Offline dictionary attack against harvested NSEC3 hashes.
//!
//! Wordlist mode hashes every word under every parameter set found in
//! the CSV and rewrites the file with the matches filled in. Single
//! mode hashes one known name so an operator can cross-check hashcat
//! output.

mod cracked;

pub use cracked::CrackedStore;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex};

use crate::error::{Result, WalkError};
use crate::files::{csv, update};
use crate::output::Output;
use crate::types::Nsec3Params;

pub const DEFAULT_CRACK_WORKERS: usize = 3;

const CHAN_WORDS: usize = 1_000;

pub struct Cracker {
    workers: usize,
    output: Arc<Output>,
}

impl Cracker {
    pub fn new(output: Arc<Output>) -> Self {
        Self {
            workers: DEFAULT_CRACK_WORKERS,
            output,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Crack a CSV against a wordlist and rewrite it. Returns the
    /// number of rows that gained a plaintext.
    pub fn run_wordlist(&self, csv_path: &Path, wordlist_path: &Path) -> Result<usize> {
        let records = csv::load_csv(csv_path, &self.output)?;

        // index the target hashes by parameter set
        let mut hashes: HashMap<String, HashSet<String>> = HashMap::new();
        let mut params_by_key: HashMap<String, Nsec3Params> = HashMap::new();
        for record in &records {
            let params = record.params()?;
            hashes
                .entry(params.key().to_string())
                .or_default()
                .insert(record.hash.clone());
            params_by_key
                .entry(params.key().to_string())
                .or_insert(params);
        }

        let wordlist = File::open(wordlist_path).map_err(|err| {
            WalkError::io(err.to_string(), Some(wordlist_path.display().to_string()))
        })?;

        let cracked = Arc::new(CrackedStore::new());
        let params_list: Vec<Nsec3Params> = params_by_key.into_values().collect();
        let hashes = Arc::new(hashes);

        let (word_tx, word_rx) = sync_channel::<String>(CHAN_WORDS);
        let word_rx = Arc::new(Mutex::new(word_rx));

        std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let word_rx = word_rx.clone();
                let hashes = hashes.clone();
                let cracked = cracked.clone();
                let output = self.output.clone();
                let params_list = &params_list;

                scope.spawn(move || {
                    crack_worker(&word_rx, &hashes, params_list, &cracked, &output)
                });
            }

            // feed the wordlist from this thread; the bounded channel
            // provides the back-pressure
            for line in BufReader::new(wordlist).lines() {
                let Ok(word) = line else {
                    break;
                };
                let word = word.trim().to_string();
                if word.is_empty() {
                    continue;
                }
                if word_tx.send(word).is_err() {
                    break;
                }
            }
            drop(word_tx);
        });

        self.output.log(&format!(
            "updating CSV with {} cracked hashes",
            cracked.count()
        ));

        let changed = update::apply_cracked(csv_path, records, &cracked)?;
        self.output
            .log(&format!("added {changed} new domains into CSV file"));

        Ok(changed)
    }

    /// Hash one known name and print the hashcat-format lines for it.
    pub fn run_single(&self, domain: &str, salt_hex: &str, iterations: u16) -> Result<()> {
        let params = Nsec3Params::new(domain, salt_hex, iterations)?;

        self.output.log(&format!(
            "hash for domain [{}] with salt [{}] having [{}] iterations",
            params.apex(),
            params.salt_hex(),
            params.iterations()
        ));

        let hash = params.hash_name(params.apex())?;

        let (label, parent) = match params.apex().split_once('.') {
            Some((label, parent)) => (label, parent),
            None => (params.apex(), ""),
        };

        println!("{}", hashcat_line(&hash, "", params.apex(), &params));
        println!("{}", hashcat_line(&hash, label, parent, &params));

        Ok(())
    }
}

fn crack_worker(
    words: &Mutex<Receiver<String>>,
    hashes: &HashMap<String, HashSet<String>>,
    params_list: &[Nsec3Params],
    cracked: &CrackedStore,
    output: &Output,
) {
    loop {
        let word = { words.lock().unwrap().recv() };
        let Ok(word) = word else {
            return;
        };

        for params in params_list {
            let name = params.full_name(&word);
            let hash = match params.hash_name(&name) {
                Ok(hash) => hash,
                Err(err) => {
                    output.log_verbose(&format!("cannot hash {name}: {err}"));
                    continue;
                }
            };

            let is_match = hashes
                .get(params.key())
                .map(|set| set.contains(&hash))
                .unwrap_or(false);
            if is_match {
                cracked.add(params, &hash, &word);
            }
        }
    }
}

fn hashcat_line(hash: &str, label: &str, apex: &str, params: &Nsec3Params) -> String {
    format!(
        "{}:.{}:{}:{}:{}",
        hash,
        apex.trim_start_matches('.'),
        params.salt_hex(),
        params.iterations(),
        label
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashcat_line_format() {
        let params = Nsec3Params::new("example.com", "aabb", 7).unwrap();
        assert_eq!(
            hashcat_line("39v2d58t8b4bfbnspoeqm3vns6mrvt5o", "www", "example.com", &params),
            "39v2d58t8b4bfbnspoeqm3vns6mrvt5o:.example.com:aabb:7:www"
        );
    }
}
