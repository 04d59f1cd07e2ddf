//! Monotonic store of cracked hashes: params key -> hash -> full name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::types::Nsec3Params;

#[derive(Debug, Default)]
pub struct CrackedStore {
    inner: Mutex<HashMap<String, HashMap<String, String>>>,
    count: AtomicI64,
}

impl CrackedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a recovered plaintext label for a hash.
    pub fn add(&self, params: &Nsec3Params, hash: &str, label: &str) {
        let full_name = params.full_name(label);

        self.inner
            .lock()
            .unwrap()
            .entry(params.key().to_string())
            .or_default()
            .insert(hash.to_string(), full_name);

        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, params_key: &str, hash: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .get(params_key)
            .and_then(|hashes| hashes.get(hash))
            .cloned()
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    /// All recovered fully qualified names
    pub fn full_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .flat_map(|hashes| hashes.values().cloned())
            .collect()
    }

    /// Recovered names with the apex suffix stripped, wordlist style
    pub fn wordlist(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(key, hashes)| {
                let apex = key.split('|').next().unwrap_or_default().to_string();
                hashes.values().map(move |name| {
                    name.strip_suffix(&format!(".{apex}"))
                        .unwrap_or(name)
                        .to_string()
                })
            })
            .collect()
    }

    /// Per-parameter-set counts, for the verbose summary
    pub fn counts_by_key(&self) -> Vec<(String, usize)> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .map(|(key, hashes)| (key.clone(), hashes.len()))
            .collect()
    }
}
