//! Candidate name generation and the hash pre-filter.
//!
//! Names flow producer -> filter workers -> survivors channel. The
//! filter hashes every candidate and drops the ones already inside a
//! known interval, so workers never waste a query on a covered gap.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, Mutex};

use crate::output::Output;
use crate::types::{Candidate, Nsec3Params};
use crate::walk::index::ChainIndex;

/// Labels the random strategy grows up to
pub const MAX_RANDOM_LABEL: usize = 20;

const CHAN_NAMES: usize = 2_000;

// Letters twice to bias the draw towards them, digits once.
const RANDOM_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz0123456789";

const SEQUENTIAL_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// How candidate labels are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Uniform random labels of up to 20 characters
    Random,
    /// A counter over `[a-z0-9]^k` starting at "aaaa", with a
    /// per-process suffix so concurrent runs do not collide
    #[default]
    Sequential,
}

enum LabelSource {
    Random(RandomLabels),
    Sequential(SequentialLabels),
}

impl LabelSource {
    fn new(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Random => Self::Random(RandomLabels::new()),
            Strategy::Sequential => Self::Sequential(SequentialLabels::new(process_suffix())),
        }
    }

    fn next_label(&mut self) -> String {
        match self {
            Self::Random(source) => source.next_label(),
            Self::Sequential(source) => source.next_label(),
        }
    }
}

/// Random walk: draw two characters, then keep extending one character
/// at a time, emitting every prefix along the way.
struct RandomLabels {
    pending: Vec<String>,
}

impl RandomLabels {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    fn next_label(&mut self) -> String {
        loop {
            if let Some(label) = self.pending.pop() {
                return label;
            }
            self.refill();
        }
    }

    fn refill(&mut self) {
        let mut rng = rand::thread_rng();
        let mut label = String::with_capacity(MAX_RANDOM_LABEL);

        for _ in 0..2 {
            label.push(RANDOM_CHARSET[rng.gen_range(0..RANDOM_CHARSET.len())] as char);
        }

        while label.len() < MAX_RANDOM_LABEL {
            label.push(RANDOM_CHARSET[rng.gen_range(0..RANDOM_CHARSET.len())] as char);
            self.pending.push(label.clone());
        }
    }
}

/// Odometer over the sequential charset, least significant position
/// first; wraps into one more position when exhausted.
struct SequentialLabels {
    counter: Vec<usize>,
    suffix: String,
}

impl SequentialLabels {
    fn new(suffix: String) -> Self {
        Self {
            counter: vec![0; 4],
            suffix,
        }
    }

    fn next_label(&mut self) -> String {
        let mut label = String::with_capacity(self.counter.len() + self.suffix.len());
        for &index in &self.counter {
            label.push(SEQUENTIAL_CHARSET[index] as char);
        }
        label.push_str(&self.suffix);

        self.advance();
        label
    }

    fn advance(&mut self) {
        for position in 0..self.counter.len() {
            self.counter[position] += 1;
            if self.counter[position] < SEQUENTIAL_CHARSET.len() {
                return;
            }
            self.counter[position] = 0;
        }

        self.counter = vec![0; self.counter.len() + 1];
    }
}

/// Suffix separating concurrent runs, derived from PID and wall-clock
/// nanoseconds.
fn process_suffix() -> String {
    let pid = std::process::id() as u64;
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0);

    format!("{:08x}", (pid.wrapping_mul(0x9e37_79b9) ^ nanos) as u32)
}

/// Spawn the producer and one filter worker per CPU core. Survivor
/// candidates land on `survivors`; everything winds down once the
/// receiving side goes away.
pub fn spawn(
    strategy: Strategy,
    params: Nsec3Params,
    index: Arc<ChainIndex>,
    output: Arc<Output>,
    survivors: mpsc::Sender<Candidate>,
) {
    let (names_tx, names_rx) = mpsc::channel::<String>(CHAN_NAMES);

    let apex = params.apex().to_string();
    tokio::spawn(async move {
        let mut source = LabelSource::new(strategy);
        loop {
            let name = format!("{}.{}", source.next_label(), apex);
            if names_tx.send(name).await.is_err() {
                return;
            }
        }
    });

    let names_rx = Arc::new(Mutex::new(names_rx));
    let workers = std::thread::available_parallelism()
        .map(|cores| cores.get())
        .unwrap_or(2);

    for _ in 0..workers {
        let names_rx = names_rx.clone();
        let params = params.clone();
        let index = index.clone();
        let output = output.clone();
        let survivors = survivors.clone();

        tokio::spawn(async move {
            loop {
                let name = { names_rx.lock().await.recv().await };
                let Some(name) = name else {
                    return;
                };

                let hash = match params.hash_name(&name) {
                    Ok(hash) => hash,
                    Err(err) => {
                        output.log(&format!("error hashing {name}: {err}"));
                        continue;
                    }
                };

                if let Some((start, end)) = index.is_in_range(&hash) {
                    output.log_verbose(&format!(
                        "domain in range [{start}={end}] <= {hash} ({name})"
                    ));
                    continue;
                }

                if survivors.send(Candidate { name, hash }).await.is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_counter_order() {
        let mut source = SequentialLabels::new(String::new());
        assert_eq!(source.next_label(), "aaaa");
        assert_eq!(source.next_label(), "baaa");
        assert_eq!(source.next_label(), "caaa");
    }

    #[test]
    fn test_sequential_counter_carry() {
        let mut source = SequentialLabels::new(String::new());
        for _ in 0..SEQUENTIAL_CHARSET.len() {
            source.next_label();
        }
        assert_eq!(source.next_label(), "abaa");
    }

    #[test]
    fn test_sequential_counter_lengthens() {
        let mut source = SequentialLabels::new(String::new());
        source.counter = vec![SEQUENTIAL_CHARSET.len() - 1; 4];
        source.next_label();
        assert_eq!(source.next_label(), "aaaaa");
    }

    #[test]
    fn test_sequential_suffix_is_appended() {
        let mut source = SequentialLabels::new("1f2e3d4c".to_string());
        assert_eq!(source.next_label(), "aaaa1f2e3d4c");
    }

    #[test]
    fn test_random_labels_shape() {
        let mut source = RandomLabels::new();
        for _ in 0..100 {
            let label = source.next_label();
            assert!(label.len() >= 3 && label.len() <= MAX_RANDOM_LABEL);
            assert!(label
                .bytes()
                .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit()));
        }
    }

    #[test]
    fn test_process_suffix_is_label_safe() {
        let suffix = process_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit()));
    }
}
