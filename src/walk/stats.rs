//! Walk counters and the periodic progress monitor.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::output::Output;

#[derive(Debug, Default)]
pub struct Stats {
    queries: AtomicI64,
    hashes: AtomicI64,
    queries_without_result: AtomicI64,
    seconds_without_result: AtomicI64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn did_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.queries_without_result.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for an interval arrival; any arrival resets the
    /// inactivity counters, a new start or end hash bumps the total.
    pub fn got_hash(&self, start_existed: bool, end_existed: bool) {
        let new_hashes = i64::from(!start_existed) + i64::from(!end_existed);

        self.hashes.fetch_add(new_hashes, Ordering::Relaxed);
        self.queries_without_result.store(0, Ordering::Relaxed);
        self.seconds_without_result.store(0, Ordering::Relaxed);
    }

    pub fn queries(&self) -> i64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn hashes(&self) -> i64 {
        self.hashes.load(Ordering::Relaxed)
    }

    pub fn queries_without_result(&self) -> i64 {
        self.queries_without_result.load(Ordering::Relaxed)
    }

    pub fn seconds_without_result(&self) -> i64 {
        self.seconds_without_result.load(Ordering::Relaxed)
    }

    fn add_idle_seconds(&self, seconds: i64) {
        self.seconds_without_result
            .fetch_add(seconds, Ordering::Relaxed);
    }
}

/// Percentage of `numerator` in `denominator`, clamped to 100 because
/// one query can surface two new hashes.
fn ratio_percent(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }

    let ratio = ((numerator as f64 / denominator as f64) * 100.0).round() as i64;
    ratio.min(100)
}

/// Spawn the progress ticker. Every tick logs totals and deltas; once
/// the walk has produced nothing for `quit_after_min` minutes the
/// monitor requests an orderly, successful shutdown through `quit`.
pub fn spawn_monitor(
    stats: Arc<Stats>,
    output: Arc<Output>,
    interval: Duration,
    quit_after_min: u64,
    quit: watch::Sender<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // the first tick fires immediately

        let mut last_queries = 0i64;
        let mut last_hashes = 0i64;

        loop {
            ticker.tick().await;

            let queries = stats.queries();
            let hashes = stats.hashes();
            let delta_queries = queries - last_queries;
            let delta_hashes = hashes - last_hashes;

            output.log(&format!(
                "in the last {}s: queries total/change {}/{} | hashes total/change {}/{} | \
                 ratio total/change {}%/{}% | without answer: {} queries, {} seconds",
                interval.as_secs(),
                queries,
                delta_queries,
                hashes,
                delta_hashes,
                ratio_percent(hashes, queries),
                ratio_percent(delta_hashes, delta_queries),
                stats.queries_without_result(),
                stats.seconds_without_result(),
            ));

            last_queries = queries;
            last_hashes = hashes;

            stats.add_idle_seconds(interval.as_secs() as i64);

            if stats.seconds_without_result() >= (quit_after_min * 60) as i64 {
                output.log(&format!(
                    "no new hashes for {} seconds, quitting",
                    stats.seconds_without_result()
                ));
                let _ = quit.send(true);
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_clamps_to_100() {
        assert_eq!(ratio_percent(3, 1), 100);
        assert_eq!(ratio_percent(1, 2), 50);
        assert_eq!(ratio_percent(0, 10), 0);
        assert_eq!(ratio_percent(5, 0), 0);
    }

    #[test]
    fn test_got_hash_resets_inactivity() {
        let stats = Stats::new();
        stats.did_query();
        stats.did_query();
        stats.add_idle_seconds(30);
        assert_eq!(stats.queries_without_result(), 2);

        stats.got_hash(false, true);
        assert_eq!(stats.hashes(), 1);
        assert_eq!(stats.queries_without_result(), 0);
        assert_eq!(stats.seconds_without_result(), 0);
    }

    #[test]
    fn test_hash_counting() {
        let stats = Stats::new();
        stats.got_hash(false, false);
        stats.got_hash(true, false);
        stats.got_hash(true, true);
        assert_eq!(stats.hashes(), 3);
    }
}
