//! Zone walking: bootstrap, pipeline wiring, and the interval consumer.

pub mod generator;
pub mod index;
pub mod stats;
pub mod worker;

pub use generator::Strategy;
pub use index::{AddOutcome, ChainIndex};
pub use stats::Stats;
pub use worker::{NsWorker, WalkEvent};

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hickory_proto::rr::RecordType;
use tokio::sync::{mpsc, watch, Mutex};

use crate::dns::{self, Exchanger, UdpExchanger};
use crate::error::{Result, WalkError};
use crate::output::Output;
use crate::types::{Interval, Nsec3Params};

pub const DEFAULT_RESOLVERS: &str = "8.8.8.8:53,8.8.4.4:53,1.1.1.1:53";
pub const DEFAULT_PROGRESS_SECS: u64 = 30;
pub const DEFAULT_QUIT_AFTER_MIN: u64 = 5;
pub const DEFAULT_THREADS_PER_NS: usize = 3;

const CHAN_CANDIDATES: usize = 500;
const CHAN_EVENTS: usize = 1_000;

/// Everything a walk needs to know before it starts.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Zone apex to walk
    pub domain: String,
    /// Caller-supplied authoritative servers; discovered via the
    /// resolvers when empty
    pub nameservers: Vec<String>,
    /// Generic resolvers used for NS discovery
    pub resolvers: Vec<String>,
    /// Seconds between progress lines
    pub progress_secs: u64,
    /// Minutes without a new hash before giving up
    pub quit_after_min: u64,
    /// Treat zone changes mid-walk as fatal
    pub quit_on_change: bool,
    /// Workers per authoritative server, each with its own socket
    pub threads_per_ns: usize,
    /// Candidate generation strategy
    pub strategy: Strategy,
    pub verbose: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            nameservers: Vec::new(),
            resolvers: dns::parse_server_list(DEFAULT_RESOLVERS),
            progress_secs: DEFAULT_PROGRESS_SECS,
            quit_after_min: DEFAULT_QUIT_AFTER_MIN,
            quit_on_change: false,
            threads_per_ns: DEFAULT_THREADS_PER_NS,
            strategy: Strategy::default(),
            verbose: false,
        }
    }
}

/// Owns the walk lifecycle: bootstraps zone parameters, wires the
/// candidate pipeline to the per-server workers, and consumes observed
/// intervals until the chain closes or the inactivity timer fires.
pub struct Walker {
    config: WalkConfig,
    output: Arc<Output>,
    exchanger: Arc<dyn Exchanger>,
}

impl Walker {
    pub fn new(config: WalkConfig, output: Arc<Output>) -> Self {
        Self {
            config,
            output,
            exchanger: Arc::new(UdpExchanger::new()),
        }
    }

    /// Swap the DNS transport, used by tests to walk a scripted zone.
    pub fn with_exchanger(
        config: WalkConfig,
        output: Arc<Output>,
        exchanger: Arc<dyn Exchanger>,
    ) -> Self {
        Self {
            config,
            output,
            exchanger,
        }
    }

    pub async fn run(&self) -> Result<()> {
        self.output.log(&format!(
            "starting NSEC3 walk for zone [{}]",
            self.config.domain
        ));

        let servers = self.bootstrap_servers().await?;
        self.output
            .log(&format!("NS servers to walk: {}", servers.join(", ")));

        let (params, servers) = self.bootstrap_params(&servers).await?;
        self.output.log(&format!(
            "zone uses salt [{}] with [{}] iterations",
            params.salt_hex(),
            params.iterations()
        ));

        let index = Arc::new(ChainIndex::new(false));
        let stats = Arc::new(Stats::new());

        let (candidate_tx, candidate_rx) = mpsc::channel(CHAN_CANDIDATES);
        let candidate_rx = Arc::new(Mutex::new(candidate_rx));
        let (event_tx, mut event_rx) = mpsc::channel(CHAN_EVENTS);

        generator::spawn(
            self.config.strategy,
            params.clone(),
            index.clone(),
            self.output.clone(),
            candidate_tx,
        );

        for server in &servers {
            for _ in 0..self.config.threads_per_ns.max(1) {
                let worker = NsWorker {
                    server: server.clone(),
                    params: params.clone(),
                    index: index.clone(),
                    exchanger: self.exchanger.clone(),
                    stats: stats.clone(),
                    output: self.output.clone(),
                };
                tokio::spawn(worker.run(candidate_rx.clone(), event_tx.clone()));
            }
        }
        drop(event_tx);

        let (quit_tx, mut quit_rx) = watch::channel(false);
        let _monitor = stats::spawn_monitor(
            stats.clone(),
            self.output.clone(),
            Duration::from_secs(self.config.progress_secs),
            self.config.quit_after_min,
            quit_tx,
        );

        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    None => {
                        self.output
                            .log("all name servers dropped out, stopping the walk");
                        return Ok(());
                    }
                    Some(WalkEvent::Drift { message, .. }) => {
                        if self.config.quit_on_change {
                            return Err(WalkError::consistency(message));
                        }
                        self.output.log(&message);
                    }
                    Some(WalkEvent::Interval(interval)) => {
                        if self.consume(&interval, &params, &index, &stats)? {
                            return Ok(());
                        }
                    }
                },
                _ = quit_rx.changed() => {
                    return Ok(());
                }
            }
        }
    }

    /// Feed one observed interval into the index and emit whatever is
    /// new. Returns true once the chain is complete.
    fn consume(
        &self,
        interval: &Interval,
        params: &Nsec3Params,
        index: &ChainIndex,
        stats: &Stats,
    ) -> Result<bool> {
        let outcome = index.add(&interval.start, &interval.end);

        if let Some(conflict) = &outcome.conflict {
            let err = WalkError::consistency(conflict.to_string());
            if self.config.quit_on_change {
                return Err(err);
            }
            // With a changed zone the chain can never be proven complete;
            // the inactivity timer will end the walk instead.
            self.output.log(&err.to_string());
        }

        if !outcome.start_existed {
            self.output.hash(&interval.start, params);
        }
        if !outcome.end_existed {
            self.output.hash(&interval.end, params);
        }
        if outcome.promoted_to_full {
            self.output.csv(interval, params);
        }

        stats.got_hash(outcome.start_existed, outcome.end_existed);

        if index.is_finished() {
            if self.config.verbose {
                for (start, end) in index.snapshot() {
                    self.output
                        .log(&format!("range {} => {}", start, end.unwrap_or_default()));
                }
            }
            self.output
                .log(&format!("finished with {} hashes", stats.hashes()));
            return Ok(true);
        }

        Ok(false)
    }

    /// Resolve the set of authoritative servers to walk.
    async fn bootstrap_servers(&self) -> Result<Vec<String>> {
        let listed: Vec<String> = self
            .config
            .nameservers
            .iter()
            .filter_map(|server| dns::normalize_server(server))
            .collect();

        if !listed.is_empty() {
            return Ok(listed);
        }

        dns::discover_ns(
            &self.config.domain,
            &self.config.resolvers,
            self.exchanger.as_ref(),
            &self.output,
        )
        .await
    }

    /// Fetch NSEC3PARAM from every server; the first observation wins
    /// and servers that disagree or cannot answer are dropped.
    async fn bootstrap_params(
        &self,
        servers: &[String],
    ) -> Result<(Nsec3Params, Vec<String>)> {
        let fetches = servers.iter().map(|server| async move {
            let result =
                dns::fetch_nsec3_params(&self.config.domain, server, self.exchanger.as_ref())
                    .await;
            (server, result)
        });
        let results = join_all(fetches).await;

        let mut params: Option<Nsec3Params> = None;
        let mut live = Vec::new();

        for (server, result) in results {
            match result {
                Ok(observed) => match &params {
                    None => {
                        params = Some(observed);
                        live.push(server.clone());
                    }
                    Some(first) if first.matches(observed.salt_hex(), observed.iterations()) => {
                        live.push(server.clone());
                    }
                    Some(first) => {
                        let err = WalkError::consistency(format!(
                            "{server} advertises NSEC3 parameters {} but {} was observed first",
                            observed.key(),
                            first.key()
                        ));
                        if self.config.quit_on_change {
                            return Err(err);
                        }
                        self.output.log(&format!("rejecting {server}: {err}"));
                    }
                },
                Err(err) => {
                    self.output.log(&format!("rejecting {server}: {err}"));
                }
            }
        }

        match params {
            Some(params) => Ok((params, live)),
            None => Err(WalkError::bootstrap(
                &self.config.domain,
                "could not get NSEC3 parameters from any of the DNS servers",
            )),
        }
    }

    /// Dump the raw NS response of every authoritative server, plus any
    /// NSEC3 pairs it leaks.
    pub async fn run_debug(&self) -> Result<()> {
        self.output.log(&format!(
            "showing debug data for domain: {}",
            self.config.domain
        ));

        let servers = self.bootstrap_servers().await?;
        self.output
            .log(&format!("NS servers to walk: {}", servers.join(", ")));

        for server in &servers {
            match self
                .exchanger
                .exchange(&self.config.domain, RecordType::NS, server)
                .await
            {
                Ok(response) => {
                    println!("=== response from {server} ===");
                    println!("{response:#?}");
                    match dns::scan_authority(&response, server) {
                        Ok(observed) => {
                            for record in observed {
                                println!("{};{}", record.interval.start, record.interval.end);
                            }
                        }
                        Err(err) => println!("{err}"),
                    }
                }
                Err(err) => {
                    println!("=== response from {server} ===");
                    println!("error: {err}");
                }
            }
        }

        Ok(())
    }
}
