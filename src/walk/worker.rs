//! Per-nameserver query workers.
//!
//! Every authoritative server gets a configurable number of workers,
//! each draining the shared candidate channel. A worker that detects a
//! lying responder stops for good; when the last worker is gone the
//! event channel closes and the coordinator finishes.

use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use tokio::sync::{mpsc, Mutex};

use crate::dns::{self, Exchanger};
use crate::output::Output;
use crate::types::{Candidate, Interval, Nsec3Params};
use crate::walk::index::ChainIndex;
use crate::walk::stats::Stats;

/// Pause between queries, per worker
pub const QUERY_WAIT: Duration = Duration::from_millis(100);

/// Back-off after an unreachable-server error
pub const NO_ROUTE_BACKOFF: Duration = Duration::from_secs(3);

/// What workers push at the coordinator
#[derive(Debug, Clone)]
pub enum WalkEvent {
    Interval(Interval),
    /// A response carried NSEC3 parameters other than the bootstrapped
    /// ones; the zone changed mid-walk.
    Drift { server: String, message: String },
}

pub struct NsWorker {
    pub server: String,
    pub params: Nsec3Params,
    pub index: Arc<ChainIndex>,
    pub exchanger: Arc<dyn Exchanger>,
    pub stats: Arc<Stats>,
    pub output: Arc<Output>,
}

impl NsWorker {
    pub async fn run(
        self,
        candidates: Arc<Mutex<mpsc::Receiver<Candidate>>>,
        events: mpsc::Sender<WalkEvent>,
    ) {
        loop {
            let candidate = { candidates.lock().await.recv().await };
            let Some(candidate) = candidate else {
                return;
            };

            // the filter raced new intervals; re-check before spending a query
            if self.index.is_in_range(&candidate.hash).is_some() {
                continue;
            }

            tokio::time::sleep(QUERY_WAIT).await;

            let result = self
                .exchanger
                .exchange(&candidate.name, RecordType::NS, &self.server)
                .await;
            self.stats.did_query();

            let response = match result {
                Ok(response) => response,
                Err(err) if err.is_no_connection() => {
                    self.output.log_verbose(&format!(
                        "{} does not want to talk to us, waiting a while",
                        self.server
                    ));
                    tokio::time::sleep(NO_ROUTE_BACKOFF).await;
                    continue;
                }
                Err(err) => {
                    self.output
                        .log(&format!("error querying {}: {err}", candidate.name));
                    continue;
                }
            };

            match response.response_code() {
                ResponseCode::NoError | ResponseCode::NXDomain => {}
                code => {
                    self.output.log(&format!(
                        "{} answered {code}, dropping this name server",
                        self.server
                    ));
                    return;
                }
            }

            let observed = match dns::scan_authority(&response, &self.server) {
                Ok(observed) => observed,
                Err(err) => {
                    self.output
                        .log(&format!("{err}, dropping this name server"));
                    return;
                }
            };

            for record in observed {
                if !self
                    .params
                    .matches(&record.salt_hex, record.iterations)
                {
                    let message = format!(
                        "NSEC3 parameters changed on {}: salt {} iterations {}",
                        self.server, record.salt_hex, record.iterations
                    );
                    if events
                        .send(WalkEvent::Drift {
                            server: self.server.clone(),
                            message,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }

                if events
                    .send(WalkEvent::Interval(record.interval))
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}
