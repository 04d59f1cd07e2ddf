//! Integration tests for zonewalk

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use data_encoding::BASE32HEX_NOPAD;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, NSEC3, NSEC3PARAM};
use hickory_proto::rr::dnssec::Nsec3HashAlgorithm;
use hickory_proto::rr::{Name, RData, Record, RecordType};

use zonewalk::crack::Cracker;
use zonewalk::dns::Exchanger;
use zonewalk::error::Result;
use zonewalk::hasher;
use zonewalk::output::Output;
use zonewalk::types::Nsec3Params;
use zonewalk::walk::{WalkConfig, Walker};

const APEX: &str = "example.test";
const SALT: &str = "aabbccdd";
const ITERATIONS: u16 = 2;

/// A small signed zone: precomputed NSEC3 ring over its names.
struct MockZone {
    params: Nsec3Params,
    ring: Vec<String>,
}

impl MockZone {
    fn new(labels: &[&str]) -> Self {
        let params = Nsec3Params::new(APEX, SALT, ITERATIONS).unwrap();

        let mut ring: Vec<String> = labels
            .iter()
            .map(|&label| params.hash_name(&params.full_name(label)).unwrap())
            .collect();
        ring.push(params.hash_name(APEX).unwrap());
        ring.sort();
        ring.dedup();

        Self { params, ring }
    }

    /// The ring interval covering a hash, wrap included.
    fn covering(&self, hash: &str) -> (String, String) {
        let position = self
            .ring
            .iter()
            .rposition(|candidate| candidate.as_str() <= hash)
            .unwrap_or(self.ring.len() - 1);

        let start = self.ring[position].clone();
        let end = self.ring[(position + 1) % self.ring.len()].clone();
        (start, end)
    }
}

/// Scripted authoritative server: answers NSEC3PARAM probes with the
/// zone parameters and every other query with the NSEC3 record covering
/// the queried name.
struct MockExchanger {
    zone: MockZone,
}

#[async_trait]
impl Exchanger for MockExchanger {
    async fn exchange(&self, qname: &str, rtype: RecordType, _server: &str) -> Result<Message> {
        let mut response = Message::new();
        response.set_message_type(MessageType::Response);

        if rtype == RecordType::NSEC3PARAM {
            let rdata = RData::DNSSEC(DNSSECRData::NSEC3PARAM(NSEC3PARAM::new(
                Nsec3HashAlgorithm::SHA1,
                false,
                ITERATIONS,
                hasher::decode_salt(SALT).unwrap(),
            )));
            response.add_answer(Record::from_rdata(
                Name::from_ascii(format!("{APEX}.")).unwrap(),
                3600,
                rdata,
            ));
            return Ok(response);
        }

        response.set_response_code(ResponseCode::NXDomain);

        let hash = self.zone.params.hash_name(qname).unwrap();
        let (start, end) = self.zone.covering(&hash);

        let owner = Name::from_ascii(format!("{start}.{APEX}.")).unwrap();
        let next_hashed = BASE32HEX_NOPAD
            .decode(end.to_uppercase().as_bytes())
            .unwrap();
        let rdata = RData::DNSSEC(DNSSECRData::NSEC3(NSEC3::new(
            Nsec3HashAlgorithm::SHA1,
            false,
            ITERATIONS,
            hasher::decode_salt(SALT).unwrap(),
            next_hashed,
            vec![RecordType::A],
        )));
        response.add_name_server(Record::from_rdata(owner, 3600, rdata));

        Ok(response)
    }
}

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("zonewalk-it-{tag}-{}", std::process::id()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_walk_recovers_a_small_zone() {
    let zone = MockZone::new(&["alpha", "bravo", "charlie"]);
    let expected_hashes = zone.ring.clone();
    assert_eq!(expected_hashes.len(), 4, "apex plus three names");

    let prefix = temp_path("walk").to_string_lossy().into_owned();
    let output = Arc::new(Output::with_prefix(&prefix, false).unwrap());

    let config = WalkConfig {
        domain: APEX.to_string(),
        nameservers: vec!["ns1.example.test".to_string()],
        threads_per_ns: 2,
        ..WalkConfig::default()
    };

    let walker = Walker::with_exchanger(config, output, Arc::new(MockExchanger { zone }));
    tokio::time::timeout(Duration::from_secs(60), walker.run())
        .await
        .expect("walk did not terminate")
        .expect("walk failed");

    // every ring hash emitted exactly once
    let hash_content = std::fs::read_to_string(format!("{prefix}.hash")).unwrap();
    let mut emitted: Vec<&str> = hash_content
        .lines()
        .map(|line| line.split(':').next().unwrap())
        .collect();
    emitted.sort_unstable();
    assert_eq!(emitted, expected_hashes.iter().map(String::as_str).collect::<Vec<_>>());

    for line in hash_content.lines() {
        assert!(line.ends_with(&format!(":.{APEX}:{SALT}:{ITERATIONS}")));
    }

    // one CSV record per ring interval, all seven fields intact
    let csv_content = std::fs::read_to_string(format!("{prefix}.csv")).unwrap();
    let csv_lines: Vec<&str> = csv_content.lines().collect();
    assert_eq!(csv_lines.len(), 4);
    for line in &csv_lines {
        assert_eq!(line.split(',').count(), 7);
        assert!(line.contains(APEX));
        assert!(line.ends_with(",A"));
    }

    for suffix in [".hash", ".csv", ".log"] {
        let _ = std::fs::remove_file(format!("{prefix}{suffix}"));
    }
}

#[test]
fn test_cracker_fills_plaintext_from_wordlist() {
    let params = Nsec3Params::new(APEX, SALT, ITERATIONS).unwrap();
    let target = params.hash_name(&params.full_name("mail")).unwrap();
    let next = params.hash_name(&params.full_name("web")).unwrap();

    let csv_path = temp_path("crack.csv");
    std::fs::write(
        &csv_path,
        format!("{target},{next},{APEX},{SALT},{ITERATIONS},,A|AAAA\n"),
    )
    .unwrap();

    let wordlist_path = temp_path("crack.words");
    std::fs::write(&wordlist_path, "nothere\nmail\nweb\n").unwrap();

    let cracker = Cracker::new(Arc::new(Output::new(false)));

    let changed = cracker.run_wordlist(&csv_path, &wordlist_path).unwrap();
    assert_eq!(changed, 1);

    let content = std::fs::read_to_string(&csv_path).unwrap();
    assert!(content.contains(&format!(",mail.{APEX},")));

    // a second run recovers nothing new
    let changed = cracker.run_wordlist(&csv_path, &wordlist_path).unwrap();
    assert_eq!(changed, 0);

    let _ = std::fs::remove_file(&csv_path);
    let _ = std::fs::remove_file(&wordlist_path);
}

#[test]
fn test_single_mode_prints_reference_hash() {
    let cracker = Cracker::new(Arc::new(Output::new(false)));
    cracker.run_single("www.example.com", "aabbccdd", 5).unwrap();
}

#[tokio::test]
async fn test_walk_fails_without_nsec3param() {
    struct NoParamExchanger;

    #[async_trait]
    impl Exchanger for NoParamExchanger {
        async fn exchange(
            &self,
            _qname: &str,
            _rtype: RecordType,
            _server: &str,
        ) -> Result<Message> {
            let mut response = Message::new();
            response.set_message_type(MessageType::Response);
            Ok(response)
        }
    }

    let config = WalkConfig {
        domain: APEX.to_string(),
        nameservers: vec!["ns1.example.test".to_string()],
        ..WalkConfig::default()
    };

    let walker = Walker::with_exchanger(
        config,
        Arc::new(Output::new(false)),
        Arc::new(NoParamExchanger),
    );

    let err = walker.run().await.unwrap_err();
    assert!(err.to_string().contains("NSEC3"));
}
