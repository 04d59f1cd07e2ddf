//! DNS plumbing: message-level UDP exchanges, authoritative-server
//! discovery, NSEC3PARAM bootstrap, and NSEC3 extraction from authority
//! sections.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use data_encoding::{BASE32HEX_NOPAD, HEXLOWER};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::dnssec::rdata::DNSSECRData;
use hickory_proto::rr::dnssec::Nsec3HashAlgorithm;
use hickory_proto::rr::{Name, RData, RecordType};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use crate::error::{Result, WalkError};
use crate::output::Output;
use crate::types::{Interval, Nsec3Params};

pub const DNS_PORT: &str = "53";
pub const EDNS_PAYLOAD: u16 = 4096;

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// One DNS round-trip. The walker only ever needs "send this question to
/// that server, give me the parsed message back", so the whole transport
/// hides behind this seam and tests can swap in a scripted responder.
#[async_trait]
pub trait Exchanger: Send + Sync {
    async fn exchange(&self, qname: &str, rtype: RecordType, server: &str) -> Result<Message>;
}

/// Production exchanger: one UDP datagram per query with EDNS0 payload
/// 4096 and the DO bit set.
#[derive(Debug, Default)]
pub struct UdpExchanger;

impl UdpExchanger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Exchanger for UdpExchanger {
    async fn exchange(&self, qname: &str, rtype: RecordType, server: &str) -> Result<Message> {
        let request = build_query(qname, rtype)?;
        let payload = request.to_vec()?;
        let addr = resolve_server(server).await?;

        let socket = timeout(DIAL_TIMEOUT, bind_and_connect(addr))
            .await
            .map_err(|_| WalkError::transport(server, "connect timed out", true))?
            .map_err(|err| WalkError::transport(server, err.to_string(), false))?;

        timeout(WRITE_TIMEOUT, socket.send(&payload))
            .await
            .map_err(|_| WalkError::transport(server, "write timed out", true))?
            .map_err(|err| WalkError::transport(server, err.to_string(), false))?;

        let mut buffer = vec![0u8; EDNS_PAYLOAD as usize];
        let received = timeout(READ_TIMEOUT, socket.recv(&mut buffer))
            .await
            .map_err(|_| WalkError::transport(server, "read timed out", true))?
            .map_err(|err| WalkError::transport(server, err.to_string(), false))?;

        let response = Message::from_vec(&buffer[..received])?;
        if response.id() != request.id() {
            return Err(WalkError::responder(server, "response id mismatch"));
        }

        Ok(response)
    }
}

async fn bind_and_connect(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = if addr.is_ipv6() {
        UdpSocket::bind(("::", 0)).await?
    } else {
        UdpSocket::bind(("0.0.0.0", 0)).await?
    };
    socket.connect(addr).await?;
    Ok(socket)
}

async fn resolve_server(server: &str) -> Result<SocketAddr> {
    let mut addrs = lookup_host(server)
        .await
        .map_err(|err| WalkError::transport(server, format!("cannot resolve: {err}"), false))?;

    addrs
        .next()
        .ok_or_else(|| WalkError::transport(server, "no addresses", false))
}

/// Build an EDNS0 query with the DO bit set, so negative answers carry
/// their NSEC/NSEC3 proof.
pub fn build_query(qname: &str, rtype: RecordType) -> Result<Message> {
    let name = Name::from_ascii(fqdn(qname))?;

    let mut message = Message::new();
    message.set_id(rand::random());
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(name, rtype));

    let mut edns = Edns::new();
    edns.set_max_payload(EDNS_PAYLOAD);
    edns.set_dnssec_ok(true);
    message.set_edns(edns);

    Ok(message)
}

pub fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

/// Normalise a server argument: strip whitespace and dots, default the
/// port to 53.
pub fn normalize_server(server: &str) -> Option<String> {
    let server = server.trim().trim_matches('.');
    if server.is_empty() {
        return None;
    }

    if server.contains(':') {
        Some(server.to_string())
    } else {
        Some(format!("{server}:{DNS_PORT}"))
    }
}

/// Split a comma-separated server list and normalise each entry.
pub fn parse_server_list(value: &str) -> Vec<String> {
    value.split(',').filter_map(normalize_server).collect()
}

/// Ask each generic resolver for the zone's NS set and keep the largest
/// answer.
pub async fn discover_ns(
    domain: &str,
    resolvers: &[String],
    exchanger: &dyn Exchanger,
    output: &Output,
) -> Result<Vec<String>> {
    output.log(&format!(
        "getting NS servers for [{}] via [{}]",
        domain,
        resolvers.join(", ")
    ));

    let mut best: Vec<String> = Vec::new();
    for resolver in resolvers {
        let response = match exchanger.exchange(domain, RecordType::NS, resolver).await {
            Ok(response) => response,
            Err(err) if err.is_no_connection() => {
                output.log(&format!("no route to {resolver}"));
                continue;
            }
            Err(err) => {
                output.log(&format!("error getting NS servers from {resolver}: {err}"));
                continue;
            }
        };

        if response.response_code() != ResponseCode::NoError {
            output.log(&format!(
                "{resolver} answered {} for the NS query",
                response.response_code()
            ));
            continue;
        }

        let mut servers = Vec::new();
        for record in response.answers() {
            if let Some(RData::NS(ns)) = record.data() {
                let name = ns.0.to_ascii().to_lowercase();
                if let Some(server) = normalize_server(&name) {
                    servers.push(server);
                }
            }
        }

        if servers.len() > best.len() {
            best = servers;
        }
    }

    if best.is_empty() {
        return Err(WalkError::bootstrap(
            domain,
            "no NS servers found for the zone",
        ));
    }

    Ok(best)
}

/// Fetch the zone's NSEC3PARAM record from one authoritative server.
pub async fn fetch_nsec3_params(
    domain: &str,
    server: &str,
    exchanger: &dyn Exchanger,
) -> Result<Nsec3Params> {
    let response = exchanger
        .exchange(domain, RecordType::NSEC3PARAM, server)
        .await?;

    if response.response_code() != ResponseCode::NoError {
        return Err(WalkError::responder(
            server,
            format!(
                "NSEC3PARAM query answered {}",
                response.response_code()
            ),
        ));
    }

    for record in response.answers() {
        if let Some(RData::DNSSEC(DNSSECRData::NSEC3PARAM(param))) = record.data() {
            match param.hash_algorithm() {
                Nsec3HashAlgorithm::SHA1 => {}
                #[allow(unreachable_patterns)]
                other => {
                    return Err(WalkError::bootstrap(
                        domain,
                        format!("{server} advertises unsupported NSEC3 hash algorithm {other:?}"),
                    ));
                }
            }

            let salt_hex = HEXLOWER.encode(param.salt());
            return Nsec3Params::new(domain, &salt_hex, param.iterations());
        }
    }

    Err(WalkError::bootstrap(
        domain,
        format!("{server} did not return NSEC3PARAM; the zone may not use NSEC3"),
    ))
}

/// One NSEC3 record pulled out of an authority section, with the
/// parameters it was signed under so the caller can spot drift.
#[derive(Debug, Clone)]
pub struct ObservedNsec3 {
    pub interval: Interval,
    pub salt_hex: String,
    pub iterations: u16,
}

/// Scan the authority section of a response for NSEC3 gaps.
///
/// Black lies (an NSEC whose next domain starts with the `\000` label)
/// and white lies (an NSEC3 gap of a single trailing character) mean the
/// responder synthesises proofs per query; walking it is pointless and
/// the caller should drop the server.
pub fn scan_authority(response: &Message, server: &str) -> Result<Vec<ObservedNsec3>> {
    let mut observed = Vec::new();

    for record in response.name_servers() {
        match record.data() {
            Some(RData::DNSSEC(DNSSECRData::NSEC(nsec))) => {
                if is_black_lie(nsec.next_domain_name()) {
                    return Err(WalkError::responder(server, "black lies detected"));
                }
            }
            Some(RData::DNSSEC(DNSSECRData::NSEC3(nsec3))) => {
                let owner = record.name().to_ascii().to_lowercase();
                let start = first_label(&owner).to_string();
                let end = BASE32HEX_NOPAD
                    .encode(nsec3.next_hashed_owner_name())
                    .to_lowercase();

                if is_white_lie(&start, &end) {
                    return Err(WalkError::responder(server, "white lies detected"));
                }

                let types = nsec3
                    .type_bit_maps()
                    .iter()
                    .map(|rtype| rtype.to_string())
                    .collect();

                observed.push(ObservedNsec3 {
                    interval: Interval { start, end, types },
                    salt_hex: HEXLOWER.encode(nsec3.salt()),
                    iterations: nsec3.iterations(),
                });
            }
            _ => {}
        }
    }

    Ok(observed)
}

fn is_black_lie(next_domain: &Name) -> bool {
    next_domain
        .iter()
        .next()
        .map(|label| label.first() == Some(&0))
        .unwrap_or(false)
}

fn is_white_lie(start: &str, end: &str) -> bool {
    !start.is_empty()
        && start.len() == end.len()
        && start[..start.len() - 1] == end[..end.len() - 1]
}

fn first_label(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
