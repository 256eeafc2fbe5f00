//! SIP stack census
//!
//! Records every remote SIP stack the first time it sends a call-related
//! message: its SIP version, how it identified itself and its agent
//! string. Capture files are scanned in parallel and merged in file order.

use crate::classifier::ApplicationMessage;
use crate::error::SpycraftResult;
use crate::packet::Timestamp;
use crate::parser::{AgentKind, ParsedHeaders, SipParser};
use crate::source::{PacketSource, PcapFileSource};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{debug, info};

/// One remote SIP stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInfo {
    pub version: String,
    pub endpoint: SocketAddr,
    pub mode: AgentKind,
    pub agent: String,
    pub first_seen: Timestamp,
    pub messages: u64,
}

impl fmt::Display for StackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.version, self.endpoint, self.mode, self.agent
        )
    }
}

/// Stacks in order of first sighting
#[derive(Debug, Default)]
pub struct StackCensus {
    stacks: Vec<StackInfo>,
    index: HashMap<SocketAddr, usize>,
}

impl StackCensus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a parsed message; returns the stack when it is new
    pub fn observe(
        &mut self,
        message: &ApplicationMessage,
        parsed: &ParsedHeaders<'_>,
    ) -> Option<&StackInfo> {
        let endpoint = message.remote_addr();
        if let Some(&slot) = self.index.get(&endpoint) {
            self.stacks[slot].messages += 1;
            return None;
        }

        let info = StackInfo {
            version: String::from_utf8_lossy(parsed.version()).into_owned(),
            endpoint,
            mode: parsed.agent_kind,
            agent: parsed
                .agent
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .unwrap_or_default(),
            first_seen: message.timestamp,
            messages: 1,
        };
        self.index.insert(endpoint, self.stacks.len());
        self.stacks.push(info);
        self.stacks.last()
    }

    /// Fold in a later census; stacks already known keep their first sighting
    pub fn merge(&mut self, other: StackCensus) {
        for info in other.stacks {
            match self.index.get(&info.endpoint) {
                Some(&slot) => self.stacks[slot].messages += info.messages,
                None => {
                    self.index.insert(info.endpoint, self.stacks.len());
                    self.stacks.push(info);
                }
            }
        }
    }

    pub fn stacks(&self) -> &[StackInfo] {
        &self.stacks
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

/// Census of every UDP payload a source yields
pub fn scan_source(source: &mut dyn PacketSource, parser: &SipParser) -> SpycraftResult<StackCensus> {
    let mut census = StackCensus::new();
    while let Some(packet) = source.next_packet() {
        let packet = packet?;
        let Some(message) = ApplicationMessage::from_source(&packet) else {
            continue;
        };
        match parser.parse(&message.payload) {
            Ok(parsed) => {
                if let Some(info) = census.observe(&message, &parsed) {
                    debug!("new stack {}", info);
                }
            }
            Err(e) => debug!("skipping {}: {}", message.remote_addr(), e),
        }
    }
    Ok(census)
}

/// Scan capture files in parallel and merge them in the given order
pub fn scan_files(paths: &[PathBuf], parser: &SipParser, snapshot: u32) -> SpycraftResult<StackCensus> {
    let censuses = paths
        .par_iter()
        .map(|path| {
            info!("searching {}", path.display());
            let mut source = PcapFileSource::open(path)?.with_snapshot(snapshot);
            scan_source(&mut source, parser)
        })
        .collect::<SpycraftResult<Vec<_>>>()?;

    let mut merged = StackCensus::new();
    for census in censuses {
        merged.merge(census);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DecodedPacket;
    use crate::source::ReplaySource;
    use bytes::Bytes;

    fn packet(src: &str, payload: &'static [u8]) -> DecodedPacket {
        DecodedPacket::udp(
            src.parse().unwrap(),
            "10.0.0.1:5060".parse().unwrap(),
            Bytes::from_static(payload),
            Timestamp::default(),
        )
    }

    const INVITE: &[u8] =
        b"INVITE sip:bob@x SIP/2.0\r\nCall-ID: a1\r\nUser-Agent: Softphone 3\r\n\r\n";
    const OK: &[u8] = b"SIP/2.0 200 OK\r\nCall-ID: a1\r\nServer: PBX 9\r\n\r\n";
    const KEEPALIVE: &[u8] = b"OPTIONS sip:x SIP/2.0\r\nVia: y\r\n\r\n";

    #[test]
    fn test_first_sighting_only() {
        let mut source = ReplaySource::new(vec![
            packet("10.0.0.5:5060", KEEPALIVE),
            packet("10.0.0.5:5060", INVITE),
            packet("10.0.0.5:5060", INVITE),
            packet("10.0.0.9:5060", OK),
        ]);
        let census = scan_source(&mut source, &SipParser::default()).unwrap();
        assert_eq!(census.len(), 2);

        let phone = &census.stacks()[0];
        assert_eq!(phone.mode, AgentKind::Agent);
        assert_eq!(phone.messages, 2);
        assert_eq!(phone.to_string(), "SIP/2.0 10.0.0.5:5060 Agent Softphone 3");

        let pbx = &census.stacks()[1];
        assert_eq!(pbx.mode, AgentKind::Server);
        assert_eq!(pbx.agent, "PBX 9");
    }

    #[test]
    fn test_merge_keeps_file_order() {
        let parser = SipParser::default();
        let mut first = scan_source(
            &mut ReplaySource::new(vec![packet("10.0.0.9:5060", OK)]),
            &parser,
        )
        .unwrap();
        let second = scan_source(
            &mut ReplaySource::new(vec![
                packet("10.0.0.5:5060", INVITE),
                packet("10.0.0.9:5060", OK),
            ]),
            &parser,
        )
        .unwrap();

        first.merge(second);
        let endpoints: Vec<String> = first.stacks().iter().map(|s| s.endpoint.to_string()).collect();
        assert_eq!(endpoints, ["10.0.0.9:5060", "10.0.0.5:5060"]);
        assert_eq!(first.stacks()[0].messages, 2);
    }

    #[test]
    fn test_scan_files_rejects_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("missing.pcap")];
        assert!(scan_files(&paths, &SipParser::default(), 0).is_err());
    }
}
