//! Packet sources feeding the capture stage
//!
//! The pipeline only needs a stream of decoded packets. Offline capture
//! files are read with `pcap-file`; replay sources serve tests and
//! benchmarks from memory.

use crate::error::{SpycraftError, SpycraftResult};
use crate::packet::{timestamp_from_epoch, DecodedPacket, LinkType};
use bytes::Bytes;
use pcap_file::pcap::PcapReader;
use pcap_file::{DataLink, PcapError};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

/// Supplier of decoded packets
///
/// `None` signals end of input. An `Err` is fatal for the capture.
pub trait PacketSource: Send {
    fn next_packet(&mut self) -> Option<SpycraftResult<DecodedPacket>>;

    /// Live sources are paced by the network rather than by the reader
    fn is_live(&self) -> bool {
        false
    }
}

/// Verify a capture path names a readable `.pcap` file
pub fn check_capture_path(path: &Path) -> SpycraftResult<()> {
    let display = path.display().to_string();
    let metadata = std::fs::metadata(path).map_err(|e| SpycraftError::capture(&display, e))?;
    if metadata.is_dir() {
        return Err(SpycraftError::capture(display, "is directory"));
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("pcap") {
        return Err(SpycraftError::capture(display, "must be .pcap file"));
    }
    Ok(())
}

/// Offline reader for classic pcap capture files
pub struct PcapFileSource {
    path: String,
    link: LinkType,
    snapshot: usize,
    reader: PcapReader<BufReader<File>>,
    truncated: bool,
}

impl PcapFileSource {
    /// Open a capture file and check its link type
    pub fn open(path: impl AsRef<Path>) -> SpycraftResult<Self> {
        let path = path.as_ref();
        check_capture_path(path)?;
        let display = path.display().to_string();

        let file = File::open(path).map_err(|e| SpycraftError::capture(&display, e))?;
        let reader =
            PcapReader::new(BufReader::new(file)).map_err(|e| SpycraftError::capture(&display, e))?;

        let link = match reader.header().datalink {
            DataLink::ETHERNET => LinkType::Ethernet,
            DataLink::LINUX_SLL => LinkType::LinuxSll,
            DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 => LinkType::RawIp,
            other => {
                return Err(SpycraftError::capture(
                    display,
                    format!("unsupported link type {:?}", other),
                ))
            }
        };

        Ok(Self {
            path: display,
            link,
            snapshot: usize::MAX,
            reader,
            truncated: false,
        })
    }

    /// Decode at most `snapshot` bytes of each frame (0 for no limit)
    pub fn with_snapshot(mut self, snapshot: u32) -> Self {
        self.snapshot = match snapshot {
            0 => usize::MAX,
            n => n as usize,
        };
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn link_type(&self) -> LinkType {
        self.link
    }

    /// The file ended inside a record
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

// A capture cut short mid-record, as left behind by an interrupted capture
fn is_truncation(err: &PcapError) -> bool {
    match err {
        PcapError::IncompleteBuffer => true,
        PcapError::IoError(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> Option<SpycraftResult<DecodedPacket>> {
        if self.truncated {
            return None;
        }
        let packet = match self.reader.next_packet()? {
            Ok(packet) => packet,
            Err(e) if is_truncation(&e) => {
                warn!("{}: last record truncated, treating as end of file", self.path);
                self.truncated = true;
                return None;
            }
            Err(e) => return Some(Err(SpycraftError::capture(&self.path, e))),
        };
        let len = packet.data.len().min(self.snapshot);
        let frame = Bytes::copy_from_slice(&packet.data[..len]);
        let timestamp = timestamp_from_epoch(packet.timestamp);
        Some(Ok(DecodedPacket::decode(self.link, frame, timestamp)))
    }
}

impl Iterator for PcapFileSource {
    type Item = SpycraftResult<DecodedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet()
    }
}

/// In-memory source replaying already decoded packets in order
#[derive(Debug, Default)]
pub struct ReplaySource {
    packets: VecDeque<DecodedPacket>,
    live: bool,
}

impl ReplaySource {
    pub fn new(packets: impl IntoIterator<Item = DecodedPacket>) -> Self {
        Self {
            packets: packets.into_iter().collect(),
            live: false,
        }
    }

    /// Present the replay as a live source
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.packets.len()
    }
}

impl PacketSource for ReplaySource {
    fn next_packet(&mut self) -> Option<SpycraftResult<DecodedPacket>> {
        self.packets.pop_front().map(Ok)
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
