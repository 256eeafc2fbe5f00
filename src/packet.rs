//! Decoded network packet model
//!
//! Only the fields the classifier needs survive decoding: addresses, UDP
//! ports, the UDP payload and the capture timestamp. Payloads are
//! [`Bytes`] views into the captured frame, so slicing never copies.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Capture timestamp attached to every packet and message
pub type Timestamp = DateTime<Utc>;

/// Convert a capture-file offset since the epoch into a timestamp
pub fn timestamp_from_epoch(offset: Duration) -> Timestamp {
    DateTime::<Utc>::from_timestamp(offset.as_secs() as i64, offset.subsec_nanos())
        .unwrap_or_default()
}

/// Link layer framing of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    LinuxSll,
    RawIp,
}

/// Network layer addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkLayer {
    Ipv4 {
        source: Ipv4Addr,
        destination: Ipv4Addr,
    },
    Ipv6 {
        source: Ipv6Addr,
        destination: Ipv6Addr,
    },
}

impl NetworkLayer {
    pub fn source(&self) -> IpAddr {
        match *self {
            NetworkLayer::Ipv4 { source, .. } => IpAddr::V4(source),
            NetworkLayer::Ipv6 { source, .. } => IpAddr::V6(source),
        }
    }

    pub fn destination(&self) -> IpAddr {
        match *self {
            NetworkLayer::Ipv4 { destination, .. } => IpAddr::V4(destination),
            NetworkLayer::Ipv6 { destination, .. } => IpAddr::V6(destination),
        }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, NetworkLayer::Ipv4 { .. })
    }
}

/// UDP segment with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpSegment {
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: Bytes,
}

/// Transport layer view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportLayer {
    Udp(UdpSegment),
    /// TCP, ICMP and anything else we do not follow
    Other,
}

/// One captured packet reduced to what SIP classification needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub network: Option<NetworkLayer>,
    pub transport: Option<TransportLayer>,
    pub timestamp: Timestamp,
}

impl DecodedPacket {
    /// Decode a captured frame
    ///
    /// Frames etherparse cannot slice decode to a packet without layers,
    /// which the classifier discards.
    pub fn decode(link: LinkType, frame: Bytes, timestamp: Timestamp) -> Self {
        let sliced = match link {
            LinkType::Ethernet => SlicedPacket::from_ethernet(&frame).ok(),
            LinkType::LinuxSll => SlicedPacket::from_linux_sll(&frame).ok(),
            LinkType::RawIp => SlicedPacket::from_ip(&frame).ok(),
        };
        let Some(sliced) = sliced else {
            return Self {
                network: None,
                transport: None,
                timestamp,
            };
        };

        let network = match &sliced.net {
            Some(NetSlice::Ipv4(ipv4)) => Some(NetworkLayer::Ipv4 {
                source: ipv4.header().source_addr(),
                destination: ipv4.header().destination_addr(),
            }),
            Some(NetSlice::Ipv6(ipv6)) => Some(NetworkLayer::Ipv6 {
                source: ipv6.header().source_addr(),
                destination: ipv6.header().destination_addr(),
            }),
            _ => None,
        };

        let transport = match &sliced.transport {
            Some(TransportSlice::Udp(udp)) => Some(TransportLayer::Udp(UdpSegment {
                source_port: udp.source_port(),
                destination_port: udp.destination_port(),
                payload: frame.slice_ref(udp.payload()),
            })),
            Some(_) => Some(TransportLayer::Other),
            None => None,
        };

        Self {
            network,
            transport,
            timestamp,
        }
    }

    /// Build an already decoded UDP packet
    pub fn udp(
        source: SocketAddr,
        destination: SocketAddr,
        payload: impl Into<Bytes>,
        timestamp: Timestamp,
    ) -> Self {
        let network = match (source.ip(), destination.ip()) {
            (IpAddr::V4(source), IpAddr::V4(destination)) => Some(NetworkLayer::Ipv4 {
                source,
                destination,
            }),
            (IpAddr::V6(source), IpAddr::V6(destination)) => Some(NetworkLayer::Ipv6 {
                source,
                destination,
            }),
            _ => None,
        };
        Self {
            network,
            transport: Some(TransportLayer::Udp(UdpSegment {
                source_port: source.port(),
                destination_port: destination.port(),
                payload: payload.into(),
            })),
            timestamp,
        }
    }

    /// The UDP segment, if this packet carries one
    pub fn udp_segment(&self) -> Option<&UdpSegment> {
        match &self.transport {
            Some(TransportLayer::Udp(segment)) => Some(segment),
            _ => None,
        }
    }
}
