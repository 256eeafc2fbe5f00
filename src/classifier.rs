//! Packet classification for the monitored SIP endpoint
//!
//! Reduces decoded packets to [`ApplicationMessage`]s: UDP payloads that
//! touch the monitored host and port, labelled with their direction and
//! the remote endpoint they concern.

use crate::packet::{DecodedPacket, Timestamp, UdpSegment};
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use tracing::trace;

/// One qualifying datagram, as seen by the correlation stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationMessage {
    /// UDP payload, a view into the captured frame
    pub payload: Bytes,
    /// Address of the far end (never the monitored host)
    pub remote: IpAddr,
    pub remote_port: u16,
    /// Sent from the monitored host and port
    pub incoming: bool,
    pub timestamp: Timestamp,
}

impl ApplicationMessage {
    pub fn new(
        payload: impl Into<Bytes>,
        remote: SocketAddr,
        incoming: bool,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            payload: payload.into(),
            remote: remote.ip(),
            remote_port: remote.port(),
            incoming,
            timestamp,
        }
    }

    /// Wrap any UDP packet with its sender as the remote endpoint
    ///
    /// Used by the stack census, which watches every endpoint rather
    /// than one monitored host.
    pub fn from_source(packet: &DecodedPacket) -> Option<Self> {
        let network = packet.network?;
        let udp = packet.udp_segment()?;
        Some(Self {
            payload: udp.payload.clone(),
            remote: network.source(),
            remote_port: udp.source_port,
            incoming: false,
            timestamp: packet.timestamp,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        SocketAddr::new(self.remote, self.remote_port)
    }
}

/// Filter for traffic to and from one monitored host and port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    host: IpAddr,
    port: u16,
}

impl Classifier {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Classify a packet, discarding anything that is not SIP for us
    pub fn classify(&self, packet: &DecodedPacket) -> Option<ApplicationMessage> {
        let (source, destination, udp) = self.addressed(packet)?;

        let (remote, remote_port, incoming) =
            if udp.source_port == self.port && source == self.host {
                (destination, udp.destination_port, true)
            } else if udp.destination_port == self.port && destination == self.host {
                (source, udp.source_port, false)
            } else {
                return None;
            };

        trace!(
            "UDP {}/{} to {}/{}",
            source,
            udp.source_port,
            destination,
            udp.destination_port
        );
        Some(ApplicationMessage {
            payload: udp.payload.clone(),
            remote,
            remote_port,
            incoming,
            timestamp: packet.timestamp,
        })
    }

    /// Looser match for raw dumps: host on either side, port on either side
    ///
    /// Returns source, destination and payload.
    pub fn observe<'p>(
        &self,
        packet: &'p DecodedPacket,
    ) -> Option<(SocketAddr, SocketAddr, &'p Bytes)> {
        let (source, destination, udp) = self.addressed(packet)?;
        if udp.source_port != self.port && udp.destination_port != self.port {
            return None;
        }
        Some((
            SocketAddr::new(source, udp.source_port),
            SocketAddr::new(destination, udp.destination_port),
            &udp.payload,
        ))
    }

    // Network family and host checks shared by both filters
    fn addressed<'p>(&self, packet: &'p DecodedPacket) -> Option<(IpAddr, IpAddr, &'p UdpSegment)> {
        let network = packet.network?;
        if network.is_ipv4() != self.host.is_ipv4() {
            return None;
        }
        let (source, destination) = (network.source(), network.destination());
        if source != self.host && destination != self.host {
            return None;
        }
        let udp = packet.udp_segment()?;
        Some((source, destination, udp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TransportLayer;

    fn host() -> Classifier {
        Classifier::new("10.0.0.1".parse().unwrap(), 5060)
    }

    fn udp(src: &str, dst: &str) -> DecodedPacket {
        DecodedPacket::udp(
            src.parse().unwrap(),
            dst.parse().unwrap(),
            Bytes::from_static(b"OPTIONS sip:x SIP/2.0\r\n\r\n"),
            Timestamp::default(),
        )
    }

    #[test]
    fn test_classify_from_monitored_endpoint() {
        let msg = host().classify(&udp("10.0.0.1:5060", "10.0.0.5:5070")).unwrap();
        assert!(msg.incoming);
        assert_eq!(msg.remote_addr(), "10.0.0.5:5070".parse().unwrap());
    }

    #[test]
    fn test_classify_to_monitored_endpoint() {
        let msg = host().classify(&udp("10.0.0.5:5070", "10.0.0.1:5060")).unwrap();
        assert!(!msg.incoming);
        assert_eq!(msg.remote_addr(), "10.0.0.5:5070".parse().unwrap());
        assert_eq!(&msg.payload[..], b"OPTIONS sip:x SIP/2.0\r\n\r\n");
    }

    #[test]
    fn test_classify_discards_foreign_traffic() {
        let classifier = host();
        // other hosts
        assert!(classifier.classify(&udp("10.0.0.7:5060", "10.0.0.5:5060")).is_none());
        // our host, wrong port
        assert!(classifier.classify(&udp("10.0.0.1:5080", "10.0.0.5:5060")).is_none());
        // family mismatch
        assert!(classifier.classify(&udp("[::1]:5060", "[::2]:5060")).is_none());

        let mut tcp = udp("10.0.0.1:5060", "10.0.0.5:5060");
        tcp.transport = Some(TransportLayer::Other);
        assert!(classifier.classify(&tcp).is_none());
    }

    #[test]
    fn test_classify_ipv6_host() {
        let classifier = Classifier::new("2001:db8::1".parse().unwrap(), 5060);
        let msg = classifier
            .classify(&udp("[2001:db8::9]:5062", "[2001:db8::1]:5060"))
            .unwrap();
        assert!(!msg.incoming);
        assert_eq!(msg.remote_port, 5062);
    }

    #[test]
    fn test_observe_accepts_either_port() {
        let classifier = host();
        // port matches only on the remote side, still dumped
        let (src, dst, _) = classifier
            .observe(&udp("10.0.0.1:5080", "10.0.0.5:5060"))
            .unwrap();
        assert_eq!(src.port(), 5080);
        assert_eq!(dst.port(), 5060);
        assert!(classifier.observe(&udp("10.0.0.1:5080", "10.0.0.5:5070")).is_none());
    }

    #[test]
    fn test_from_source() {
        let msg = ApplicationMessage::from_source(&udp("10.0.0.9:5070", "10.0.0.1:5060")).unwrap();
        assert_eq!(msg.remote_addr(), "10.0.0.9:5070".parse().unwrap());
    }
}
