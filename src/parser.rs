//! SIP message parser
//!
//! Turns one datagram payload into [`ParsedHeaders`]: the start line plus
//! the handful of headers correlation needs. All split results live in
//! stack-allocated [`Sections`] owned by the parsing call, and every field
//! borrows from the payload, so a parse never touches the heap.
//!
//! Rejections are per-message [`SpycraftError`]s. All of them are
//! recoverable; only [`SpycraftError::InvalidStatus`] is worth logging.

use crate::error::{SpycraftError, SpycraftResult};
use crate::limits::{DEFAULT_COLLATE_HEADER, MAX_HEADER_LINES, MAX_SECTIONS, START_LINE_FIELDS};
use crate::scanner::{match_keyword, split_keypair, Sections};
use std::borrow::Cow;
use strum_macros::{Display, EnumString};

const SIP_PREFIX: &[u8] = b"SIP/";

/// How the far end identified its SIP stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum AgentKind {
    /// No User-Agent or Server header
    #[default]
    Unknown,
    /// User-Agent header
    Agent,
    /// Server header: the far end answered as a server
    Server,
}

/// Request or status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLine<'a> {
    Request {
        method: &'a [u8],
        uri: &'a [u8],
        version: &'a [u8],
    },
    Response {
        version: &'a [u8],
        status: u16,
        reason: &'a [u8],
    },
}

/// Header fields extracted from one SIP message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeaders<'a> {
    pub start: StartLine<'a>,
    pub call_id: &'a [u8],
    /// Application collation hint, when the configured header is present
    pub collate_id: Option<&'a [u8]>,
    pub agent: Option<&'a [u8]>,
    pub agent_kind: AgentKind,
    pub body: Option<&'a [u8]>,
}

impl<'a> ParsedHeaders<'a> {
    pub fn is_response(&self) -> bool {
        matches!(self.start, StartLine::Response { .. })
    }

    /// Response status, `None` for requests
    pub fn status(&self) -> Option<u16> {
        match self.start {
            StartLine::Response { status, .. } => Some(status),
            StartLine::Request { .. } => None,
        }
    }

    /// Request method token, `None` for responses
    pub fn method(&self) -> Option<&'a [u8]> {
        match self.start {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn version(&self) -> &'a [u8] {
        match self.start {
            StartLine::Request { version, .. } | StartLine::Response { version, .. } => version,
        }
    }

    /// True for a request whose method is `method`, case-insensitively
    pub fn is_method(&self, method: &[u8]) -> bool {
        self.method().is_some_and(|m| match_keyword(m, method))
    }

    /// Direction used for correlation
    ///
    /// A response travels opposite to the request it answers, so the
    /// transport direction is inverted for responses.
    pub fn effective_incoming(&self, transport_incoming: bool) -> bool {
        transport_incoming != self.is_response()
    }

    pub fn call_id_str(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.call_id)
    }

    /// Collation hint if present, else the Call-ID
    pub fn collation(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.collate_id.unwrap_or(self.call_id))
    }
}

/// SIP parser configured with the collation hint header to look for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipParser {
    collate_header: String,
}

impl Default for SipParser {
    fn default() -> Self {
        Self::new(DEFAULT_COLLATE_HEADER)
    }
}

impl SipParser {
    pub fn new(collate_header: impl Into<String>) -> Self {
        Self {
            collate_header: collate_header.into(),
        }
    }

    pub fn collate_header(&self) -> &str {
        &self.collate_header
    }

    /// Parse one datagram payload
    pub fn parse<'a>(&self, payload: &'a [u8]) -> SpycraftResult<ParsedHeaders<'a>> {
        // headers and optional body
        let parts = Sections::<'a, MAX_SECTIONS>::split(payload, b"\r\n\r\n");
        let headers = parts
            .get(0)
            .ok_or_else(|| SpycraftError::malformed("no header section"))?;

        let lines = Sections::<'a, MAX_HEADER_LINES>::split(headers, b"\r\n");
        if lines.len() < 2 {
            return Err(SpycraftError::malformed("no sip headers"));
        }
        if lines.is_full() {
            return Err(SpycraftError::capacity("header lines", MAX_HEADER_LINES));
        }

        let start_line = lines.get(0).unwrap_or_default();
        let fields = Sections::<'a, START_LINE_FIELDS>::split(start_line, b" ");
        let [first, second, third] = match fields.as_slice() {
            [a, b, c] => [*a, *b, *c],
            _ => return Err(SpycraftError::malformed("start line needs three fields")),
        };
        let response = first.starts_with(SIP_PREFIX);
        if !response && !third.starts_with(SIP_PREFIX) {
            return Err(SpycraftError::malformed("request version is not SIP"));
        }

        let key = self.collate_header.as_bytes();
        let mut call_id: &[u8] = &[];
        let mut collate_id = None;
        let mut agent = None;
        let mut agent_kind = AgentKind::Unknown;
        for line in lines.iter().skip(1) {
            let (name, value) = split_keypair(line, b':');
            if match_keyword(name, b"call-id") {
                call_id = value;
            } else if match_keyword(name, key) {
                collate_id = Some(value);
            } else if match_keyword(name, b"user-agent") {
                agent = Some(value);
                agent_kind = AgentKind::Agent;
            } else if match_keyword(name, b"server") {
                agent = Some(value);
                agent_kind = AgentKind::Server;
            }
        }
        if call_id.is_empty() {
            return Err(SpycraftError::MissingCallId);
        }

        let start = if response {
            StartLine::Response {
                version: first,
                status: parse_status(second)?,
                reason: third,
            }
        } else {
            StartLine::Request {
                method: first,
                uri: second,
                version: third,
            }
        };

        Ok(ParsedHeaders {
            start,
            call_id,
            collate_id: collate_id.filter(|v| !v.is_empty()),
            agent: agent.filter(|v| !v.is_empty()),
            agent_kind,
            body: parts.get(1),
        })
    }
}

/// Parse a status code as an unsigned decimal, saturating at `u16::MAX`
fn parse_status(field: &[u8]) -> SpycraftResult<u16> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(SpycraftError::InvalidStatus {
            status: String::from_utf8_lossy(field).into_owned(),
        });
    }
    // oversized codes stay numeric so range checks reject them
    Ok(field.iter().fold(0u16, |n, &b| {
        n.saturating_mul(10).saturating_add((b - b'0') as u16)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE: &[u8] = b"INVITE sip:bob@10.0.0.5 SIP/2.0\r\n\
        Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK776\r\n\
        Call-ID: abc\r\n\
        X-CollateID: call-42\r\n\
        User-Agent: Softphone 1.0\r\n\
        Content-Length: 4\r\n\r\nv=0\n";

    const RINGING: &[u8] = b"SIP/2.0 180 Ringing\r\nCall-ID: abc\r\nServer: PBX 9\r\n\r\n";

    #[test]
    fn test_parse_request() {
        let parsed = SipParser::default().parse(INVITE).unwrap();
        assert_eq!(
            parsed.start,
            StartLine::Request {
                method: b"INVITE",
                uri: b"sip:bob@10.0.0.5",
                version: b"SIP/2.0",
            }
        );
        assert_eq!(parsed.call_id, b"abc");
        assert_eq!(parsed.collate_id, Some(&b"call-42"[..]));
        assert_eq!(parsed.agent, Some(&b"Softphone 1.0"[..]));
        assert_eq!(parsed.agent_kind, AgentKind::Agent);
        assert_eq!(parsed.body, Some(&b"v=0\n"[..]));
        assert!(parsed.is_method(b"invite"));
        assert_eq!(parsed.collation(), "call-42");
    }

    #[test]
    fn test_parse_response_flips_direction() {
        let parsed = SipParser::default().parse(RINGING).unwrap();
        assert_eq!(parsed.status(), Some(180));
        assert_eq!(parsed.agent_kind, AgentKind::Server);
        assert_eq!(parsed.collate_id, None);
        assert_eq!(parsed.collation(), "abc");
        assert!(parsed.effective_incoming(false));
        assert!(!parsed.effective_incoming(true));
    }

    #[test]
    fn test_reason_is_third_token() {
        let parsed = SipParser::default()
            .parse(b"SIP/2.0 183 Session Progress\r\nCall-ID: x\r\n\r\n")
            .unwrap();
        match parsed.start {
            StartLine::Response { reason, .. } => assert_eq!(reason, b"Session"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reject_non_sip() {
        let parser = SipParser::default();
        assert!(matches!(parser.parse(b""), Err(SpycraftError::Malformed { .. })));
        assert!(matches!(
            parser.parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            Err(SpycraftError::Malformed { .. })
        ));
        // a single line is not enough
        assert!(matches!(
            parser.parse(b"INVITE sip:x SIP/2.0\r\n\r\n"),
            Err(SpycraftError::Malformed { .. })
        ));
        assert!(matches!(
            parser.parse(b"INVITE sip:x\r\nCall-ID: a\r\n\r\n"),
            Err(SpycraftError::Malformed { .. })
        ));
    }

    #[test]
    fn test_reject_oversized_header_block() {
        let mut payload = b"OPTIONS sip:x SIP/2.0\r\nCall-ID: a\r\n".to_vec();
        for i in 0..MAX_HEADER_LINES {
            payload.extend_from_slice(format!("X-Filler-{}: y\r\n", i).as_bytes());
        }
        payload.extend_from_slice(b"\r\n");
        let err = SipParser::default().parse(&payload).unwrap_err();
        assert!(matches!(err, SpycraftError::Capacity { .. }));
        assert!(err.is_silent());
    }

    #[test]
    fn test_missing_call_id() {
        let err = SipParser::default()
            .parse(b"OPTIONS sip:x SIP/2.0\r\nVia: y\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, SpycraftError::MissingCallId));
    }

    #[test]
    fn test_invalid_status() {
        let parser = SipParser::default();
        for bad in [&b"SIP/2.0 2x0 OK"[..], b"SIP/2.0 +200 OK", b"SIP/2.0 -1 OK"] {
            let mut payload = bad.to_vec();
            payload.extend_from_slice(b"\r\nCall-ID: a\r\n\r\n");
            let err = parser.parse(&payload).unwrap_err();
            assert!(matches!(err, SpycraftError::InvalidStatus { .. }));
            assert!(!err.is_silent());
        }
        // Call-ID is checked before the status
        assert!(matches!(
            parser.parse(b"SIP/2.0 2x0 OK\r\nVia: y\r\n\r\n"),
            Err(SpycraftError::MissingCallId)
        ));
    }

    #[test]
    fn test_oversized_status_saturates() {
        let parser = SipParser::default();
        let parsed = parser.parse(b"SIP/2.0 99999 Odd\r\nCall-ID: a\r\n\r\n").unwrap();
        assert_eq!(parsed.status(), Some(u16::MAX));
        let parsed = parser.parse(b"SIP/2.0 0800 Odd\r\nCall-ID: a\r\n\r\n").unwrap();
        assert_eq!(parsed.status(), Some(800));
    }

    #[test]
    fn test_custom_collate_header() {
        let parser = SipParser::new("x-bridge");
        let parsed = parser
            .parse(b"BYE sip:x SIP/2.0\r\nCall-ID: a\r\nX-Bridge: b1\r\nX-CollateID: c\r\n\r\n")
            .unwrap();
        assert_eq!(parsed.collate_id, Some(&b"b1"[..]));
    }
}
