//! Stream reassembly for SIP carried over byte streams
//!
//! A stream transport may split one SIP message across several segments or
//! pack several messages into one. [`StreamAssembler`] buffers the bytes of
//! one flow and hands back complete messages as they become available,
//! framed by the end-of-headers marker plus Content-Length.

use crate::scanner::{find, parse_content_length};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::hash::Hash;

const END_OF_HEADERS: &[u8] = b"\r\n\r\n";

/// Locate one complete SIP message at the start of `data`
///
/// Returns `None` while the headers or the declared body are incomplete.
pub fn extract_sip_message(data: &[u8]) -> Option<&[u8]> {
    let header_end = find(data, END_OF_HEADERS)?;
    let headers = &data[..header_end + END_OF_HEADERS.len()];
    // a declared length past the address space never completes
    let total_len = headers.len().checked_add(parse_content_length(headers))?;
    if data.len() < total_len {
        return None;
    }
    Some(&data[..total_len])
}

/// Incremental message assembler for a single flow
#[derive(Debug, Default)]
pub struct StreamAssembler {
    buf: BytesMut,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly delivered bytes
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next complete message off the front of the buffer
    pub fn next_message(&mut self) -> Option<Bytes> {
        let len = extract_sip_message(&self.buf)?.len();
        Some(self.buf.split_to(len).freeze())
    }

    /// Append bytes and collect every message they complete
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.feed(data);
        std::iter::from_fn(|| self.next_message()).collect()
    }

    /// Bytes waiting for the rest of their message
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Per-flow assemblers keyed by any flow identifier
#[derive(Debug)]
pub struct StreamReassembler<K> {
    flows: HashMap<K, StreamAssembler>,
}

impl<K: Eq + Hash> StreamReassembler<K> {
    pub fn new() -> Self {
        Self {
            flows: HashMap::new(),
        }
    }

    /// Deliver bytes for `flow` and collect completed messages
    pub fn deliver(&mut self, flow: K, data: &[u8]) -> Vec<Bytes> {
        self.flows.entry(flow).or_default().push(data)
    }

    /// Forget a flow, returning how many bytes were still pending
    pub fn close(&mut self, flow: &K) -> usize {
        self.flows.remove(flow).map_or(0, |assembler| assembler.pending())
    }

    /// Number of flows currently tracked
    pub fn flows(&self) -> usize {
        self.flows.len()
    }
}

impl<K: Eq + Hash> Default for StreamReassembler<K> {
    fn default() -> Self {
        Self::new()
    }
}
