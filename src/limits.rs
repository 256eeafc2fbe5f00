//! Capacities and protocol constants for spycraft
//!
//! The split capacities bound per-message work and double as the
//! rejection thresholds for pathological input.

/// Sections of a datagram: headers and optional body
pub const MAX_SECTIONS: usize = 2;

/// Maximum number of header lines (start line included)
pub const MAX_HEADER_LINES: usize = 64;

/// Fields of a request or status line
pub const START_LINE_FIELDS: usize = 3;

/// Responses at or above this status are out of range
pub const STATUS_OUT_OF_RANGE: u16 = 800;

/// Remotely initiated legs collate on the first response at or above this
pub const STATUS_COLLATE: u16 = 180;

/// Default capture stage queue capacity
pub const DEFAULT_CAPTURE_QUEUE: usize = 32;

/// Default offline scan queue capacity
pub const DEFAULT_SCAN_QUEUE: usize = 128;

/// Default message stage queue capacity
pub const DEFAULT_MESSAGE_QUEUE: usize = 128;

/// Default SIP signaling port
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// Default capture snapshot length
pub const DEFAULT_SNAPSHOT: u32 = 1600;

/// Seconds a finished leg stays resident before it is reaped
pub const DEFAULT_LEG_LINGER_SECS: u64 = 300;

/// Longest accepted linger, ten years
pub const MAX_LEG_LINGER_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Default collation hint header
pub const DEFAULT_COLLATE_HEADER: &str = "x-collateid";
