//! Spycraft - SIP call leg tracing
//!
//! Reconstructs SIP call legs from captured UDP traffic for one monitored
//! host and port. Payloads are scanned without per-packet allocation,
//! correlated into legs by remote endpoint and Call-ID, and collated with
//! their peer legs.
//!
//! Data flows leaf-first through [`scanner`], [`parser`] and [`classifier`]
//! into the [`engine`]; [`pipeline`] wires them together behind bounded
//! queues.

pub mod census;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod leg;
pub mod limits;
pub mod logging;
pub mod packet;
pub mod parser;
pub mod pipeline;
pub mod scanner;
pub mod source;

pub use census::{scan_files, StackCensus, StackInfo};
pub use classifier::{ApplicationMessage, Classifier};
pub use config::{Config, Endpoint};
pub use engine::{DropReason, EngineStats, LegEngine, Outcome};
pub use error::{SpycraftError, SpycraftResult};
pub use extractor::{extract_sip_message, StreamAssembler, StreamReassembler};
pub use leg::{CallState, Dispatch, Leg, LegKey, Side, State};
pub use packet::{DecodedPacket, LinkType, Timestamp};
pub use parser::{AgentKind, ParsedHeaders, SipParser, StartLine};
pub use pipeline::{Envelope, PipelineConfig, PipelineOutput};
pub use source::{PacketSource, PcapFileSource, ReplaySource};
