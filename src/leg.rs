//! Call leg records
//!
//! A [`Leg`] is one observed dialog from the monitored endpoint's point of
//! view, keyed by remote address, remote port and Call-ID.

use crate::limits::{STATUS_COLLATE, STATUS_OUT_OF_RANGE};
use crate::packet::Timestamp;
use crate::parser::ParsedHeaders;
use crate::scanner::match_keyword;
use std::fmt;
use std::net::IpAddr;
use strum_macros::{Display, EnumString};

/// Per-side call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum CallState {
    Invite,
    ReInvite,
    Joined,
    Bye,
    Hold,
    Xfer,
    Ring,
    Answer,
    Active,
    Failed,
}

/// One side's view of a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    pub request: CallState,
    /// Last response status observed, 0 until one arrives
    pub status: u16,
    pub updated: Timestamp,
}

impl State {
    pub fn new(request: CallState, updated: Timestamp) -> Self {
        Self {
            request,
            status: 0,
            updated,
        }
    }
}

/// Index into [`Leg::states`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Side {
    Local = 0,
    Remote = 1,
}

impl Side {
    /// Side an event concerns given its effective direction
    pub fn for_direction(effective_incoming: bool) -> Self {
        if effective_incoming {
            Side::Remote
        } else {
            Side::Local
        }
    }
}

/// Handler route for a correlated event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Dispatch {
    /// 700 and above
    Extended,
    GlobalFailure,
    ServerError,
    ClientError,
    Redirect,
    Success,
    Provisional,
    Invite,
    /// BYE or CANCEL
    Terminate,
    Ack,
    Refer,
    Other,
}

impl Dispatch {
    /// Route a message by status band, then by method
    pub fn route(parsed: &ParsedHeaders<'_>) -> Self {
        if let Some(status) = parsed.status() {
            match status {
                700..=u16::MAX => return Dispatch::Extended,
                600..=699 => return Dispatch::GlobalFailure,
                500..=599 => return Dispatch::ServerError,
                400..=499 => return Dispatch::ClientError,
                300..=399 => return Dispatch::Redirect,
                200..=299 => return Dispatch::Success,
                100..=199 => return Dispatch::Provisional,
                _ => {}
            }
        }

        let Some(method) = parsed.method() else {
            return Dispatch::Other;
        };
        if match_keyword(method, b"invite") {
            Dispatch::Invite
        } else if match_keyword(method, b"bye") || match_keyword(method, b"cancel") {
            Dispatch::Terminate
        } else if match_keyword(method, b"ack") {
            Dispatch::Ack
        } else if match_keyword(method, b"refer") {
            Dispatch::Refer
        } else {
            Dispatch::Other
        }
    }
}

/// Correlation key: remote address, remote port and Call-ID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LegKey {
    pub endpoint: IpAddr,
    pub port: u16,
    pub call_id: String,
}

impl LegKey {
    pub fn new(endpoint: IpAddr, port: u16, call_id: impl Into<String>) -> Self {
        Self {
            endpoint,
            port,
            call_id: call_id.into(),
        }
    }
}

impl fmt::Display for LegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.endpoint, self.port, self.call_id)
    }
}

/// One observed call dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    /// Shared identifier linking peer legs, assigned at most once
    pub collated: Option<String>,
    pub agent: Option<String>,
    pub endpoint: IpAddr,
    pub port: u16,
    /// Peer initiated the dialog
    pub incoming: bool,
    pub pending: bool,
    pub connected: bool,
    pub final_status: u16,
    /// Local side then remote side
    pub states: [State; 2],
    pub created: Timestamp,
    pub updated: Timestamp,
    pub finished: Option<Timestamp>,
}

impl Leg {
    /// Open a leg from its initiating INVITE
    ///
    /// The initiating side starts at `Invite`, the other at `Active`.
    pub fn open(key: &LegKey, incoming: bool, timestamp: Timestamp) -> Self {
        let (local, remote) = if incoming {
            (CallState::Active, CallState::Invite)
        } else {
            (CallState::Invite, CallState::Active)
        };
        Self {
            collated: None,
            agent: None,
            endpoint: key.endpoint,
            port: key.port,
            incoming,
            pending: false,
            connected: false,
            final_status: 0,
            states: [State::new(local, timestamp), State::new(remote, timestamp)],
            created: timestamp,
            updated: timestamp,
            finished: None,
        }
    }

    pub fn state(&self, side: Side) -> &State {
        &self.states[side as usize]
    }

    /// Assign the collation id unless one is already set
    pub fn collate(&mut self, id: impl Into<String>) -> bool {
        if self.collated.is_some() {
            return false;
        }
        self.collated = Some(id.into());
        true
    }

    /// Fill in the agent unless one is already known
    pub fn backfill_agent(&mut self, agent: Option<&[u8]>) {
        if self.agent.is_none() {
            self.agent = agent.map(|a| String::from_utf8_lossy(a).into_owned());
        }
    }

    /// Record an event against one side
    pub fn record(&mut self, side: Side, status: Option<u16>, timestamp: Timestamp) {
        let state = &mut self.states[side as usize];
        if let Some(status) = status {
            state.status = status;
        }
        state.updated = timestamp;
    }

    /// Stamp the end of the leg; the first stamp is kept
    pub fn finish(&mut self, timestamp: Timestamp) -> bool {
        if self.finished.is_some() {
            return false;
        }
        self.finished = Some(timestamp);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Leg finished at least `linger` before `now`
    pub fn expired(&self, now: Timestamp, linger: chrono::Duration) -> bool {
        self.finished
            .and_then(|finished| finished.checked_add_signed(linger))
            .is_some_and(|deadline| deadline <= now)
    }
}

/// True when a response status may collate a remotely initiated leg
pub fn collates(status: u16) -> bool {
    (STATUS_COLLATE..STATUS_OUT_OF_RANGE).contains(&status)
}
