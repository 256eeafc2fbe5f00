//! Leg correlation engine
//!
//! The engine owns the leg table and is its only writer. Each message is
//! parsed, matched against an existing leg by `(remote address, remote
//! port, Call-ID)` or opens a new one on INVITE, and the outcome is
//! reported back to the caller. Malformed input never escapes as an error:
//! it becomes [`Outcome::Dropped`].
//!
//! Call-state values are only set when a leg opens. Later events are routed
//! through [`Dispatch`] and recorded on the side they concern, but no
//! further transitions are applied.

use crate::classifier::ApplicationMessage;
use crate::leg::{collates, Dispatch, Leg, LegKey, Side};
use crate::limits::{MAX_LEG_LINGER_SECS, STATUS_OUT_OF_RANGE};
use crate::packet::Timestamp;
use crate::parser::{ParsedHeaders, SipParser};
use std::collections::BTreeMap;
use strum_macros::Display;
use tracing::{debug, error, info, trace};

/// Why a message did not reach a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DropReason {
    /// Not a SIP message we correlate (malformed, oversized, no Call-ID)
    NotSip,
    /// Response status that is not a number
    InvalidStatus,
    /// Response status 800 or above
    OutOfRange,
    /// No leg and not an initiating INVITE
    UnknownDialog,
}

/// Result of feeding one message to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Dropped(DropReason),
    Opened {
        key: LegKey,
    },
    Updated {
        key: LegKey,
        dispatch: Dispatch,
        /// Collation id assigned by this message
        collated: bool,
        /// Leg finished by this message
        finished: bool,
    },
}

impl Outcome {
    pub fn key(&self) -> Option<&LegKey> {
        match self {
            Outcome::Dropped(_) => None,
            Outcome::Opened { key } | Outcome::Updated { key, .. } => Some(key),
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Outcome::Dropped(_))
    }
}

/// Running counters for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub messages: u64,
    pub dropped: u64,
    pub opened: u64,
    pub collated: u64,
    pub finished: u64,
    pub reaped: u64,
}

/// Stateful correlator for one monitored endpoint
#[derive(Debug)]
pub struct LegEngine {
    parser: SipParser,
    linger: Option<chrono::Duration>,
    legs: BTreeMap<LegKey, Leg>,
    stats: EngineStats,
    last_reap: Option<Timestamp>,
}

impl Default for LegEngine {
    fn default() -> Self {
        Self::new(SipParser::default(), 0)
    }
}

impl LegEngine {
    /// Create an engine; finished legs are reaped after `linger_secs`,
    /// or kept forever when it is 0. Longer lingers are capped at ten years.
    pub fn new(parser: SipParser, linger_secs: u64) -> Self {
        let linger = (linger_secs > 0)
            .then(|| chrono::Duration::seconds(linger_secs.min(MAX_LEG_LINGER_SECS) as i64));
        Self {
            parser,
            linger,
            legs: BTreeMap::new(),
            stats: EngineStats::default(),
            last_reap: None,
        }
    }

    pub fn parser(&self) -> &SipParser {
        &self.parser
    }

    /// Parse and correlate one message
    pub fn process(&mut self, message: &ApplicationMessage) -> Outcome {
        let parsed = match self.parser.parse(&message.payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.messages += 1;
                self.stats.dropped += 1;
                if e.is_silent() {
                    debug!(
                        "dropping message from {}/{}: {}",
                        message.remote, message.remote_port, e
                    );
                    return Outcome::Dropped(DropReason::NotSip);
                }
                error!("{}/{}: {}", message.remote, message.remote_port, e);
                return Outcome::Dropped(DropReason::InvalidStatus);
            }
        };
        self.correlate(message, &parsed)
    }

    /// Correlate an already parsed message
    pub fn correlate(&mut self, message: &ApplicationMessage, parsed: &ParsedHeaders<'_>) -> Outcome {
        self.stats.messages += 1;
        let status = parsed.status();
        if status.is_some_and(|s| s >= STATUS_OUT_OF_RANGE) {
            debug!("out of range status {:?} from {}", status, message.remote);
            self.stats.dropped += 1;
            return Outcome::Dropped(DropReason::OutOfRange);
        }

        let incoming = parsed.effective_incoming(message.incoming);
        // agent strings are only trusted from the monitored side's sends
        let agent = parsed.agent.filter(|_| message.incoming);
        let key = LegKey::new(message.remote, message.remote_port, parsed.call_id_str());
        let timestamp = message.timestamp;

        let Some(leg) = self.legs.get_mut(&key) else {
            if status.is_some() || !parsed.is_method(b"invite") {
                trace!("no leg for {}", key);
                self.stats.dropped += 1;
                return Outcome::Dropped(DropReason::UnknownDialog);
            }

            let mut leg = Leg::open(&key, incoming, timestamp);
            leg.backfill_agent(agent);
            if incoming {
                info!("incoming leg {}/{} opened", leg.endpoint, leg.port);
            } else {
                leg.collate(parsed.collation());
                self.stats.collated += 1;
                info!(
                    "outgoing leg {}/{} on {}",
                    leg.endpoint,
                    leg.port,
                    leg.collated.as_deref().unwrap_or_default()
                );
            }
            self.legs.insert(key.clone(), leg);
            self.stats.opened += 1;
            return Outcome::Opened { key };
        };

        let mut collated = false;
        if incoming && status.is_some_and(collates) && leg.collate(parsed.collation()) {
            collated = true;
            self.stats.collated += 1;
            info!(
                "incoming leg {}/{} on {}",
                leg.endpoint,
                leg.port,
                leg.collated.as_deref().unwrap_or_default()
            );
        }

        leg.updated = timestamp;
        leg.backfill_agent(agent);

        let side = Side::for_direction(incoming);
        let dispatch = Dispatch::route(parsed);
        debug!("{} event for leg {} on {} side", dispatch, key, side);
        leg.record(side, status, timestamp);

        let mut finished = false;
        if dispatch == Dispatch::Terminate && leg.finish(timestamp) {
            finished = true;
            self.stats.finished += 1;
            if let Some(collated) = &leg.collated {
                info!("ending leg {}/{} on {}", leg.endpoint, leg.port, collated);
            }
        }

        Outcome::Updated {
            key,
            dispatch,
            collated,
            finished,
        }
    }

    /// Remove legs finished at least the linger period before `now`
    pub fn reap(&mut self, now: Timestamp) -> Vec<(LegKey, Leg)> {
        let Some(linger) = self.linger else {
            return Vec::new();
        };
        self.last_reap = Some(now);

        let expired: Vec<LegKey> = self
            .legs
            .iter()
            .filter(|(_, leg)| leg.expired(now, linger))
            .map(|(key, _)| key.clone())
            .collect();
        let reaped: Vec<(LegKey, Leg)> = expired
            .into_iter()
            .filter_map(|key| self.legs.remove_entry(&key))
            .collect();

        for (key, _) in &reaped {
            debug!("reaped leg {}", key);
        }
        self.stats.reaped += reaped.len() as u64;
        reaped
    }

    /// Reap at most once per second of capture time
    pub fn reap_if_due(&mut self, now: Timestamp) -> Vec<(LegKey, Leg)> {
        let due = match self.last_reap {
            Some(last) => now.signed_duration_since(last).num_seconds() >= 1,
            None => true,
        };
        if due {
            self.reap(now)
        } else {
            Vec::new()
        }
    }

    pub fn get(&self, key: &LegKey) -> Option<&Leg> {
        self.legs.get(key)
    }

    /// Legs in key order
    pub fn legs(&self) -> impl Iterator<Item = (&LegKey, &Leg)> {
        self.legs.iter()
    }

    /// Owned copy of the leg table in key order
    pub fn snapshot(&self) -> Vec<(LegKey, Leg)> {
        self.legs
            .iter()
            .map(|(key, leg)| (key.clone(), leg.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }
}
