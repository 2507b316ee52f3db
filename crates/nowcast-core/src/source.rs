//! Source seam and per-tick arbitration.
//!
//! Adapters implement [`TrackSource`] synchronously; async callers wrap
//! probes in their own blocking bridge. Arbitration walks the fixed
//! [`SourceId::PRIORITY`] order, so the outcome is independent of the
//! order sources were registered in.

use std::fmt;

use crate::types::{SourceId, TrackSnapshot};

// ─── Probe error ──────────────────────────────────────────────────

/// A transport-level fault from one source. Arbitration records it and
/// moves on to the next source; it never propagates out of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError {
    pub source: SourceId,
    pub detail: String,
}

impl ProbeError {
    pub fn new(source: SourceId, detail: impl fmt::Display) -> Self {
        Self {
            source,
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} probe failed: {}", self.source, self.detail)
    }
}

impl std::error::Error for ProbeError {}

// ─── Source seam ──────────────────────────────────────────────────

/// One track source. `probe` returns `Ok(None)` for "nothing playing";
/// `Err` is reserved for transport faults (process spawn, HTTP, auth).
pub trait TrackSource: Send + Sync {
    fn id(&self) -> SourceId;
    fn probe(&self) -> Result<Option<TrackSnapshot>, ProbeError>;
}

impl<T: TrackSource + ?Sized> TrackSource for &T {
    fn id(&self) -> SourceId {
        (**self).id()
    }
    fn probe(&self) -> Result<Option<TrackSnapshot>, ProbeError> {
        (**self).probe()
    }
}

impl<T: TrackSource + ?Sized> TrackSource for Box<T> {
    fn id(&self) -> SourceId {
        (**self).id()
    }
    fn probe(&self) -> Result<Option<TrackSnapshot>, ProbeError> {
        (**self).probe()
    }
}

// ─── Arbitration ──────────────────────────────────────────────────

/// Result of one arbitration pass: the winning snapshot, if any, plus
/// every fault that was swallowed along the way (for logging).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArbitrationOutcome {
    pub snapshot: Option<TrackSnapshot>,
    pub failures: Vec<ProbeError>,
}

/// Probe sources strictly in [`SourceId::PRIORITY`] order and return
/// the first snapshot with `is_playing == true`. A failing source is
/// recorded and skipped. Higher-priority sources are never consulted
/// again once a winner is found.
pub fn arbitrate(sources: &[Box<dyn TrackSource>]) -> ArbitrationOutcome {
    let mut outcome = ArbitrationOutcome::default();
    for id in SourceId::PRIORITY {
        let Some(source) = sources.iter().find(|s| s.id() == id) else {
            continue;
        };
        match source.probe() {
            Ok(Some(snapshot)) if snapshot.is_playing => {
                outcome.snapshot = Some(snapshot);
                return outcome;
            }
            Ok(_) => {}
            Err(err) => outcome.failures.push(err),
        }
    }
    outcome
}

// ─── Tests ────────────────────────────────────────────────────────
