//! The capability lifecycle. Every capability is a set of phase overrides on
//! a shared driver: parse the raw trigger, observe, probe, do the work,
//! delegate, clean up. Failures never escape a phase as errors; they are
//! recorded on the outcome and the driver decides what still runs.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use lumen_core::envelope::{Outcome, Trigger};
use lumen_core::errors::FaultKind;

/// Lifecycle phases, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WarmUp,
    Introspect,
    Explore,
    Execute,
    CoordinateSubordinates,
    CoolDown,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::WarmUp,
        Phase::Introspect,
        Phase::Explore,
        Phase::Execute,
        Phase::CoordinateSubordinates,
        Phase::CoolDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WarmUp => "warm_up",
            Self::Introspect => "introspect",
            Self::Explore => "explore",
            Self::Execute => "execute",
            Self::CoordinateSubordinates => "coordinate_subordinates",
            Self::CoolDown => "cool_down",
        }
    }
}

/// A capability. Implementors override `execute` and whichever other phases
/// they need; `act` drives the whole lifecycle and is not meant to be
/// overridden.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Capability name for logs.
    fn name(&self) -> &str;

    /// Parse a raw attribute map into the envelope pair. The default rejects
    /// malformed maps and blank content before any side effect happens.
    fn warm_up(&self, attrs: Value) -> Outcome {
        let trigger = match Trigger::from_attrs(attrs) {
            Ok(trigger) => trigger,
            Err(message) => {
                return Outcome::failed(Trigger::default(), FaultKind::Validation, message)
            }
        };
        if trigger.content.trim().is_empty() {
            return Outcome::failed(trigger, FaultKind::Validation, "trigger content is empty");
        }
        Outcome::new(trigger)
    }

    /// Observation hook. Runs before any side effect.
    async fn introspect(&self, _outcome: &mut Outcome) {}

    /// Environment probing hook.
    async fn explore(&self, _outcome: &mut Outcome) {}

    /// The side-effecting phase.
    async fn execute(&self, outcome: &mut Outcome);

    /// Delegation hook for composite capabilities.
    async fn coordinate_subordinates(&self, _outcome: &mut Outcome) {}

    /// Cleanup hook. Runs regardless of earlier failures.
    async fn cool_down(&self, _outcome: &mut Outcome) {}

    /// Drive the full lifecycle over a raw attribute map.
    ///
    /// A warm-up rejection skips `execute` and `coordinate_subordinates`;
    /// the observation and cleanup phases still run.
    async fn act(&self, attrs: Value) -> Outcome {
        debug!(agent = self.name(), phase = Phase::WarmUp.as_str(), "phase");
        let mut outcome = self.warm_up(attrs);
        let validated = outcome.success;
        if !validated {
            warn!(
                agent = self.name(),
                error = %outcome.error_message,
                "warm-up rejected trigger"
            );
        }

        debug!(agent = self.name(), phase = Phase::Introspect.as_str(), "phase");
        self.introspect(&mut outcome).await;
        debug!(agent = self.name(), phase = Phase::Explore.as_str(), "phase");
        self.explore(&mut outcome).await;

        if validated {
            debug!(agent = self.name(), phase = Phase::Execute.as_str(), "phase");
            self.execute(&mut outcome).await;
            debug!(agent = self.name(), phase = Phase::CoordinateSubordinates.as_str(), "phase");
            self.coordinate_subordinates(&mut outcome).await;
        }

        debug!(agent = self.name(), phase = Phase::CoolDown.as_str(), "phase");
        self.cool_down(&mut outcome).await;
        outcome
    }
}
