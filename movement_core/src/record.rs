//! Emitted data: per-frame records, transition events, statistics, timelines.

use crate::{
    error::InvalidInput,
    features::FeatureRecord,
    state_machine::{RejectReason, TransitionNote},
    thresholds::Preset,
    types::{EntityId, MovementState, StateCounts},
};
use serde::{Deserialize, Serialize};

/// Whether a frame made it through feature extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameQuality {
    Valid,
    Invalid(InvalidInput),
}

impl FrameQuality {
    pub fn is_valid(self) -> bool {
        self == FrameQuality::Valid
    }
}

/// Outcome of one frame for one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub entity: EntityId,
    pub frame: u64,
    pub timestamp: f64,
    /// `None` for failed frames
    pub raw_state: Option<MovementState>,
    pub smoothed_state: Option<MovementState>,
    /// Authoritative state after the state machine
    pub state: MovementState,
    pub confidence: f64,
    pub reasoning: String,
    pub features: Option<FeatureRecord>,
    pub quality: FrameQuality,
    pub transition_accepted: bool,
    pub reject_reason: Option<RejectReason>,
    pub note: Option<TransitionNote>,
}

impl ClassificationRecord {
    /// Record for a frame that never reached the classifier.
    pub fn failed(
        entity: EntityId,
        frame: u64,
        timestamp: f64,
        state: MovementState,
        reason: InvalidInput,
    ) -> Self {
        Self {
            entity,
            frame,
            timestamp,
            raw_state: None,
            smoothed_state: None,
            state,
            confidence: 0.0,
            reasoning: format!("invalid input: {reason}; holding {state}"),
            features: None,
            quality: FrameQuality::Invalid(reason),
            transition_accepted: false,
            reject_reason: None,
            note: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.quality.is_valid()
    }
}

/// A transition attempt that changed the state or was refused.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub frame: u64,
    pub timestamp: f64,
    pub from: MovementState,
    pub requested: MovementState,
    pub to: MovementState,
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub note: Option<TransitionNote>,
}

/// Running per-session counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub entity: EntityId,
    pub frame_count: u64,
    pub valid_frames: u64,
    pub invalid_input_frames: u64,
    /// Accepted state changes
    pub valid_transitions: u64,
    /// Refused requests
    pub invalid_transitions: u64,
    /// `valid_transitions / (valid_transitions + invalid_transitions)`;
    /// the denominator is transition attempts, not frames
    pub valid_transition_rate: f64,
    /// `invalid_transitions` over the same attempt count
    pub invalid_transition_rate: f64,
    /// Valid frames per authoritative state
    pub state_counts: StateCounts,
    pub low_confidence_frames: u64,
    /// Over valid frames
    pub low_confidence_rate: f64,
    pub mean_confidence: f64,
    pub current_state: MovementState,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct StatCounters {
    pub frame_count: u64,
    pub valid_frames: u64,
    pub invalid_input_frames: u64,
    pub valid_transitions: u64,
    pub invalid_transitions: u64,
    pub state_counts: StateCounts,
    pub low_confidence_frames: u64,
    pub confidence_sum: f64,
}

impl StatCounters {
    pub fn snapshot(&self, entity: EntityId, current_state: MovementState) -> SessionStatistics {
        let attempts = self.valid_transitions + self.invalid_transitions;
        let ratio = |n: u64, d: u64| if d == 0 { 0.0 } else { n as f64 / d as f64 };
        SessionStatistics {
            entity,
            frame_count: self.frame_count,
            valid_frames: self.valid_frames,
            invalid_input_frames: self.invalid_input_frames,
            valid_transitions: self.valid_transitions,
            invalid_transitions: self.invalid_transitions,
            valid_transition_rate: ratio(self.valid_transitions, attempts),
            invalid_transition_rate: ratio(self.invalid_transitions, attempts),
            state_counts: self.state_counts,
            low_confidence_frames: self.low_confidence_frames,
            low_confidence_rate: ratio(self.low_confidence_frames, self.valid_frames),
            mean_confidence: if self.valid_frames == 0 {
                0.0
            } else {
                self.confidence_sum / self.valid_frames as f64
            },
            current_state,
        }
    }
}

/// One frame of an exported timeline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineFrame {
    pub frame: u64,
    pub timestamp: f64,
    pub state: MovementState,
    pub confidence: f64,
    pub valid: bool,
}

/// Read-only export of a session over a frame range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub entity: EntityId,
    pub preset: Preset,
    pub strict_mode: bool,
    pub frames: Vec<TimelineFrame>,
    pub transitions: Vec<TransitionEvent>,
    pub statistics: SessionStatistics,
}

impl Timeline {
    /// Authoritative states in frame order.
    pub fn states(&self) -> Vec<MovementState> {
        self.frames.iter().map(|f| f.state).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn transition_rates_are_per_attempt() {
        let counters = StatCounters {
            frame_count: 100,
            valid_frames: 90,
            valid_transitions: 3,
            invalid_transitions: 1,
            low_confidence_frames: 9,
            ..Default::default()
        };
        let stats = counters.snapshot(EntityId(1), MovementState::Walking);
        assert_abs_diff_eq!(stats.valid_transition_rate, 0.75);
        assert_abs_diff_eq!(stats.invalid_transition_rate, 0.25);
        assert_abs_diff_eq!(stats.low_confidence_rate, 0.1);
    }

    #[test]
    fn no_attempts_gives_zero_rates() {
        let stats = StatCounters::default().snapshot(EntityId(1), MovementState::Idle);
        assert_eq!(stats.valid_transition_rate, 0.0);
        assert_eq!(stats.invalid_transition_rate, 0.0);
    }
}
