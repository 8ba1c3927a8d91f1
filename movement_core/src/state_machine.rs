//! Finite-state machine enforcing physically valid movement transitions.
//!
//! # Transition table
//! ```text
//! Idle     -> Idle, Walking
//! Walking  -> Walking, Idle, Running
//! Running  -> Running, Walking, Jumping   (+ Idle when not strict)
//! Jumping  -> Jumping, Landing
//! Landing  -> Landing, Idle, Walking, Running
//! ```
//!
//! # Evaluation order
//! 1. While `Jumping`: a non-jumping request, a silhouette recovery or the
//!    maximum jump duration turns the request into `Landing`
//! 2. Same state: accepted
//! 3. Table membership; a request rejected by the table on two consecutive
//!    frames moves through the intermediate locomotion state instead
//! 4. `-> Running` needs `speed ≥ run_speed_min`
//! 5. `-> Jumping` needs `bbox_height_change ≤ -jump_bbox_shrink_min`
//! 6. `Jumping -> Landing` needs the minimum jump duration or a recovery signal
//! 7. Locomotion to locomotion needs `min_state_duration_frames`
//! 8. `Landing` held for `landing_max_frames` resolves to the speed band state
//!
//! Durations are frame-index differences, so gaps in the input count.

use crate::{
    error::StageError,
    features::FeatureRecord,
    stage::Stage,
    thresholds::ThresholdSet,
    types::MovementState::{self, *},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Why a requested transition was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InsufficientSpeedForRunning,
    NoJumpBboxSignal,
    InvalidTransitionTable,
    DurationNotElapsed,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::InsufficientSpeedForRunning => "insufficient_speed_for_running",
            RejectReason::NoJumpBboxSignal => "no_jump_bbox_signal",
            RejectReason::InvalidTransitionTable => "invalid_transition_table",
            RejectReason::DurationNotElapsed => "duration_not_elapsed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-initiated adjustments to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionNote {
    /// A jump ended and the request was rewritten to `Landing`
    LandingSynthesized,
    /// The jump hit `jump_max_duration_frames`
    LandingForced,
    /// Routed through an intermediate locomotion state
    Bridged,
    /// `Landing` resolved to the speed band state after `landing_max_frames`
    LandingTimeout,
    /// `Running -> Idle` accepted outside strict mode
    RelaxedStop,
}

impl TransitionNote {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionNote::LandingSynthesized => "landing_synthesized",
            TransitionNote::LandingForced => "landing_forced",
            TransitionNote::Bridged => "bridged",
            TransitionNote::LandingTimeout => "landing_timeout",
            TransitionNote::RelaxedStop => "relaxed_stop",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub accepted: bool,
    pub from: MovementState,
    /// State requested by the smoother
    pub requested: MovementState,
    /// Authoritative state after evaluation
    pub state: MovementState,
    pub reason: Option<RejectReason>,
    pub note: Option<TransitionNote>,
    /// Frames spent in `state`, 0 right after a change
    pub frames_in_state: u64,
}

impl TransitionResult {
    pub fn changed(&self) -> bool {
        self.state != self.from
    }
}

/// One row of the exported transition table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub from: MovementState,
    pub to: Vec<MovementState>,
}

/// Whether `from -> to` is an edge of the transition table.
pub fn allows(from: MovementState, to: MovementState, strict: bool) -> bool {
    if from == to {
        return true;
    }
    match from {
        Idle => to == Walking,
        Walking => matches!(to, Idle | Running),
        Running => matches!(to, Walking | Jumping) || (!strict && to == Idle),
        Jumping => to == Landing,
        Landing => to.is_locomotion(),
    }
}

/// Full table in state order, self-loops included.
pub fn transition_table(strict: bool) -> Vec<TableRow> {
    MovementState::ALL
        .iter()
        .map(|&from| TableRow {
            from,
            to: MovementState::ALL
                .iter()
                .copied()
                .filter(|&to| allows(from, to, strict))
                .collect(),
        })
        .collect()
}

/// Intermediate state linking two locomotion states the table keeps apart.
fn bridge(from: MovementState, to: MovementState) -> Option<MovementState> {
    match (from, to) {
        (Running, Idle) | (Idle, Running) => Some(Walking),
        _ => None,
    }
}

/// Input for one evaluation.
#[derive(Clone, Copy, Debug)]
pub struct TransitionInput<'a> {
    pub frame: u64,
    pub requested: MovementState,
    pub features: &'a FeatureRecord,
}

#[derive(Clone, Debug)]
pub struct StateMachine {
    thresholds: Arc<ThresholdSet>,
    strict: bool,
    state: MovementState,
    entered_frame: Option<u64>,
    /// Request refused by the table on the previous evaluation
    last_table_miss: Option<MovementState>,
}

impl StateMachine {
    pub fn new(thresholds: Arc<ThresholdSet>, strict: bool) -> Self {
        Self {
            thresholds,
            strict,
            state: Idle,
            entered_frame: None,
            last_table_miss: None,
        }
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Frames the current state has been held as of `frame`.
    pub fn frames_in_state(&self, frame: u64) -> u64 {
        self.entered_frame
            .map_or(0, |entered| frame.saturating_sub(entered))
    }

    pub fn reset(&mut self) {
        self.state = Idle;
        self.entered_frame = None;
        self.last_table_miss = None;
    }

    pub fn evaluate(&mut self, input: TransitionInput<'_>) -> TransitionResult {
        let t = Arc::clone(&self.thresholds);
        let f = input.features;
        let from = self.state;
        let entered = *self.entered_frame.get_or_insert(input.frame);
        let held = input.frame.saturating_sub(entered);
        let recovery = f.bbox_height_change >= t.jump_bbox_grow_min
            || f.bbox_height_change_rate >= t.jump_bbox_grow_min;

        // ----------------------------------------------------------------
        // Rule 1: jump exit
        // ----------------------------------------------------------------
        let mut request = input.requested;
        let mut note = None;
        let mut forced = false;
        if from == Jumping {
            if held >= u64::from(t.jump_max_duration_frames) {
                request = Landing;
                note = Some(TransitionNote::LandingForced);
                forced = true;
            } else if request != Jumping || recovery {
                if request != Landing {
                    note = Some(TransitionNote::LandingSynthesized);
                }
                request = Landing;
            }
        }

        // ----------------------------------------------------------------
        // Rules 2-7
        // ----------------------------------------------------------------
        let mut table_miss = None;
        let outcome = if request == from {
            Ok(from)
        } else {
            let target = if allows(from, request, self.strict) {
                Some(request)
            } else {
                table_miss = Some(request);
                match bridge(from, request) {
                    Some(via) if self.last_table_miss == Some(request) => {
                        note = Some(TransitionNote::Bridged);
                        Some(via)
                    }
                    _ => None,
                }
            };
            match target {
                None => Err(RejectReason::InvalidTransitionTable),
                Some(target) => self.check(from, target, held, f, forced || recovery),
            }
        };
        self.last_table_miss = table_miss;

        let (mut state, mut reason) = match outcome {
            Ok(state) => (state, None),
            Err(reason) => {
                if note != Some(TransitionNote::LandingForced) {
                    note = None;
                }
                (from, Some(reason))
            }
        };

        // ----------------------------------------------------------------
        // Rule 8: unresolved landing
        // ----------------------------------------------------------------
        if from == Landing && state == Landing && held >= u64::from(t.landing_max_frames) {
            state = t.locomotion_for_speed(f.speed);
            reason = None;
            note = Some(TransitionNote::LandingTimeout);
        }

        if !self.strict && from == Running && state == Idle {
            note = Some(TransitionNote::RelaxedStop);
        }

        let frames_in_state = if state != from {
            self.state = state;
            self.entered_frame = Some(input.frame);
            0
        } else {
            held
        };

        TransitionResult {
            accepted: reason.is_none(),
            from,
            requested: input.requested,
            state,
            reason,
            note,
            frames_in_state,
        }
    }

    /// Rules 4-7 for a table-valid target.
    fn check(
        &self,
        from: MovementState,
        target: MovementState,
        held: u64,
        f: &FeatureRecord,
        landing_signal: bool,
    ) -> Result<MovementState, RejectReason> {
        let t = &self.thresholds;
        if target == Running && f.speed < t.run_speed_min {
            return Err(RejectReason::InsufficientSpeedForRunning);
        }
        if target == Jumping && f.bbox_height_change > -t.jump_bbox_shrink_min {
            return Err(RejectReason::NoJumpBboxSignal);
        }
        if from == Jumping
            && target == Landing
            && !landing_signal
            && held < u64::from(t.jump_min_duration_frames)
        {
            return Err(RejectReason::DurationNotElapsed);
        }
        if from.is_locomotion()
            && target.is_locomotion()
            && held < u64::from(t.min_state_duration_frames)
        {
            return Err(RejectReason::DurationNotElapsed);
        }
        Ok(target)
    }
}

impl<'a> Stage<TransitionInput<'a>> for StateMachine {
    type Out = TransitionResult;

    fn process(&mut self, input: TransitionInput<'a>) -> Result<TransitionResult, StageError> {
        Ok(self.evaluate(input))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
