//! Per-entity classification session: trailing windows, stage chain, logs.
//!
//! # Per frame
//! 1. Reject out-of-order timestamps without touching any buffer
//! 2. Extract features against the trailing windows
//! 3. Append the frame's valid samples to the windows (also for invalid frames)
//! 4. Raw classification -> smoothing -> state machine -> confidence
//! 5. Update statistics, transition log and record log

use crate::{
    confidence::{ConfidenceInput, ConfidenceScorer},
    error::{InvalidInput, StageError},
    features::{FeatureExtractor, FeatureInput, FeatureRecord},
    raw_classifier::{RawClassification, RawClassifier},
    record::{
        ClassificationRecord, FrameQuality, SessionStatistics, StatCounters, Timeline,
        TimelineFrame, TransitionEvent,
    },
    smoother::{SmoothedClassification, SmootherInput, TemporalSmoother},
    stage::Stage,
    state_machine::{StateMachine, TransitionInput, TransitionResult},
    thresholds::ThresholdSet,
    types::{EntityId, FrameInput, MovementState},
};
use std::{collections::VecDeque, fmt::Write as _, ops::RangeInclusive, sync::Arc};
use tracing::{debug, warn};

/// Capacities of the bounded per-session logs.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    pub record_capacity: usize,
    pub transition_log_capacity: usize,
}

/// Intermediate results of one successfully classified frame.
struct Decision {
    features: FeatureRecord,
    raw: RawClassification,
    smoothed: SmoothedClassification,
    transition: TransitionResult,
    confidence: f64,
}

/// Classification state of a single entity.
pub struct Session {
    pub entity: EntityId,
    thresholds: Arc<ThresholdSet>,
    limits: SessionLimits,

    extractor: FeatureExtractor,
    raw: RawClassifier,
    smoother: TemporalSmoother,
    machine: StateMachine,
    scorer: ConfidenceScorer,

    heights: VecDeque<f64>,
    speeds: VecDeque<f64>,
    frames: VecDeque<u64>,
    last_timestamp: Option<f64>,

    records: VecDeque<ClassificationRecord>,
    transitions: VecDeque<TransitionEvent>,
    stats: StatCounters,
}

impl Session {
    pub fn new(
        entity: EntityId,
        thresholds: Arc<ThresholdSet>,
        strict_mode: bool,
        limits: SessionLimits,
    ) -> Self {
        Self {
            entity,
            extractor: FeatureExtractor::new(Arc::clone(&thresholds)),
            raw: RawClassifier::new(Arc::clone(&thresholds)),
            smoother: TemporalSmoother::new(&thresholds),
            machine: StateMachine::new(Arc::clone(&thresholds), strict_mode),
            scorer: ConfidenceScorer::new(Arc::clone(&thresholds)),
            heights: VecDeque::with_capacity(thresholds.silhouette_window),
            speeds: VecDeque::with_capacity(thresholds.window_size),
            frames: VecDeque::with_capacity(thresholds.window_size),
            last_timestamp: None,
            records: VecDeque::new(),
            transitions: VecDeque::new(),
            stats: StatCounters::default(),
            thresholds,
            limits,
        }
    }

    /// Authoritative state.
    pub fn state(&self) -> MovementState {
        self.machine.state()
    }

    pub fn is_strict(&self) -> bool {
        self.machine.is_strict()
    }

    /// Classify one frame. Never fails; invalid input yields a failed record.
    pub fn classify(&mut self, input: &FrameInput) -> ClassificationRecord {
        // ----------------------------------------------------------------
        // Step 1: ordering
        // ----------------------------------------------------------------
        if !input.timestamp.is_finite() {
            warn!(entity = %self.entity, frame = input.frame, "non-finite timestamp");
            return self.failed(input, InvalidInput::NonFiniteSignal);
        }
        if self.last_timestamp.is_some_and(|last| input.timestamp < last) {
            warn!(
                entity = %self.entity,
                frame = input.frame,
                timestamp = input.timestamp,
                "out-of-order frame rejected"
            );
            return self.failed(input, InvalidInput::OutOfOrder);
        }
        self.last_timestamp = Some(input.timestamp);
        self.stats.frame_count += 1;

        // ----------------------------------------------------------------
        // Steps 2-4
        // ----------------------------------------------------------------
        let record = match self.run_stages(input) {
            Ok(decision) => self.accept(decision),
            Err(StageError::InvalidInput(reason)) => {
                warn!(entity = %self.entity, frame = input.frame, %reason, "invalid frame");
                self.stats.invalid_input_frames += 1;
                self.failed(input, reason)
            }
        };

        // ----------------------------------------------------------------
        // Step 5: record log
        // ----------------------------------------------------------------
        push_bounded(&mut self.records, record.clone(), self.limits.record_capacity);
        record
    }

    fn run_stages(&mut self, input: &FrameInput) -> Result<Decision, StageError> {
        let extracted = {
            let prior_heights: &[f64] = self.heights.make_contiguous();
            let prior_speeds: &[f64] = self.speeds.make_contiguous();
            let prior_frames: &[u64] = self.frames.make_contiguous();
            self.extractor.process(FeatureInput {
                entity: self.entity,
                frame: input.frame,
                timestamp: input.timestamp,
                kinematics: input.kinematics,
                silhouette_height: input.silhouette_height,
                prior_heights,
                prior_speeds,
                prior_frames,
            })
        };
        self.push_samples(input);
        let features = extracted?;

        let raw = self.raw.process(&features)?;
        let smoothed = self.smoother.process(SmootherInput {
            state: raw.state,
            confidence: raw.confidence,
            frames_in_state: self.machine.frames_in_state(input.frame),
        })?;
        let transition = self.machine.process(TransitionInput {
            frame: input.frame,
            requested: smoothed.state,
            features: &features,
        })?;
        let confidence = self.scorer.process(ConfidenceInput {
            features: &features,
            raw: &raw,
            smoothed: &smoothed,
            transition: &transition,
        })?;

        Ok(Decision {
            features,
            raw,
            smoothed,
            transition,
            confidence,
        })
    }

    /// Append whatever samples of this frame are usable.
    fn push_samples(&mut self, input: &FrameInput) {
        let prior_window = self.thresholds.window_size.saturating_sub(1).max(1);
        if let Some(h) = input.silhouette_height.filter(|h| h.is_finite() && *h > 0.0) {
            push_bounded(&mut self.heights, h, self.thresholds.silhouette_window);
        }
        if let Some(s) = input.kinematics.speed.filter(|s| s.is_finite() && *s >= 0.0) {
            push_bounded(&mut self.speeds, s, prior_window);
        }
        push_bounded(&mut self.frames, input.frame, prior_window);
    }

    fn accept(&mut self, d: Decision) -> ClassificationRecord {
        let t = &d.transition;
        let reasoning = self.reasoning(&d);

        self.stats.valid_frames += 1;
        self.stats.state_counts.increment(t.state);
        self.stats.confidence_sum += d.confidence;
        if d.confidence < self.thresholds.confidence_threshold_min {
            self.stats.low_confidence_frames += 1;
        }

        if t.changed() || !t.accepted {
            if t.accepted {
                self.stats.valid_transitions += 1;
            } else {
                self.stats.invalid_transitions += 1;
                debug!(
                    entity = %self.entity,
                    frame = d.features.frame,
                    from = %t.from,
                    requested = %t.requested,
                    reason = ?t.reason,
                    "transition rejected"
                );
            }
            push_bounded(
                &mut self.transitions,
                TransitionEvent {
                    frame: d.features.frame,
                    timestamp: d.features.timestamp,
                    from: t.from,
                    requested: t.requested,
                    to: t.state,
                    accepted: t.accepted,
                    reason: t.reason,
                    note: t.note,
                },
                self.limits.transition_log_capacity,
            );
        }

        ClassificationRecord {
            entity: self.entity,
            frame: d.features.frame,
            timestamp: d.features.timestamp,
            raw_state: Some(d.raw.state),
            smoothed_state: Some(d.smoothed.state),
            state: t.state,
            confidence: d.confidence,
            reasoning,
            quality: FrameQuality::Valid,
            transition_accepted: t.accepted,
            reject_reason: t.reason,
            note: t.note,
            features: Some(d.features),
        }
    }

    fn failed(&self, input: &FrameInput, reason: InvalidInput) -> ClassificationRecord {
        ClassificationRecord::failed(
            self.entity,
            input.frame,
            input.timestamp,
            self.machine.state(),
            reason,
        )
    }

    /// Human-readable decision chain for one frame.
    fn reasoning(&self, d: &Decision) -> String {
        let f = &d.features;
        let t = &d.transition;
        let mut s = format!(
            "speed={:.2} m/s (smoothed {:.2}), accel={:+.2} m/s², bbox_change={:+.3}",
            f.speed, f.speed_smoothed, f.acceleration, f.bbox_height_change
        );
        let _ = write!(
            s,
            " | raw={} ({}, {:.2}) | smoothed={} (agreement {:.2})",
            d.raw.state,
            d.raw.rule.as_str(),
            d.raw.confidence,
            d.smoothed.state,
            d.smoothed.agreement
        );
        if d.smoothed.early {
            s.push_str(" [early]");
        }
        match t.reason {
            None if t.changed() => {
                let _ = write!(s, " | fsm={} -> {} accepted", t.from, t.state);
            }
            None => {
                let _ = write!(s, " | fsm={} held", t.state);
            }
            Some(reason) => {
                let _ = write!(
                    s,
                    " | fsm={} -> {} rejected ({reason})",
                    t.from, t.requested
                );
            }
        }
        if let Some(note) = t.note {
            let _ = write!(s, " [{}]", note.as_str());
        }
        let _ = write!(s, " | {} frames in state", t.frames_in_state);
        s
    }

    pub fn statistics(&self) -> SessionStatistics {
        self.stats.snapshot(self.entity, self.machine.state())
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ClassificationRecord> {
        self.records.iter()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TransitionEvent> {
        self.transitions.iter()
    }

    pub fn timeline(&self, range: RangeInclusive<u64>) -> Timeline {
        Timeline {
            entity: self.entity,
            preset: self.thresholds.preset,
            strict_mode: self.machine.is_strict(),
            frames: self
                .records
                .iter()
                .filter(|r| range.contains(&r.frame))
                .map(|r| TimelineFrame {
                    frame: r.frame,
                    timestamp: r.timestamp,
                    state: r.state,
                    confidence: r.confidence,
                    valid: r.is_valid(),
                })
                .collect(),
            transitions: self
                .transitions
                .iter()
                .filter(|e| range.contains(&e.frame))
                .copied()
                .collect(),
            statistics: self.statistics(),
        }
    }

    /// Back to the freshly created state: `Idle`, empty windows and logs.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.machine.reset();
        self.heights.clear();
        self.speeds.clear();
        self.frames.clear();
        self.last_timestamp = None;
        self.records.clear();
        self.transitions.clear();
        self.stats = StatCounters::default();
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, value: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while buf.len() >= capacity {
        buf.pop_front();
    }
    buf.push_back(value);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
