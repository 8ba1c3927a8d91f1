//! Final confidence of an authoritative decision.
//!
//! `score = w_speed · speed_consistency + w_stability · temporal_stability
//!        + w_bbox · bbox_reliability`, then multiplicative penalties.

use crate::{
    error::StageError,
    features::FeatureRecord,
    raw_classifier::RawClassification,
    smoother::SmoothedClassification,
    stage::Stage,
    state_machine::{TransitionNote, TransitionResult},
    thresholds::ThresholdSet,
    types::MovementState,
};
use std::sync::Arc;

const UNSTABLE_SPEED_FACTOR: f64 = 0.8;
const NOISY_SILHOUETTE_FACTOR: f64 = 0.7;
const UNCERTAIN_STATE_FACTOR: f64 = 0.8;
const RELAXED_STOP_FACTOR: f64 = 0.5;

#[derive(Clone, Copy, Debug)]
pub struct ConfidenceInput<'a> {
    pub features: &'a FeatureRecord,
    pub raw: &'a RawClassification,
    pub smoothed: &'a SmoothedClassification,
    pub transition: &'a TransitionResult,
}

#[derive(Clone, Debug)]
pub struct ConfidenceScorer {
    thresholds: Arc<ThresholdSet>,
}

impl ConfidenceScorer {
    pub fn new(thresholds: Arc<ThresholdSet>) -> Self {
        Self { thresholds }
    }

    /// Score in [0, 1]; non-finite intermediate values score 0.
    pub fn score(&self, input: &ConfidenceInput<'_>) -> f64 {
        let t = &self.thresholds;
        let f = input.features;
        let state = input.transition.state;

        let speed_consistency = self.speed_consistency(state, f);
        let temporal_stability = input.smoothed.agreement.clamp(0.0, 1.0);
        let mut bbox_reliability = f.data_quality_score.clamp(0.0, 1.0);
        if matches!(state, MovementState::Jumping | MovementState::Landing)
            && f.bbox_height_noise > t.jump_bbox_shrink_min / 2.0
        {
            bbox_reliability *= NOISY_SILHOUETTE_FACTOR;
        }

        let mut score = t.confidence_speed_weight * speed_consistency
            + t.confidence_stability_weight * temporal_stability
            + t.confidence_bbox_weight * bbox_reliability;

        if state == MovementState::Landing || input.raw.is_fallback() {
            score *= UNCERTAIN_STATE_FACTOR;
        }
        if input.transition.note == Some(TransitionNote::RelaxedStop) {
            score *= RELAXED_STOP_FACTOR;
        }

        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        }
    }

    /// Closeness of the speed to the centre of the state's band.
    fn speed_consistency(&self, state: MovementState, f: &FeatureRecord) -> f64 {
        let (lo, hi) = self.thresholds.speed_band(state);
        let width = hi - lo;
        let centre = (lo + hi) / 2.0;
        let base = if width > 0.0 {
            1.0 - (f.speed - centre).abs() / width
        } else if f.speed == centre {
            1.0
        } else {
            0.0
        };
        let base = base.clamp(0.0, 1.0);
        if f.is_speed_stable {
            base
        } else {
            base * UNSTABLE_SPEED_FACTOR
        }
    }
}

impl<'a> Stage<ConfidenceInput<'a>> for ConfidenceScorer {
    type Out = f64;

    fn process(&mut self, input: ConfidenceInput<'a>) -> Result<f64, StageError> {
        Ok(self.score(&input))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{raw_classifier::RawRule, types::EntityId};
    use approx::assert_abs_diff_eq;

    fn features(speed: f64, stable: bool, quality: f64) -> FeatureRecord {
        FeatureRecord {
            entity: EntityId(0),
            frame: 0,
            timestamp: 0.0,
            speed,
            speed_smoothed: speed,
            acceleration: 0.0,
            has_speed_smoothed: true,
            has_acceleration: true,
            bbox_height: 1.0,
            bbox_height_change: 0.0,
            bbox_height_change_rate: 0.0,
            bbox_height_noise: 0.0,
            speed_std: 0.0,
            speed_max_recent: speed,
            speed_mean_recent: speed,
            is_speed_stable: stable,
            is_accelerating: false,
            is_decelerating: false,
            missing_samples: 0,
            has_outlier: false,
            data_quality_score: quality,
        }
    }

    fn raw(state: MovementState, rule: RawRule) -> RawClassification {
        RawClassification {
            state,
            confidence: 1.0,
            rule,
            triggers: Vec::new(),
        }
    }

    fn smoothed(state: MovementState, agreement: f64) -> SmoothedClassification {
        SmoothedClassification {
            state,
            majority: state,
            votes: [0.0; 5],
            agreement,
            hysteresis_passed: false,
            pending: None,
            early: false,
        }
    }

    fn held(state: MovementState, note: Option<TransitionNote>) -> TransitionResult {
        TransitionResult {
            accepted: true,
            from: state,
            requested: state,
            state,
            reason: None,
            note,
            frames_in_state: 10,
        }
    }

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(Arc::new(ThresholdSet::default()))
    }

    #[test]
    fn ideal_running_frame_scores_one() {
        let f = features(6.0, true, 1.0);
        let r = raw(MovementState::Running, RawRule::RunBand);
        let s = smoothed(MovementState::Running, 1.0);
        let t = held(MovementState::Running, None);
        let c = scorer().score(&ConfidenceInput {
            features: &f,
            raw: &r,
            smoothed: &s,
            transition: &t,
        });
        assert_abs_diff_eq!(c, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn unstable_speed_and_disagreement_lower_the_score() {
        let f = features(6.0, false, 1.0);
        let r = raw(MovementState::Running, RawRule::RunBand);
        let s = smoothed(MovementState::Running, 0.5);
        let t = held(MovementState::Running, None);
        let c = scorer().score(&ConfidenceInput {
            features: &f,
            raw: &r,
            smoothed: &s,
            transition: &t,
        });
        assert_abs_diff_eq!(c, 0.4 * 0.8 + 0.35 * 0.5 + 0.25, epsilon = 1e-12);
    }

    #[test]
    fn relaxed_stop_is_halved() {
        let f = features(0.25, true, 1.0);
        let r = raw(MovementState::Idle, RawRule::IdleBand);
        let s = smoothed(MovementState::Idle, 1.0);
        let t = held(MovementState::Idle, Some(TransitionNote::RelaxedStop));
        let c = scorer().score(&ConfidenceInput {
            features: &f,
            raw: &r,
            smoothed: &s,
            transition: &t,
        });
        assert_abs_diff_eq!(c, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn landing_and_noisy_silhouette_are_penalised() {
        let mut f = features(4.5, true, 1.0);
        f.bbox_height_noise = 0.2;
        let r = raw(MovementState::Running, RawRule::RunBand);
        let s = smoothed(MovementState::Running, 1.0);
        let t = held(MovementState::Landing, None);
        let c = scorer().score(&ConfidenceInput {
            features: &f,
            raw: &r,
            smoothed: &s,
            transition: &t,
        });
        // Landing band is [0, 9], centre 4.5
        let expected = (0.4 + 0.35 + 0.25 * 0.7) * 0.8;
        assert_abs_diff_eq!(c, expected, epsilon = 1e-12);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let r = raw(MovementState::Walking, RawRule::Fallback);
        for speed in [0.0, 0.3, 1.7, 3.1, 8.0, 11.0, 50.0] {
            for quality in [0.0, 0.5, 1.0] {
                for agreement in [0.0, 0.4, 1.0] {
                    let f = features(speed, false, quality);
                    let s = smoothed(MovementState::Walking, agreement);
                    let t = held(MovementState::Walking, None);
                    let c = scorer().score(&ConfidenceInput {
                        features: &f,
                        raw: &r,
                        smoothed: &s,
                        transition: &t,
                    });
                    assert!((0.0..=1.0).contains(&c), "score {c} out of range");
                }
            }
        }
    }

    #[test]
    fn nan_speed_scores_zero_not_nan() {
        let f = features(f64::NAN, true, 1.0);
        let r = raw(MovementState::Idle, RawRule::IdleBand);
        let s = smoothed(MovementState::Idle, 1.0);
        let t = held(MovementState::Idle, None);
        let c = scorer().score(&ConfidenceInput {
            features: &f,
            raw: &r,
            smoothed: &s,
            transition: &t,
        });
        assert!(!c.is_nan());
    }
}
