//! History-free, threshold-based classification of a single feature record.
//!
//! Rules are evaluated in order and the first match wins:
//! 1. Jump    — silhouette shrank by at least `jump_bbox_shrink_min` while moving
//! 2. Running — `speed ≥ run_speed_min`
//! 3. Walking — `walk_speed_min ≤ speed < run_speed_min`
//! 4. Idle    — `speed < idle_speed_max`
//! 5. Fallback — nearest adjacent band, confidence halved
//!
//! Confidence grows linearly with the distance past the boundary that fired,
//! reaching 1.0 one scale unit past it.

use crate::{
    error::StageError,
    features::FeatureRecord,
    stage::Stage,
    thresholds::ThresholdSet,
    types::MovementState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which rule produced a raw classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawRule {
    Jump,
    RunBand,
    WalkBand,
    IdleBand,
    Fallback,
}

impl RawRule {
    pub fn as_str(self) -> &'static str {
        match self {
            RawRule::Jump => "jump",
            RawRule::RunBand => "run_band",
            RawRule::WalkBand => "walk_band",
            RawRule::IdleBand => "idle_band",
            RawRule::Fallback => "fallback",
        }
    }
}

/// Feature a trigger refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerFeature {
    Speed,
    BboxHeightChange,
}

/// One feature value compared against one bound.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub feature: TriggerFeature,
    pub value: f64,
    pub bound: f64,
}

impl Trigger {
    fn speed(value: f64, bound: f64) -> Self {
        Self {
            feature: TriggerFeature::Speed,
            value,
            bound,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawClassification {
    /// Never `Landing`; landing is inferred by the state machine
    pub state: MovementState,
    pub confidence: f64,
    pub rule: RawRule,
    pub triggers: Vec<Trigger>,
}

impl RawClassification {
    pub fn is_fallback(&self) -> bool {
        self.rule == RawRule::Fallback
    }
}

#[derive(Clone, Debug)]
pub struct RawClassifier {
    thresholds: Arc<ThresholdSet>,
}

impl RawClassifier {
    pub fn new(thresholds: Arc<ThresholdSet>) -> Self {
        Self { thresholds }
    }

    pub fn classify(&self, f: &FeatureRecord) -> RawClassification {
        let t = &self.thresholds;
        let speed = f.speed;
        let margin = t.hysteresis_margin;

        // Rule 1: jump
        let shrink_bound = -t.jump_bbox_shrink_min;
        if f.bbox_height_change <= shrink_bound && speed >= t.jump_speed_min {
            return RawClassification {
                state: MovementState::Jumping,
                confidence: boundary_confidence(
                    shrink_bound - f.bbox_height_change,
                    t.jump_bbox_shrink_min / 2.0,
                ),
                rule: RawRule::Jump,
                triggers: vec![
                    Trigger {
                        feature: TriggerFeature::BboxHeightChange,
                        value: f.bbox_height_change,
                        bound: shrink_bound,
                    },
                    Trigger::speed(speed, t.jump_speed_min),
                ],
            };
        }

        // Rule 2: running
        if speed >= t.run_speed_min {
            return RawClassification {
                state: MovementState::Running,
                confidence: boundary_confidence(speed - t.run_speed_min, margin),
                rule: RawRule::RunBand,
                triggers: vec![Trigger::speed(speed, t.run_speed_min)],
            };
        }

        // Rule 3: walking, scored against the closer of its two boundaries
        if speed >= t.walk_speed_min {
            let to_floor = speed - t.walk_speed_min;
            let to_ceiling = t.run_speed_min - speed;
            let (distance, bound) = if to_floor <= to_ceiling {
                (to_floor, t.walk_speed_min)
            } else {
                (to_ceiling, t.run_speed_min)
            };
            return RawClassification {
                state: MovementState::Walking,
                confidence: boundary_confidence(distance, margin),
                rule: RawRule::WalkBand,
                triggers: vec![Trigger::speed(speed, bound)],
            };
        }

        // Rule 4: idle
        if speed < t.idle_speed_max {
            return RawClassification {
                state: MovementState::Idle,
                confidence: boundary_confidence(t.idle_speed_max - speed, margin),
                rule: RawRule::IdleBand,
                triggers: vec![Trigger::speed(speed, t.idle_speed_max)],
            };
        }

        // Rule 5: speed fell in the gap between the idle and walking bands
        let above_idle = speed - t.idle_speed_max;
        let below_walk = t.walk_speed_min - speed;
        let (state, distance, bound) = if above_idle < below_walk {
            (MovementState::Idle, above_idle, t.idle_speed_max)
        } else {
            (MovementState::Walking, below_walk, t.walk_speed_min)
        };
        RawClassification {
            state,
            confidence: 0.5 * boundary_confidence(-distance, margin),
            rule: RawRule::Fallback,
            triggers: vec![Trigger::speed(speed, bound)],
        }
    }
}

impl<'a> Stage<&'a FeatureRecord> for RawClassifier {
    type Out = RawClassification;

    fn process(&mut self, input: &'a FeatureRecord) -> Result<RawClassification, StageError> {
        Ok(self.classify(input))
    }
}

/// `0.5 + 0.5 · distance / scale`, clamped to [0, 1].
///
/// A signed distance: negative values lie on the wrong side of the boundary.
fn boundary_confidence(distance: f64, scale: f64) -> f64 {
    let c = if scale > 0.0 {
        0.5 + 0.5 * distance / scale
    } else if distance > 0.0 {
        1.0
    } else if distance < 0.0 {
        0.0
    } else {
        0.5
    };
    c.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityId;
    use approx::assert_abs_diff_eq;

    fn record(speed: f64, bbox_change: f64) -> FeatureRecord {
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
            bbox_height_change: bbox_change,
            bbox_height_change_rate: 0.0,
            bbox_height_noise: 0.0,
            speed_std: 0.0,
            speed_max_recent: speed,
            speed_mean_recent: speed,
            is_speed_stable: true,
            is_accelerating: false,
            is_decelerating: false,
            missing_samples: 0,
            has_outlier: false,
            data_quality_score: 1.0,
        }
    }

    fn classifier(t: ThresholdSet) -> RawClassifier {
        RawClassifier::new(Arc::new(t))
    }

    #[test]
    fn speed_sequence_maps_to_bands() {
        let c = classifier(ThresholdSet::default());
        let states: Vec<_> = [0.2, 0.3, 2.5, 6.0, 6.5, 0.1]
            .iter()
            .map(|&s| c.classify(&record(s, 0.0)).state)
            .collect();
        use MovementState::*;
        assert_eq!(states, vec![Idle, Idle, Walking, Running, Running, Idle]);
    }

    #[test]
    fn shrinking_silhouette_at_speed_is_a_jump() {
        let c = classifier(ThresholdSet::default());
        let r = c.classify(&record(5.0, -0.15));
        assert_eq!(r.state, MovementState::Jumping);
        assert_eq!(r.rule, RawRule::Jump);
        // 0.03 past the bound, scale 0.06
        assert_abs_diff_eq!(r.confidence, 0.75, epsilon = 1e-9);
        assert_eq!(r.triggers[0].feature, TriggerFeature::BboxHeightChange);
    }

    #[test]
    fn shrink_while_standing_is_not_a_jump() {
        let c = classifier(ThresholdSet::default());
        assert_eq!(c.classify(&record(0.2, -0.3)).state, MovementState::Idle);
    }

    #[test]
    fn confidence_is_half_on_the_boundary() {
        let c = classifier(ThresholdSet::default());
        let r = c.classify(&record(3.0, 0.0));
        assert_eq!(r.state, MovementState::Running);
        assert_abs_diff_eq!(r.confidence, 0.5, epsilon = 1e-12);
        let deep = c.classify(&record(7.0, 0.0));
        assert_abs_diff_eq!(deep.confidence, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn walking_scores_against_nearest_boundary() {
        let c = classifier(ThresholdSet::default());
        // 0.1 below run_speed_min
        let r = c.classify(&record(2.9, 0.0));
        assert_eq!(r.state, MovementState::Walking);
        assert_abs_diff_eq!(r.confidence, 0.5 + 0.5 * 0.1 / 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(r.triggers[0].bound, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn band_gap_falls_back_with_halved_confidence() {
        let t = ThresholdSet {
            idle_speed_max: 0.4,
            walk_speed_min: 0.6,
            ..Default::default()
        };
        assert!(t.validate().is_ok());
        let c = classifier(t);
        let r = c.classify(&record(0.45, 0.0));
        assert_eq!(r.rule, RawRule::Fallback);
        assert_eq!(r.state, MovementState::Idle);
        assert!(r.is_fallback());
        assert!(r.confidence <= 0.25 + 1e-12);
        let r = c.classify(&record(0.58, 0.0));
        assert_eq!(r.state, MovementState::Walking);
    }

    #[test]
    fn stage_impl_matches_classify() {
        let mut c = classifier(ThresholdSet::default());
        let f = record(1.2, 0.0);
        assert_eq!(c.process(&f).unwrap(), c.classify(&f));
    }
}
