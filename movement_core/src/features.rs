//! Feature extraction: one validated [`FeatureRecord`] per frame.
//!
//! # Steps per frame
//! 1. Validate the kinematics snapshot (present, finite, non-negative speed)
//! 2. Validate the silhouette (current height present and positive, at least
//!    one preceding sample)
//! 3. Silhouette features against the median of the preceding heights
//! 4. Speed statistics over the trailing window (current sample included)
//! 5. Outlier test and data-quality score
//!
//! The extractor holds no per-entity history. The owning session passes the
//! trailing windows in and appends the current samples afterwards.

use crate::{
    error::{InvalidInput, StageError},
    stage::Stage,
    thresholds::ThresholdSet,
    types::{EntityId, KinematicsSnapshot},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `|acceleration|` above this marks a frame as accelerating / decelerating (m/s²)
pub const ACCELERATION_FLAG_MIN: f64 = 0.5;

/// Quantitative description of one frame, consumed by every later stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub entity: EntityId,
    pub frame: u64,
    pub timestamp: f64,

    // -- kinematics ---------------------------------------------------------
    pub speed: f64,
    /// Smoothed speed; equals `speed` when the provider had none
    pub speed_smoothed: f64,
    /// Signed acceleration; 0 when the provider had none
    pub acceleration: f64,
    pub has_speed_smoothed: bool,
    pub has_acceleration: bool,

    // -- silhouette ---------------------------------------------------------
    pub bbox_height: f64,
    /// Relative change against the median of the preceding heights
    pub bbox_height_change: f64,
    /// Relative first difference per frame
    pub bbox_height_change_rate: f64,
    /// Sample std of relative first differences over the window
    pub bbox_height_noise: f64,

    // -- trailing speed window ----------------------------------------------
    pub speed_std: f64,
    pub speed_max_recent: f64,
    pub speed_mean_recent: f64,
    pub is_speed_stable: bool,
    pub is_accelerating: bool,
    pub is_decelerating: bool,

    // -- quality ------------------------------------------------------------
    /// Frames missing from the trailing frame span
    pub missing_samples: u64,
    pub has_outlier: bool,
    pub data_quality_score: f64,
}

/// Everything the extractor needs for one frame.
///
/// Windows are ordered oldest first and do not contain the current frame.
#[derive(Clone, Copy, Debug)]
pub struct FeatureInput<'a> {
    pub entity: EntityId,
    pub frame: u64,
    pub timestamp: f64,
    pub kinematics: KinematicsSnapshot,
    pub silhouette_height: Option<f64>,
    pub prior_heights: &'a [f64],
    pub prior_speeds: &'a [f64],
    pub prior_frames: &'a [u64],
}

/// Stateless feature extractor.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    thresholds: Arc<ThresholdSet>,
}

impl FeatureExtractor {
    pub fn new(thresholds: Arc<ThresholdSet>) -> Self {
        Self { thresholds }
    }

    pub fn extract(&self, input: &FeatureInput<'_>) -> Result<FeatureRecord, InvalidInput> {
        let t = &self.thresholds;
        let ks = input.kinematics;

        // ----------------------------------------------------------------
        // Step 1: kinematics
        // ----------------------------------------------------------------
        let speed = ks.speed.ok_or(InvalidInput::MissingSpeed)?;
        if !speed.is_finite() {
            return Err(InvalidInput::NonFiniteSignal);
        }
        if speed < 0.0 {
            return Err(InvalidInput::NegativeSpeed);
        }
        if ks.speed_smoothed.is_some_and(|v| !v.is_finite())
            || ks.acceleration.is_some_and(|v| !v.is_finite())
        {
            return Err(InvalidInput::NonFiniteSignal);
        }
        let speed_smoothed = ks.speed_smoothed.unwrap_or(speed);
        let acceleration = ks.acceleration.unwrap_or(0.0);

        // ----------------------------------------------------------------
        // Step 2: silhouette
        // ----------------------------------------------------------------
        let height = input
            .silhouette_height
            .ok_or(InvalidInput::InsufficientSilhouette)?;
        if !height.is_finite() {
            return Err(InvalidInput::NonFiniteSignal);
        }
        if height <= 0.0 {
            return Err(InvalidInput::InvalidHeight);
        }
        let prev_height = *input
            .prior_heights
            .last()
            .ok_or(InvalidInput::InsufficientSilhouette)?;

        // ----------------------------------------------------------------
        // Step 3: silhouette features
        // ----------------------------------------------------------------
        let h_ref = median(input.prior_heights);
        let bbox_height_change = (height - h_ref) / h_ref;
        let frame_gap = input
            .prior_frames
            .last()
            .map_or(1, |&f| input.frame.saturating_sub(f).max(1));
        let bbox_height_change_rate = (height - prev_height) / prev_height / frame_gap as f64;

        let rel_diffs: Vec<f64> = input
            .prior_heights
            .iter()
            .chain(std::iter::once(&height))
            .collect::<Vec<_>>()
            .windows(2)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();
        let bbox_height_noise = sample_std(&rel_diffs);

        // ----------------------------------------------------------------
        // Step 4: speed window
        // ----------------------------------------------------------------
        let mut speeds = Vec::with_capacity(input.prior_speeds.len() + 1);
        speeds.extend_from_slice(input.prior_speeds);
        speeds.push(speed);
        let speed_std = sample_std(&speeds);
        let speed_mean_recent = mean(&speeds);
        let speed_max_recent = speeds.iter().copied().fold(f64::MIN, f64::max);
        let is_speed_stable = speeds.len() >= 3 && speed_std < t.speed_stability_threshold();

        // ----------------------------------------------------------------
        // Step 5: quality
        // ----------------------------------------------------------------
        let has_outlier = speed > t.max_plausible_speed
            || is_iqr_outlier(speed, input.prior_speeds, t.hysteresis_margin);

        let (missing_samples, missing_ratio) = match input.prior_frames.first() {
            Some(&first) if input.frame > first => {
                let span = input.frame - first + 1;
                let observed = input.prior_frames.len() as u64 + 1;
                let missing = span.saturating_sub(observed);
                (missing, missing as f64 / span as f64)
            }
            _ => (0, 0.0),
        };

        let mut quality = 1.0 - 0.5 * missing_ratio;
        if has_outlier {
            quality -= 0.3;
        }
        if ks.speed_smoothed.is_none() {
            quality -= 0.1;
        }
        if ks.acceleration.is_none() {
            quality -= 0.1;
        }

        Ok(FeatureRecord {
            entity: input.entity,
            frame: input.frame,
            timestamp: input.timestamp,
            speed,
            speed_smoothed,
            acceleration,
            has_speed_smoothed: ks.speed_smoothed.is_some(),
            has_acceleration: ks.acceleration.is_some(),
            bbox_height: height,
            bbox_height_change,
            bbox_height_change_rate,
            bbox_height_noise,
            speed_std,
            speed_max_recent,
            speed_mean_recent,
            is_speed_stable,
            is_accelerating: acceleration > ACCELERATION_FLAG_MIN,
            is_decelerating: acceleration < -ACCELERATION_FLAG_MIN,
            missing_samples,
            has_outlier,
            data_quality_score: quality.clamp(0.0, 1.0),
        })
    }
}

impl<'a> Stage<FeatureInput<'a>> for FeatureExtractor {
    type Out = FeatureRecord;

    fn process(&mut self, input: FeatureInput<'a>) -> Result<FeatureRecord, StageError> {
        Ok(self.extract(&input)?)
    }
}

// ---------------------------------------------------------------------------
// Window statistics
// ---------------------------------------------------------------------------

pub(crate) fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n − 1). Zero for fewer than two samples.
pub(crate) fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

pub(crate) fn median(xs: &[f64]) -> f64 {
    percentile(xs, 50.0)
}

/// Linearly interpolated percentile, `p` in [0, 100].
pub(crate) fn percentile(xs: &[f64], p: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Tukey fence on the preceding speeds, ignoring deviations inside `margin`.
fn is_iqr_outlier(speed: f64, prior: &[f64], margin: f64) -> bool {
    if prior.len() < 4 {
        return false;
    }
    let q1 = percentile(prior, 25.0);
    let q3 = percentile(prior, 75.0);
    let iqr = q3 - q1;
    let outside = speed < q1 - 1.5 * iqr || speed > q3 + 1.5 * iqr;
    outside && (speed - median(prior)).abs() > margin
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
