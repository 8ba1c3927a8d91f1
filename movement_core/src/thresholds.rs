//! Threshold configuration: speed bands, jump detection, temporal margins.
//!
//! A [`ThresholdSet`] is plain data. It is built from a named [`Preset`],
//! optionally overridden field by field, and validated once with
//! [`ThresholdSet::validated`]. Validation fails fast and never clamps.
//!
//! All speeds are m/s, bbox ratios are relative height changes, durations are
//! in frames.

use crate::{error::ConfigError, types::MovementState};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Named starting points for a threshold set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Balanced, general use
    #[default]
    Default,
    /// Earlier transitions (highlight detection)
    Aggressive,
    /// Later, noise-resistant transitions (tactical analysis)
    Conservative,
}

impl Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Default => "default",
            Preset::Aggressive => "aggressive",
            Preset::Conservative => "conservative",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Preset::Default),
            "aggressive" => Ok(Preset::Aggressive),
            "conservative" => Ok(Preset::Conservative),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Numeric cut points of the classifier.
///
/// Deserializes through [`ThresholdOverrides`], so a partial document starts
/// from the preset it names (or the default preset) and replaces only the
/// fields it lists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ThresholdOverrides")]
pub struct ThresholdSet {
    /// Preset this set was derived from
    pub preset: Preset,

    // -- speed bands --------------------------------------------------------
    pub idle_speed_max: f64,
    pub walk_speed_min: f64,
    /// Walking ceiling; overlaps `run_speed_min` by at most `hysteresis_margin`
    pub walk_speed_max: f64,
    pub run_speed_min: f64,
    /// Physical running ceiling
    pub run_speed_max: f64,

    // -- jump detection -----------------------------------------------------
    /// Minimum relative silhouette shrink for a jump (0.12 = 12 %)
    pub jump_bbox_shrink_min: f64,
    /// Minimum relative silhouette growth signalling a landing
    pub jump_bbox_grow_min: f64,
    /// Speed floor below which shrinkage is treated as noise
    pub jump_speed_min: f64,
    pub jump_min_duration_frames: u32,
    pub jump_max_duration_frames: u32,
    /// Frames after which an unresolved `Landing` falls back to its speed band
    pub landing_max_frames: u32,

    // -- temporal -----------------------------------------------------------
    /// Margin (m/s) around band boundaries inside which raw confidence drops
    pub hysteresis_margin: f64,
    /// Consecutive agreeing majority votes needed to change the smoothed state
    pub hysteresis_frames: usize,
    pub min_state_duration_frames: u32,
    /// Smoothing ring buffer length (also the trailing speed window)
    pub window_size: usize,
    /// Trailing silhouette samples kept per entity
    pub silhouette_window: usize,

    // -- quality ------------------------------------------------------------
    /// `speed_std` below `speed_stability_ratio * run_speed_min` counts as stable
    pub speed_stability_ratio: f64,
    /// Speeds above this are implausible for a human
    pub max_plausible_speed: f64,

    // -- confidence ---------------------------------------------------------
    /// Frames scoring below this are counted as low confidence
    pub confidence_threshold_min: f64,
    pub confidence_speed_weight: f64,
    pub confidence_stability_weight: f64,
    pub confidence_bbox_weight: f64,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            preset: Preset::Default,
            idle_speed_max: 0.5,
            walk_speed_min: 0.4,
            walk_speed_max: 3.2,
            run_speed_min: 3.0,
            run_speed_max: 9.0,
            jump_bbox_shrink_min: 0.12,
            jump_bbox_grow_min: 0.10,
            jump_speed_min: 0.8,
            jump_min_duration_frames: 8, // ~0.27 s @ 30 fps
            jump_max_duration_frames: 25, // ~0.83 s @ 30 fps
            landing_max_frames: 6,
            hysteresis_margin: 0.3,
            hysteresis_frames: 2,
            min_state_duration_frames: 5,
            window_size: 7,
            silhouette_window: 15,
            speed_stability_ratio: 0.15,
            max_plausible_speed: 12.0,
            confidence_threshold_min: 0.6,
            confidence_speed_weight: 0.4,
            confidence_stability_weight: 0.35,
            confidence_bbox_weight: 0.25,
        }
    }
}

impl ThresholdSet {
    /// Threshold values of a named preset. Presets always validate.
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Default => Self::default(),
            Preset::Aggressive => Self {
                preset,
                idle_speed_max: 0.4,
                walk_speed_min: 0.3,
                walk_speed_max: 2.8,
                run_speed_min: 2.6,
                jump_bbox_shrink_min: 0.10,
                jump_min_duration_frames: 6,
                hysteresis_margin: 0.2,
                min_state_duration_frames: 3,
                window_size: 5,
                confidence_threshold_min: 0.5,
                ..Self::default()
            },
            Preset::Conservative => Self {
                preset,
                idle_speed_max: 0.6,
                walk_speed_min: 0.5,
                walk_speed_max: 3.6,
                run_speed_min: 3.4,
                jump_bbox_shrink_min: 0.15,
                jump_min_duration_frames: 10,
                hysteresis_margin: 0.4,
                hysteresis_frames: 3,
                min_state_duration_frames: 8,
                window_size: 9,
                confidence_threshold_min: 0.7,
                ..Self::default()
            },
        }
    }

    /// Check every invariant, returning the set unchanged when it holds.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = [
            ("idle_speed_max", self.idle_speed_max),
            ("walk_speed_min", self.walk_speed_min),
            ("walk_speed_max", self.walk_speed_max),
            ("run_speed_min", self.run_speed_min),
            ("run_speed_max", self.run_speed_max),
            ("jump_bbox_shrink_min", self.jump_bbox_shrink_min),
            ("jump_bbox_grow_min", self.jump_bbox_grow_min),
            ("jump_speed_min", self.jump_speed_min),
            ("hysteresis_margin", self.hysteresis_margin),
            ("speed_stability_ratio", self.speed_stability_ratio),
            ("max_plausible_speed", self.max_plausible_speed),
            ("confidence_threshold_min", self.confidence_threshold_min),
            ("confidence_speed_weight", self.confidence_speed_weight),
            ("confidence_stability_weight", self.confidence_stability_weight),
            ("confidence_bbox_weight", self.confidence_bbox_weight),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeOrNonFinite { field, value });
            }
        }

        if self.walk_speed_min > self.run_speed_min {
            return Err(ConfigError::SpeedOrdering(format!(
                "walk_speed_min={} > run_speed_min={}",
                self.walk_speed_min, self.run_speed_min
            )));
        }
        if !(self.idle_speed_max < self.walk_speed_max && self.walk_speed_max < self.run_speed_max)
        {
            return Err(ConfigError::SpeedOrdering(format!(
                "idle={}, walk={}, run={}",
                self.idle_speed_max, self.walk_speed_max, self.run_speed_max
            )));
        }
        if self.walk_speed_min >= self.idle_speed_max + self.hysteresis_margin {
            return Err(ConfigError::BandOverlap(format!(
                "walk_speed_min={} vs idle_speed_max={} + margin={}",
                self.walk_speed_min, self.idle_speed_max, self.hysteresis_margin
            )));
        }
        if self.run_speed_min >= self.walk_speed_max + self.hysteresis_margin {
            return Err(ConfigError::BandOverlap(format!(
                "run_speed_min={} vs walk_speed_max={} + margin={}",
                self.run_speed_min, self.walk_speed_max, self.hysteresis_margin
            )));
        }

        if !(self.jump_bbox_shrink_min > 0.0 && self.jump_bbox_shrink_min < 0.5) {
            return Err(ConfigError::JumpShrinkRange(self.jump_bbox_shrink_min));
        }
        if self.jump_min_duration_frames >= self.jump_max_duration_frames {
            return Err(ConfigError::JumpDuration {
                min: self.jump_min_duration_frames,
                max: self.jump_max_duration_frames,
            });
        }

        let minimums = [
            ("window_size", 1, self.window_size),
            ("hysteresis_frames", 1, self.hysteresis_frames),
            ("silhouette_window", 2, self.silhouette_window),
            ("landing_max_frames", 1, self.landing_max_frames as usize),
        ];
        for (field, min, value) in minimums {
            if value < min {
                return Err(ConfigError::TooSmall { field, min, value });
            }
        }

        let weight_sum = self.confidence_speed_weight
            + self.confidence_stability_weight
            + self.confidence_bbox_weight;
        if !(0.99..=1.01).contains(&weight_sum) {
            return Err(ConfigError::WeightSum(weight_sum));
        }
        Ok(())
    }

    /// Speed band `(min, max)` associated with a state.
    pub fn speed_band(&self, state: MovementState) -> (f64, f64) {
        match state {
            MovementState::Idle => (0.0, self.idle_speed_max),
            MovementState::Walking => (self.walk_speed_min, self.walk_speed_max),
            MovementState::Running => (self.run_speed_min, self.run_speed_max),
            MovementState::Jumping => (self.jump_speed_min, self.run_speed_max),
            MovementState::Landing => (0.0, self.run_speed_max),
        }
    }

    /// Ground state whose band a speed falls into, ignoring silhouette signals.
    pub fn locomotion_for_speed(&self, speed: f64) -> MovementState {
        if speed >= self.run_speed_min {
            MovementState::Running
        } else if speed >= self.walk_speed_min {
            MovementState::Walking
        } else {
            MovementState::Idle
        }
    }

    /// Standard deviation below which speed counts as stable.
    pub fn speed_stability_threshold(&self) -> f64 {
        self.speed_stability_ratio * self.run_speed_min
    }
}

// ---------------------------------------------------------------------------
// Partial overrides
// ---------------------------------------------------------------------------

macro_rules! threshold_overrides {
    ($($field:ident: $ty:ty),* $(,)?) => {
        /// Field-by-field override of a preset. Absent fields keep the
        /// preset's value.
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct ThresholdOverrides {
            /// Base preset; callers supply a fallback when absent
            #[serde(skip_serializing_if = "Option::is_none")]
            pub preset: Option<Preset>,
            $(
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl ThresholdOverrides {
            /// Replace the listed fields of `base`.
            pub fn apply(&self, base: ThresholdSet) -> ThresholdSet {
                ThresholdSet {
                    preset: base.preset,
                    $($field: self.$field.unwrap_or(base.$field),)*
                }
            }
        }
    };
}

threshold_overrides! {
    idle_speed_max: f64,
    walk_speed_min: f64,
    walk_speed_max: f64,
    run_speed_min: f64,
    run_speed_max: f64,
    jump_bbox_shrink_min: f64,
    jump_bbox_grow_min: f64,
    jump_speed_min: f64,
    jump_min_duration_frames: u32,
    jump_max_duration_frames: u32,
    landing_max_frames: u32,
    hysteresis_margin: f64,
    hysteresis_frames: usize,
    min_state_duration_frames: u32,
    window_size: usize,
    silhouette_window: usize,
    speed_stability_ratio: f64,
    max_plausible_speed: f64,
    confidence_threshold_min: f64,
    confidence_speed_weight: f64,
    confidence_stability_weight: f64,
    confidence_bbox_weight: f64,
}

impl ThresholdOverrides {
    /// Overrides applied on top of the named preset, or `fallback` when the
    /// document names none. The result still needs [`ThresholdSet::validated`].
    pub fn resolve(&self, fallback: Preset) -> ThresholdSet {
        self.apply(ThresholdSet::preset(self.preset.unwrap_or(fallback)))
    }
}

impl From<ThresholdOverrides> for ThresholdSet {
    fn from(overrides: ThresholdOverrides) -> Self {
        overrides.resolve(Preset::Default)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
