//! `movement_core` — Player movement-state classification.
//!
//! # Module layout
//! - [`types`]          — IDs, movement states, upstream inputs
//! - [`error`]          — Configuration and per-frame input errors
//! - [`thresholds`]     — Threshold sets, presets, validation
//! - [`stage`]          — The `Stage` trait every component implements
//! - [`features`]       — Per-frame feature extraction
//! - [`raw_classifier`] — History-free threshold rules
//! - [`smoother`]       — Majority vote + hysteresis
//! - [`state_machine`]  — Physically valid transitions
//! - [`confidence`]     — Final confidence score
//! - [`session`]        — Per-entity windows and logs
//! - [`record`]         — Emitted records, statistics, timelines
//! - [`pipeline`]       — Multi-entity classifier orchestrator
//! - [`metrics`]        — Accuracy / recall / flicker against ground truth

pub mod confidence;
pub mod error;
pub mod features;
pub mod metrics;
pub mod pipeline;
pub mod raw_classifier;
pub mod record;
pub mod session;
pub mod smoother;
pub mod stage;
pub mod state_machine;
pub mod thresholds;
pub mod types;

pub use error::{ConfigError, InvalidInput, StageError};
pub use pipeline::{Classifier, ClassifierConfig, ExportedConfig};
pub use record::{ClassificationRecord, FrameQuality, SessionStatistics, Timeline};
pub use thresholds::{Preset, ThresholdOverrides, ThresholdSet};
pub use types::{EntityId, FrameInput, KinematicsSnapshot, KinematicsSource, MovementState};
