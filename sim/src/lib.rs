//! `sim` — Scenario simulator: scripted players, noisy tracking, replay and
//! scoring against ground truth.

pub mod player;
pub mod replay;
pub mod scenarios;
pub mod tracking_sim;

pub use player::{Motion, Player, Segment, TruthSample};
pub use replay::{load_replay, run_replay, save_replay, score_records, PlayerLog, PlayerReport, ReplayLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use tracking_sim::{frame_inputs, Observation, TrackingParams, TrackingSimulator};
