//! Scenario definitions.
//!
//! Each scenario is a named configuration of scripted players and a tracking
//! noise model. All scenarios are deterministic given the same seed.

use crate::{
    player::{Motion, Player, Segment},
    replay::{PlayerLog, ReplayLog},
    tracking_sim::{frame_inputs, TrackingParams, TrackingSimulator},
};
use kinematics::{VelocityAnalyzer, VelocityConfig};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// 1 player: stand, walk up, sprint a fast break, brake, stop
    FastBreak,
    /// 1 player: approach, run, jump shot, land, jog back
    JumpShot,
    /// 5 players running a half-court set, mixed gaits
    HalfCourt,
    /// Fast break + jump shot under heavy tracking noise and dropouts
    NoisyTracking,
    /// 10 players with seeded random movement plans
    FullRoster,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub fps: f64,
    pub players: Vec<Player>,
    pub tracking: TrackingParams,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::FastBreak => Self::fast_break(seed),
            ScenarioKind::JumpShot => Self::jump_shot(seed),
            ScenarioKind::HalfCourt => Self::half_court(seed),
            ScenarioKind::NoisyTracking => Self::noisy_tracking(seed),
            ScenarioKind::FullRoster => Self::full_roster(seed),
        }
    }

    /// Observe every player through the tracking model and record the frame
    /// inputs together with the ground-truth labels.
    pub fn simulate(&self, silhouette_window: usize) -> ReplayLog {
        let players = self
            .players
            .iter()
            .map(|player| {
                let truth = player.trajectory(self.fps);
                let mut tracker =
                    TrackingSimulator::new(self.tracking.clone(), self.seed.wrapping_add(player.id.0));
                let observations = tracker.observe(&truth);
                let mut analyzer = VelocityAnalyzer::new(VelocityConfig {
                    fps: self.fps,
                    history_frames: truth.len(),
                    ..Default::default()
                });
                let frames = frame_inputs(player.id, &observations, &mut analyzer, silhouette_window);
                let last = truth.len().saturating_sub(1) as u64;
                PlayerLog {
                    entity: player.id,
                    frames,
                    truth: truth.iter().map(|s| s.label).collect(),
                    distance_m: analyzer.distance_traveled(player.id, 0, last),
                    top_speed: analyzer.max_speed(player.id, 0, last),
                }
            })
            .collect();

        ReplayLog {
            scenario_name: self.name.clone(),
            seed: self.seed,
            fps: self.fps,
            players,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 1: Fast break
    // -----------------------------------------------------------------------
    fn fast_break(seed: u64) -> Self {
        Scenario {
            name: "fast_break".into(),
            seed,
            fps: 30.0,
            players: vec![fast_break_player(0, [-12.0, 0.0], 0.0)],
            tracking: TrackingParams::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 2: Jump shot
    // -----------------------------------------------------------------------
    fn jump_shot(seed: u64) -> Self {
        Scenario {
            name: "jump_shot".into(),
            seed,
            fps: 30.0,
            players: vec![jump_shot_player(0, [-10.0, -3.0], 0.2)],
            tracking: TrackingParams::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 3: Half court
    // -----------------------------------------------------------------------
    fn half_court(seed: u64) -> Self {
        let players = vec![
            // Ball handler walks it up, then drives
            Player::new(
                0,
                [-8.0, 0.0],
                182.0,
                vec![
                    Segment::new(30, Motion::Stand),
                    Segment::new(60, Motion::Move { speed: 1.3, heading: 0.0 }),
                    Segment::new(15, Motion::Ramp { to_speed: 5.0, heading: 0.3 }),
                    Segment::new(40, Motion::Move { speed: 5.0, heading: 0.3 }),
                    Segment::new(20, Motion::Ramp { to_speed: 1.0, heading: 0.3 }),
                    Segment::new(45, Motion::Move { speed: 1.0, heading: PI }),
                ],
            ),
            // Spot-up shooter
            Player::new(
                1,
                [4.0, 6.0],
                176.0,
                vec![
                    Segment::new(120, Motion::Stand),
                    Segment::new(40, Motion::Move { speed: 1.8, heading: -FRAC_PI_2 }),
                    Segment::new(50, Motion::Stand),
                ],
            ),
            // Cutter
            jump_shot_player(2, [2.0, -6.0], FRAC_PI_2),
            // Screener jogging up and back
            Player::new(
                3,
                [0.0, 2.0],
                195.0,
                vec![
                    Segment::new(40, Motion::Move { speed: 2.2, heading: 0.0 }),
                    Segment::new(70, Motion::Stand),
                    Segment::new(50, Motion::Move { speed: 2.0, heading: PI }),
                    Segment::new(50, Motion::Stand),
                ],
            ),
            // Weak-side defender sprinting back
            fast_break_player(4, [6.0, -2.0], PI),
        ];

        Scenario {
            name: "half_court".into(),
            seed,
            fps: 30.0,
            players,
            tracking: TrackingParams::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 4: Noisy tracking
    // -----------------------------------------------------------------------
    fn noisy_tracking(seed: u64) -> Self {
        Scenario {
            name: "noisy_tracking".into(),
            seed,
            fps: 30.0,
            players: vec![
                fast_break_player(0, [-12.0, 0.0], 0.0),
                jump_shot_player(1, [-10.0, -3.0], 0.2),
            ],
            tracking: TrackingParams {
                position_noise: 0.03,
                box_edge_noise: 3.0,
                p_detection: 0.93,
                p_glitch: 0.03,
                glitch_crop: 0.25,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 5: Full roster (seeded random plans)
    // -----------------------------------------------------------------------
    fn full_roster(seed: u64) -> Self {
        use rand::prelude::*;
        use rand_chacha::ChaCha8Rng;
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));

        let players = (0..10)
            .map(|i| {
                let start = [rng.gen::<f64>() * 28.0 - 14.0, rng.gen::<f64>() * 15.0 - 7.5];
                let height = 170.0 + rng.gen::<f64>() * 30.0;
                let mut segments = vec![Segment::new(30, Motion::Stand)];
                let mut speed = 0.0;
                for _ in 0..8 {
                    let heading = rng.gen::<f64>() * 2.0 * PI;
                    let roll = rng.gen::<f64>();
                    if roll < 0.2 {
                        segments.push(Segment::new(10, Motion::Ramp { to_speed: 0.0, heading }));
                        segments.push(Segment::new(30 + rng.gen_range(0..30), Motion::Stand));
                        speed = 0.0;
                    } else if roll < 0.55 {
                        let v = 1.0 + rng.gen::<f64>() * 1.2;
                        segments.push(Segment::new(12, Motion::Ramp { to_speed: v, heading }));
                        segments.push(Segment::new(40 + rng.gen_range(0..40), Motion::Move { speed: v, heading }));
                        speed = v;
                    } else {
                        let v = 4.0 + rng.gen::<f64>() * 3.0;
                        segments.push(Segment::new(15, Motion::Ramp { to_speed: v, heading }));
                        segments.push(Segment::new(30 + rng.gen_range(0..30), Motion::Move { speed: v, heading }));
                        speed = v;
                        if rng.gen::<f64>() < 0.4 {
                            segments.push(Segment::new(14, Motion::Jump { tuck: 0.2 }));
                            segments.push(Segment::new(4, Motion::Land));
                            segments.push(Segment::new(20, Motion::Move { speed, heading }));
                        }
                    }
                }
                if speed > 0.0 {
                    segments.push(Segment::new(15, Motion::Ramp { to_speed: 0.0, heading: 0.0 }));
                }
                segments.push(Segment::new(30, Motion::Stand));
                Player::new(i, start, height, segments)
            })
            .collect();

        Scenario {
            name: "full_roster".into(),
            seed,
            fps: 30.0,
            players,
            tracking: TrackingParams::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted players shared by several scenarios
// ---------------------------------------------------------------------------

fn fast_break_player(id: u64, start: [f64; 2], heading: f64) -> Player {
    Player::new(
        id,
        start,
        185.0,
        vec![
            Segment::new(45, Motion::Stand),
            Segment::new(15, Motion::Ramp { to_speed: 1.5, heading }),
            Segment::new(60, Motion::Move { speed: 1.5, heading }),
            Segment::new(20, Motion::Ramp { to_speed: 6.5, heading }),
            Segment::new(60, Motion::Move { speed: 6.5, heading }),
            Segment::new(20, Motion::Ramp { to_speed: 0.0, heading }),
            Segment::new(60, Motion::Stand),
        ],
    )
}

fn jump_shot_player(id: u64, start: [f64; 2], heading: f64) -> Player {
    Player::new(
        id,
        start,
        190.0,
        vec![
            Segment::new(45, Motion::Move { speed: 1.5, heading }),
            Segment::new(15, Motion::Ramp { to_speed: 5.5, heading }),
            Segment::new(45, Motion::Move { speed: 5.5, heading }),
            Segment::new(14, Motion::Jump { tuck: 0.2 }),
            Segment::new(4, Motion::Land),
            Segment::new(30, Motion::Move { speed: 4.0, heading: heading + PI }),
            Segment::new(20, Motion::Ramp { to_speed: 1.2, heading: heading + PI }),
            Segment::new(40, Motion::Move { speed: 1.2, heading: heading + PI }),
        ],
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
