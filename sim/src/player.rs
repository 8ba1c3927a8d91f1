//! Player motion models and ground-truth generation.
//!
//! A player follows a list of [`Segment`]s, each lasting a fixed number of
//! frames. Speed carries over between segments, so a `Ramp` starts from
//! whatever speed the previous segment ended at. Every generated frame carries
//! the true court position, speed, silhouette height and movement label.

use movement_core::types::{EntityId, MovementState};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Ground-truth label boundaries (m/s).
pub const TRUTH_IDLE_MAX: f64 = 0.5;
pub const TRUTH_RUN_MIN: f64 = 3.0;

/// Knee bend on the frames right after touchdown.
const LANDING_SQUASH: f64 = 0.06;

/// How the player moves during one segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Motion {
    /// Standing still.
    Stand,
    /// Constant speed along `heading` (radians).
    Move { speed: f64, heading: f64 },
    /// Linear speed change to `to_speed` over the segment.
    Ramp { to_speed: f64, heading: f64 },
    /// Airborne at the current speed; silhouette shrinks by `tuck` (ratio).
    Jump { tuck: f64 },
    /// Touchdown: current speed kept, slight squash, labelled `Landing`.
    Land,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub frames: u64,
    pub motion: Motion,
}

impl Segment {
    pub fn new(frames: u64, motion: Motion) -> Self {
        Self { frames, motion }
    }
}

/// One frame of true player state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthSample {
    pub frame: u64,
    pub position: Vector2<f64>,
    pub speed: f64,
    pub silhouette_height: f64,
    pub label: MovementState,
}

/// A simulated player with a scripted movement plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: EntityId,
    /// Court position at frame 0 (m)
    pub start: Vector2<f64>,
    /// Silhouette height when standing upright (px)
    pub standing_height: f64,
    pub segments: Vec<Segment>,
}

impl Player {
    pub fn new(id: u64, start: [f64; 2], standing_height: f64, segments: Vec<Segment>) -> Self {
        Self {
            id: EntityId(id),
            start: Vector2::new(start[0], start[1]),
            standing_height,
            segments,
        }
    }

    /// Total scripted length in frames.
    pub fn duration_frames(&self) -> u64 {
        self.segments.iter().map(|s| s.frames).sum()
    }

    /// Step through every segment at `fps` and return the true trajectory.
    pub fn trajectory(&self, fps: f64) -> Vec<TruthSample> {
        let dt = 1.0 / fps;
        let mut out = Vec::with_capacity(self.duration_frames() as usize);
        let mut position = self.start;
        let mut speed = 0.0_f64;
        let mut heading = 0.0_f64;
        let mut frame = 0u64;

        for segment in &self.segments {
            let start_speed = speed;
            for k in 0..segment.frames {
                let mut height = self.standing_height;
                let label = match &segment.motion {
                    Motion::Stand => {
                        speed = 0.0;
                        MovementState::Idle
                    }
                    Motion::Move { speed: v, heading: h } => {
                        speed = *v;
                        heading = *h;
                        gait_label(speed)
                    }
                    Motion::Ramp { to_speed, heading: h } => {
                        let frac = (k + 1) as f64 / segment.frames as f64;
                        speed = start_speed + (to_speed - start_speed) * frac;
                        heading = *h;
                        gait_label(speed)
                    }
                    Motion::Jump { tuck } => {
                        height *= 1.0 - tuck;
                        MovementState::Jumping
                    }
                    Motion::Land => {
                        height *= 1.0 - LANDING_SQUASH;
                        MovementState::Landing
                    }
                };
                position += Vector2::new(heading.cos(), heading.sin()) * speed * dt;
                out.push(TruthSample {
                    frame,
                    position,
                    speed,
                    silhouette_height: height,
                    label,
                });
                frame += 1;
            }
        }
        out
    }
}

/// Ground-truth gait for a speed.
pub fn gait_label(speed: f64) -> MovementState {
    if speed < TRUTH_IDLE_MAX {
        MovementState::Idle
    } else if speed < TRUTH_RUN_MIN {
        MovementState::Walking
    } else {
        MovementState::Running
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
    fn constant_move_covers_distance() {
        let p = Player::new(0, [0.0, 0.0], 180.0, vec![Segment::new(30, Motion::Move { speed: 2.0, heading: 0.0 })]);
        let traj = p.trajectory(30.0);
        assert_eq!(traj.len(), 30);
        assert_abs_diff_eq!(traj[29].position.x, 2.0, epsilon = 1e-9);
        assert!(traj.iter().all(|s| s.label == MovementState::Walking));
    }

    #[test]
    fn ramp_starts_from_previous_speed() {
        let p = Player::new(
            0,
            [0.0, 0.0],
            180.0,
            vec![
                Segment::new(10, Motion::Move { speed: 6.0, heading: 0.0 }),
                Segment::new(10, Motion::Ramp { to_speed: 1.0, heading: 0.0 }),
            ],
        );
        let traj = p.trajectory(30.0);
        assert_abs_diff_eq!(traj[10].speed, 5.5, epsilon = 1e-9);
        assert_abs_diff_eq!(traj[19].speed, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn jump_shrinks_silhouette_and_keeps_speed() {
        let p = Player::new(
            0,
            [0.0, 0.0],
            200.0,
            vec![
                Segment::new(5, Motion::Move { speed: 5.0, heading: 0.0 }),
                Segment::new(4, Motion::Jump { tuck: 0.2 }),
                Segment::new(2, Motion::Land),
            ],
        );
        let traj = p.trajectory(30.0);
        assert_abs_diff_eq!(traj[6].silhouette_height, 160.0, epsilon = 1e-9);
        assert_eq!(traj[6].label, MovementState::Jumping);
        assert_abs_diff_eq!(traj[6].speed, 5.0);
        assert_eq!(traj[9].label, MovementState::Landing);
    }

    #[test]
    fn gait_labels() {
        assert_eq!(gait_label(0.1), MovementState::Idle);
        assert_eq!(gait_label(1.4), MovementState::Walking);
        assert_eq!(gait_label(6.5), MovementState::Running);
    }
}
