//! Upstream tracking simulator.
//!
//! Turns ground-truth trajectories into what a detector/tracker would report:
//! - Uniform position noise on the court map
//! - Uniform noise on the bounding box edges
//! - Missed detections (1 - P_D), leaving gaps in the frame sequence
//! - Occasional box glitches (partial occlusion cropping the silhouette)
//!
//! Observations are then fed through the velocity analyzer and silhouette
//! track to produce the classifier's frame inputs.

use crate::player::TruthSample;
use kinematics::{BoundingBox, SilhouetteTrack, VelocityAnalyzer};
use movement_core::types::{EntityId, FrameInput, KinematicsSource};
use nalgebra::Vector2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Noise and detection model of the upstream tracker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackingParams {
    /// Half-width of the uniform court position noise (m)
    pub position_noise: f64,
    /// Half-width of the uniform noise on each box edge (px)
    pub box_edge_noise: f64,
    /// Probability that the player is detected in a frame
    pub p_detection: f64,
    /// Probability that a detected box is cropped by occlusion
    pub p_glitch: f64,
    /// Fraction of the height lost in a cropped box
    pub glitch_crop: f64,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            position_noise: 0.01,
            box_edge_noise: 1.0,
            p_detection: 0.99,
            p_glitch: 0.0,
            glitch_crop: 0.25,
        }
    }
}

/// One tracker report for one player.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub frame: u64,
    pub position: Vector2<f64>,
    pub bbox: BoundingBox,
}

/// Generates noisy observations from ground truth.
pub struct TrackingSimulator {
    pub params: TrackingParams,
    rng: ChaCha8Rng,
}

impl TrackingSimulator {
    pub fn new(params: TrackingParams, seed: u64) -> Self {
        Self {
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn uniform(&mut self, half_width: f64) -> f64 {
        self.rng.gen::<f64>() * half_width * 2.0 - half_width
    }

    /// Observations for every frame in which the player was detected.
    pub fn observe(&mut self, truth: &[TruthSample]) -> Vec<Observation> {
        let mut out = Vec::with_capacity(truth.len());
        for sample in truth {
            // Miss detection?
            if self.rng.gen::<f64>() > self.params.p_detection {
                continue;
            }

            let noise = self.params.position_noise;
            let position = sample.position + Vector2::new(self.uniform(noise), self.uniform(noise));

            // Box anchored at the feet (fixed image row) so a jump lowers the top edge
            let edge = self.params.box_edge_noise;
            let feet = 600.0;
            let mut height = sample.silhouette_height;
            if self.rng.gen::<f64>() < self.params.p_glitch {
                height *= 1.0 - self.params.glitch_crop;
            }
            let bbox = BoundingBox::new(
                400.0 + self.uniform(edge),
                feet - height + self.uniform(edge),
                460.0 + self.uniform(edge),
                feet + self.uniform(edge),
            );

            out.push(Observation {
                frame: sample.frame,
                position,
                bbox,
            });
        }
        out
    }
}

/// Run observations through the upstream providers and build frame inputs.
///
/// `analyzer` keeps the positions so callers can query it afterwards.
pub fn frame_inputs(
    entity: EntityId,
    observations: &[Observation],
    analyzer: &mut VelocityAnalyzer,
    silhouette_window: usize,
) -> Vec<FrameInput> {
    let fps = analyzer.config.fps;
    let mut silhouettes = SilhouetteTrack::new(silhouette_window);
    observations
        .iter()
        .map(|obs| {
            analyzer.record(entity, obs.frame, obs.position);
            let height = silhouettes.push_box(obs.frame, &obs.bbox);
            FrameInput::new(
                obs.frame,
                obs.frame as f64 / fps,
                analyzer.kinematics_at(entity, obs.frame).unwrap_or_default(),
                height,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
