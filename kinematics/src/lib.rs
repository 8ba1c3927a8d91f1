//! `kinematics` — Upstream signal providers for the movement classifier:
//! court-position velocity analysis and silhouette height tracks.

pub mod silhouette;
pub mod velocity;

pub use silhouette::{BoundingBox, SilhouetteTrack};
pub use velocity::{VelocityAnalyzer, VelocityConfig};
