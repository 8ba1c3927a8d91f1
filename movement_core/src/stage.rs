//! The narrow contract shared by every pipeline component.

use crate::error::StageError;

/// One step of the per-frame classification pipeline.
///
/// Stages are chained by the [`Classifier`](crate::pipeline::Classifier); a stage
/// that fails aborts the frame, which is then reported as a failed record.
pub trait Stage<In> {
    type Out;

    fn process(&mut self, input: In) -> Result<Self::Out, StageError>;
}
