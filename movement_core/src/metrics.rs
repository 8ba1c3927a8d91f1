//! Classification metrics against ground-truth labels: accuracy, per-state
//! recall and precision, confusion matrix, flicker count.

use crate::types::MovementState;
use serde::{Deserialize, Serialize};

/// Runs shorter than this many frames between two other runs count as flicker.
pub const DEFAULT_MIN_RUN: usize = 3;

/// Accumulated metric statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    /// Number of frames evaluated
    pub n_frames: u64,
    /// Frames whose predicted state matches the label
    pub n_correct: u64,
    /// `confusion[truth][predicted]`, indexed by [`MovementState::index`]
    pub confusion: [[u64; 5]; 5],
    /// Short-lived runs in the predicted sequence
    pub flicker_count: u64,
    /// Predicted state changes
    pub transitions: u64,
}

impl ClassificationMetrics {
    /// Compare predicted against true states frame by frame.
    ///
    /// Extra frames on either side are ignored.
    pub fn evaluate(predicted: &[MovementState], truth: &[MovementState]) -> Self {
        let mut m = Self::default();
        m.accumulate(predicted, truth);
        m
    }

    pub fn accumulate(&mut self, predicted: &[MovementState], truth: &[MovementState]) {
        for (&p, &t) in predicted.iter().zip(truth) {
            self.n_frames += 1;
            if p == t {
                self.n_correct += 1;
            }
            self.confusion[t.index()][p.index()] += 1;
        }
        self.flicker_count += flicker_count(predicted, DEFAULT_MIN_RUN) as u64;
        self.transitions += predicted.windows(2).filter(|w| w[0] != w[1]).count() as u64;
    }

    /// Fraction of frames classified correctly.
    pub fn accuracy(&self) -> f64 {
        if self.n_frames == 0 {
            return 0.0;
        }
        self.n_correct as f64 / self.n_frames as f64
    }

    /// Recall of one state, `None` when it never occurs in the labels.
    pub fn recall(&self, state: MovementState) -> Option<f64> {
        let row = &self.confusion[state.index()];
        let total: u64 = row.iter().sum();
        (total > 0).then(|| row[state.index()] as f64 / total as f64)
    }

    /// Precision of one state, `None` when it is never predicted.
    pub fn precision(&self, state: MovementState) -> Option<f64> {
        let i = state.index();
        let total: u64 = self.confusion.iter().map(|row| row[i]).sum();
        (total > 0).then(|| self.confusion[i][i] as f64 / total as f64)
    }

    /// Per-state recall in state order.
    pub fn per_state_recall(&self) -> Vec<(MovementState, Option<f64>)> {
        MovementState::ALL
            .iter()
            .map(|&s| (s, self.recall(s)))
            .collect()
    }
}

/// Interior runs shorter than `min_run` frames.
///
/// The first and last runs are open-ended and never count.
pub fn flicker_count(states: &[MovementState], min_run: usize) -> usize {
    let mut runs: Vec<usize> = Vec::new();
    let mut prev: Option<MovementState> = None;
    for &s in states {
        match (prev, runs.last_mut()) {
            (Some(p), Some(len)) if p == s => *len += 1,
            _ => runs.push(1),
        }
        prev = Some(s);
    }
    if runs.len() < 3 {
        return 0;
    }
    runs[1..runs.len() - 1]
        .iter()
        .filter(|&&len| len < min_run)
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use MovementState::*;

    #[test]
    fn perfect_prediction() {
        let truth = [Idle, Walking, Walking, Running];
        let m = ClassificationMetrics::evaluate(&truth, &truth);
        assert_abs_diff_eq!(m.accuracy(), 1.0, epsilon = 1e-12);
        assert_eq!(m.recall(Walking), Some(1.0));
        assert_eq!(m.recall(Jumping), None);
        assert_eq!(m.transitions, 2);
    }

    #[test]
    fn confusion_and_recall() {
        let truth = [Running, Running, Running, Running];
        let pred = [Walking, Running, Running, Running];
        let m = ClassificationMetrics::evaluate(&pred, &truth);
        assert_abs_diff_eq!(m.accuracy(), 0.75, epsilon = 1e-12);
        assert_eq!(m.confusion[Running.index()][Walking.index()], 1);
        assert_abs_diff_eq!(m.recall(Running).unwrap(), 0.75, epsilon = 1e-12);
        assert_eq!(m.precision(Walking), Some(0.0));
    }

    #[test]
    fn flicker_counts_short_interior_runs() {
        let seq = [Walking, Walking, Running, Walking, Walking, Walking, Idle, Idle, Walking];
        assert_eq!(flicker_count(&seq, 3), 2);
        assert_eq!(flicker_count(&[Idle, Walking], 3), 0);
        assert_eq!(flicker_count(&[], 3), 0);
    }

    #[test]
    fn empty_input() {
        let m = ClassificationMetrics::evaluate(&[], &[]);
        assert_eq!(m.accuracy(), 0.0);
        assert_eq!(m.per_state_recall().len(), 5);
    }
}
