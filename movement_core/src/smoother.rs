//! Temporal smoothing: weighted majority vote over a ring buffer plus
//! hysteresis.
//!
//! # Per frame
//! 1. Push `(state, confidence)`; drop the oldest sample beyond `window_size`
//! 2. Tally votes with weight `max(0.1, confidence)`; ties go to the state of
//!    the most recent tied sample
//! 3. The first frame adopts the majority directly
//! 4. A new majority replaces the smoothed state only after it has won
//!    `hysteresis_frames` consecutive votes
//! 5. A change while the authoritative state is younger than
//!    `min_state_duration_frames` is flagged `early` but not blocked

use crate::{error::StageError, stage::Stage, thresholds::ThresholdSet, types::MovementState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Floor on a sample's vote weight so that zero-confidence frames still count.
pub const MIN_VOTE_WEIGHT: f64 = 0.1;

const TIE_EPSILON: f64 = 1e-9;

/// A challenger majority waiting to pass hysteresis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub candidate: MovementState,
    pub consecutive: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SmoothedClassification {
    pub state: MovementState,
    pub majority: MovementState,
    /// Weighted tally indexed by [`MovementState::index`]
    pub votes: [f64; 5],
    /// Fraction of buffered samples agreeing with `state`
    pub agreement: f64,
    /// The smoothed state changed on this frame
    pub hysteresis_passed: bool,
    pub pending: Option<PendingChange>,
    /// Changed before the authoritative state reached its minimum duration
    pub early: bool,
}

/// Input for one smoothing step.
#[derive(Clone, Copy, Debug)]
pub struct SmootherInput {
    pub state: MovementState,
    pub confidence: f64,
    /// How long the authoritative state has been held, in frames
    pub frames_in_state: u64,
}

#[derive(Clone, Debug)]
pub struct TemporalSmoother {
    window: VecDeque<(MovementState, f64)>,
    capacity: usize,
    hysteresis_frames: usize,
    min_state_duration: u64,
    current: Option<MovementState>,
    pending: Option<PendingChange>,
}

impl TemporalSmoother {
    pub fn new(thresholds: &ThresholdSet) -> Self {
        Self {
            window: VecDeque::with_capacity(thresholds.window_size),
            capacity: thresholds.window_size.max(1),
            hysteresis_frames: thresholds.hysteresis_frames.max(1),
            min_state_duration: u64::from(thresholds.min_state_duration_frames),
            current: None,
            pending: None,
        }
    }

    /// Smoothed state, `None` before the first sample.
    pub fn current(&self) -> Option<MovementState> {
        self.current
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.current = None;
        self.pending = None;
    }

    pub fn smooth(&mut self, input: SmootherInput) -> SmoothedClassification {
        // Step 1
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        let confidence = if input.confidence.is_finite() {
            input.confidence
        } else {
            0.0
        };
        self.window.push_back((input.state, confidence));

        // Step 2
        let votes = self.tally();
        let majority = self.majority(&votes);

        // Steps 3-5
        let mut hysteresis_passed = false;
        let mut early = false;
        let state = match self.current {
            None => {
                self.current = Some(majority);
                hysteresis_passed = true;
                majority
            }
            Some(current) if current == majority => {
                self.pending = None;
                current
            }
            Some(current) => {
                let consecutive = match self.pending {
                    Some(p) if p.candidate == majority => p.consecutive + 1,
                    _ => 1,
                };
                if consecutive >= self.hysteresis_frames {
                    self.pending = None;
                    self.current = Some(majority);
                    hysteresis_passed = true;
                    early = input.frames_in_state < self.min_state_duration;
                    majority
                } else {
                    self.pending = Some(PendingChange {
                        candidate: majority,
                        consecutive,
                    });
                    current
                }
            }
        };

        let agreeing = self.window.iter().filter(|(s, _)| *s == state).count();
        SmoothedClassification {
            state,
            majority,
            votes,
            agreement: agreeing as f64 / self.window.len() as f64,
            hysteresis_passed,
            pending: self.pending,
            early,
        }
    }

    fn tally(&self) -> [f64; 5] {
        let mut votes = [0.0; 5];
        for (state, confidence) in &self.window {
            votes[state.index()] += confidence.max(MIN_VOTE_WEIGHT);
        }
        votes
    }

    fn majority(&self, votes: &[f64; 5]) -> MovementState {
        let best = votes.iter().copied().fold(0.0, f64::max);
        // Newest first: the most recent sample among the tied states decides
        self.window
            .iter()
            .rev()
            .map(|(s, _)| *s)
            .find(|s| (votes[s.index()] - best).abs() <= TIE_EPSILON)
            .unwrap_or(MovementState::Idle)
    }
}

impl Stage<SmootherInput> for TemporalSmoother {
    type Out = SmoothedClassification;

    fn process(&mut self, input: SmootherInput) -> Result<SmoothedClassification, StageError> {
        Ok(self.smooth(input))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use MovementState::*;

    fn smoother(window: usize, hysteresis: usize) -> TemporalSmoother {
        TemporalSmoother::new(&ThresholdSet {
            window_size: window,
            hysteresis_frames: hysteresis,
            ..Default::default()
        })
    }

    fn feed(s: &mut TemporalSmoother, states: &[MovementState]) -> Vec<MovementState> {
        states
            .iter()
            .map(|&state| {
                s.smooth(SmootherInput {
                    state,
                    confidence: 0.8,
                    frames_in_state: 100,
                })
                .state
            })
            .collect()
    }

    #[test]
    fn alternating_input_is_held_until_majority_persists() {
        let mut s = smoother(7, 2);
        let out = feed(&mut s, &[Walking, Running, Walking, Running, Walking, Running, Running]);
        assert_eq!(out, vec![Walking, Walking, Walking, Walking, Walking, Walking, Running]);
    }

    #[test]
    fn first_frame_adopts_majority() {
        let mut s = smoother(5, 3);
        let r = s.smooth(SmootherInput {
            state: Running,
            confidence: 0.9,
            frames_in_state: 0,
        });
        assert_eq!(r.state, Running);
        assert!(r.hysteresis_passed);
        assert_abs_diff_eq!(r.agreement, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn tie_goes_to_most_recent_sample() {
        let mut s = smoother(4, 5);
        feed(&mut s, &[Idle, Walking]);
        let r = s.smooth(SmootherInput {
            state: Idle,
            confidence: 0.8,
            frames_in_state: 10,
        });
        assert_eq!(r.majority, Idle);
        let r = s.smooth(SmootherInput {
            state: Walking,
            confidence: 0.8,
            frames_in_state: 10,
        });
        assert_eq!(r.majority, Walking);
        assert_eq!(
            r.pending,
            Some(PendingChange {
                candidate: Walking,
                consecutive: 1
            })
        );
    }

    #[test]
    fn low_confidence_votes_are_floored() {
        let mut s = smoother(3, 1);
        s.smooth(SmootherInput {
            state: Idle,
            confidence: 0.0,
            frames_in_state: 10,
        });
        let r = s.smooth(SmootherInput {
            state: Walking,
            confidence: 0.05,
            frames_in_state: 10,
        });
        assert_abs_diff_eq!(r.votes[Idle.index()], MIN_VOTE_WEIGHT, epsilon = 1e-12);
        assert_abs_diff_eq!(r.votes[Walking.index()], MIN_VOTE_WEIGHT, epsilon = 1e-12);
    }

    #[test]
    fn confident_minority_can_outvote() {
        let mut s = smoother(3, 1);
        for (state, confidence) in [(Walking, 0.2), (Walking, 0.2), (Running, 0.9)] {
            s.smooth(SmootherInput {
                state,
                confidence,
                frames_in_state: 10,
            });
        }
        assert_eq!(s.current(), Some(Running));
    }

    #[test]
    fn young_state_change_is_flagged_early() {
        let mut s = smoother(3, 1);
        s.smooth(SmootherInput {
            state: Idle,
            confidence: 0.8,
            frames_in_state: 0,
        });
        // Tie with the newest sample winning, so the change passes immediately
        let r = s.smooth(SmootherInput {
            state: Walking,
            confidence: 0.8,
            frames_in_state: 1,
        });
        assert_eq!(r.state, Walking);
        assert!(r.hysteresis_passed);
        assert!(r.early);
        let r = s.smooth(SmootherInput {
            state: Walking,
            confidence: 0.8,
            frames_in_state: 2,
        });
        assert!(!r.early);
    }

    #[test]
    fn window_is_bounded() {
        let mut s = smoother(3, 1);
        feed(&mut s, &[Idle; 10]);
        assert_eq!(s.len(), 3);
        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.current(), None);
    }
}
