//! Classification orchestrator: session registry and the public entry points.
//!
//! # Processing per frame
//! 1. Look up the entity's session (created on first use, capped by
//!    `max_sessions`)
//! 2. Lock that session only; other entities proceed independently
//! 3. Run the session's stage chain and return its record
//!
//! Batches for many entities run in parallel with rayon, one task per entity,
//! and return results in input order.

use crate::{
    error::{ConfigError, InvalidInput},
    record::{ClassificationRecord, SessionStatistics, Timeline},
    session::{Session, SessionLimits},
    state_machine::{transition_table, TableRow},
    thresholds::ThresholdSet,
    types::{EntityId, FrameInput, KinematicsSource},
};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, ops::RangeInclusive, sync::Arc};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub thresholds: ThresholdSet,
    /// Forbid `Running -> Idle` without passing through `Walking`
    pub strict_mode: bool,
    /// Maximum number of live sessions
    pub max_sessions: usize,
    /// Records retained per session for timeline export
    pub record_capacity: usize,
    /// Transition events retained per session
    pub transition_log_capacity: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdSet::default(),
            strict_mode: true,
            max_sessions: 256,
            record_capacity: 10_000, // ~5.5 min @ 30 fps
            transition_log_capacity: 1_000,
        }
    }
}

/// Serializable snapshot of the active configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedConfig {
    pub thresholds: ThresholdSet,
    pub strict_mode: bool,
    pub max_sessions: usize,
    pub transition_table: Vec<TableRow>,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

type SessionHandle = Arc<Mutex<Session>>;

/// Movement-state classifier for any number of entities.
pub struct Classifier {
    config: ClassifierConfig,
    thresholds: Arc<ThresholdSet>,
    sessions: RwLock<HashMap<EntityId, SessionHandle>>,
}

impl Classifier {
    /// Validate the thresholds and build an empty classifier.
    pub fn new(config: ClassifierConfig) -> Result<Self, ConfigError> {
        config.thresholds.validate()?;
        if config.max_sessions == 0 {
            return Err(ConfigError::TooSmall {
                field: "max_sessions",
                min: 1,
                value: 0,
            });
        }
        Ok(Self {
            thresholds: Arc::new(config.thresholds.clone()),
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    fn limits(&self) -> SessionLimits {
        SessionLimits {
            record_capacity: self.config.record_capacity,
            transition_log_capacity: self.config.transition_log_capacity,
        }
    }

    fn session(&self, entity: EntityId) -> Option<SessionHandle> {
        self.sessions.read().get(&entity).cloned()
    }

    fn session_or_create(&self, entity: EntityId) -> Result<SessionHandle, InvalidInput> {
        if let Some(handle) = self.session(entity) {
            return Ok(handle);
        }
        let mut sessions = self.sessions.write();
        if let Some(handle) = sessions.get(&entity) {
            return Ok(Arc::clone(handle));
        }
        if sessions.len() >= self.config.max_sessions {
            warn!(%entity, max = self.config.max_sessions, "session capacity exhausted");
            return Err(InvalidInput::SessionCapacity);
        }
        info!(%entity, preset = %self.thresholds.preset, "session created");
        let handle = Arc::new(Mutex::new(Session::new(
            entity,
            Arc::clone(&self.thresholds),
            self.config.strict_mode,
            self.limits(),
        )));
        sessions.insert(entity, Arc::clone(&handle));
        Ok(handle)
    }

    /// Classify one frame of one entity. Never fails.
    pub fn classify_frame(&self, entity: EntityId, input: &FrameInput) -> ClassificationRecord {
        match self.session_or_create(entity) {
            Ok(handle) => handle.lock().classify(input),
            Err(reason) => ClassificationRecord::failed(
                entity,
                input.frame,
                input.timestamp,
                Default::default(),
                reason,
            ),
        }
    }

    /// Pull kinematics from a provider, then classify.
    pub fn classify_with_source<S: KinematicsSource + ?Sized>(
        &self,
        entity: EntityId,
        frame: u64,
        timestamp: f64,
        source: &S,
        silhouette_height: Option<f64>,
    ) -> ClassificationRecord {
        let kinematics = source.kinematics_at(entity, frame).unwrap_or_default();
        self.classify_frame(
            entity,
            &FrameInput::new(frame, timestamp, kinematics, silhouette_height),
        )
    }

    /// Same as calling [`Classifier::classify_frame`] once per frame, in order.
    pub fn classify_batch(&self, entity: EntityId, frames: &[FrameInput]) -> Vec<ClassificationRecord> {
        let handle = match self.session_or_create(entity) {
            Ok(handle) => handle,
            Err(reason) => {
                return frames
                    .iter()
                    .map(|f| {
                        ClassificationRecord::failed(
                            entity,
                            f.frame,
                            f.timestamp,
                            Default::default(),
                            reason,
                        )
                    })
                    .collect()
            }
        };
        let mut session = handle.lock();
        frames.iter().map(|f| session.classify(f)).collect()
    }

    /// Batches for several entities, processed in parallel.
    ///
    /// Results come back in input order. Batches sharing an entity id run on
    /// the same task, one after another in input order.
    pub fn classify_entities(
        &self,
        batches: &[(EntityId, Vec<FrameInput>)],
    ) -> Vec<(EntityId, Vec<ClassificationRecord>)> {
        let mut groups: Vec<(EntityId, Vec<usize>)> = Vec::new();
        let mut slots: HashMap<EntityId, usize> = HashMap::new();
        for (i, (entity, _)) in batches.iter().enumerate() {
            let g = *slots.entry(*entity).or_insert_with(|| {
                groups.push((*entity, Vec::new()));
                groups.len() - 1
            });
            groups[g].1.push(i);
        }

        let processed: Vec<Vec<(usize, Vec<ClassificationRecord>)>> = groups
            .par_iter()
            .map(|(entity, indices)| {
                indices
                    .iter()
                    .map(|&i| (i, self.classify_batch(*entity, &batches[i].1)))
                    .collect()
            })
            .collect();

        let mut out: Vec<Vec<ClassificationRecord>> = vec![Vec::new(); batches.len()];
        for (i, records) in processed.into_iter().flatten() {
            out[i] = records;
        }
        batches.iter().map(|(entity, _)| *entity).zip(out).collect()
    }

    /// Records of `entity` whose frame index lies in `range`.
    pub fn export_timeline(&self, entity: EntityId, range: RangeInclusive<u64>) -> Option<Timeline> {
        self.session(entity).map(|h| h.lock().timeline(range))
    }

    pub fn get_statistics(&self, entity: EntityId) -> Option<SessionStatistics> {
        self.session(entity).map(|h| h.lock().statistics())
    }

    /// Clear an entity's history. Returns `false` if it had no session.
    pub fn reset(&self, entity: EntityId) -> bool {
        match self.session(entity) {
            Some(handle) => {
                handle.lock().reset();
                info!(%entity, "session reset");
                true
            }
            None => false,
        }
    }

    /// Destroy an entity's session. Returns `false` if it had none.
    pub fn remove(&self, entity: EntityId) -> bool {
        let removed = self.sessions.write().remove(&entity).is_some();
        if removed {
            info!(%entity, "session removed");
        }
        removed
    }

    /// Entities with a live session, sorted.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn export_config(&self) -> ExportedConfig {
        ExportedConfig {
            thresholds: (*self.thresholds).clone(),
            strict_mode: self.config.strict_mode,
            max_sessions: self.config.max_sessions,
            transition_table: transition_table(self.config.strict_mode),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::InvalidInput,
        record::FrameQuality,
        state_machine::allows,
        thresholds::Preset,
        types::{KinematicsSnapshot, MovementState},
    };
    use approx::assert_abs_diff_eq;

    const STANDING: f64 = 1.8;

    fn frame(i: u64, speed: f64, height: f64) -> FrameInput {
        FrameInput::new(
            i,
            i as f64 / 30.0,
            KinematicsSnapshot::complete(speed, speed, 0.0),
            Some(height),
        )
    }

    /// Each speed held for `hold` frames, standing silhouette.
    fn profile(speeds: &[f64], hold: u64) -> Vec<FrameInput> {
        speeds
            .iter()
            .enumerate()
            .flat_map(|(k, &s)| {
                (0..hold).map(move |j| frame(k as u64 * hold + j, s, STANDING))
            })
            .collect()
    }

    fn classifier(strict: bool) -> Classifier {
        Classifier::new(ClassifierConfig {
            strict_mode: strict,
            ..Default::default()
        })
        .unwrap()
    }

    fn assert_valid_path(records: &[ClassificationRecord], strict: bool) {
        for pair in records.windows(2) {
            let (a, b) = (pair[0].state, pair[1].state);
            assert!(allows(a, b, strict), "illegal transition {a} -> {b}");
            assert!(!(a == MovementState::Jumping && b == MovementState::Running));
        }
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let config = ClassifierConfig {
            thresholds: ThresholdSet {
                run_speed_min: -1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(Classifier::new(config).is_err());
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let frames = profile(&[0.2, 1.5, 5.0, 6.0, 1.0, 0.1], 15);
        let a = classifier(true).classify_batch(EntityId(1), &frames);
        let b = classifier(true).classify_batch(EntityId(1), &frames);
        assert_eq!(a, b);
    }

    #[test]
    fn batch_matches_single_calls() {
        let frames = profile(&[0.2, 1.5, 5.0], 12);
        let c1 = classifier(true);
        let batch = c1.classify_batch(EntityId(1), &frames);
        let c2 = classifier(true);
        let single: Vec<_> = frames
            .iter()
            .map(|f| c2.classify_frame(EntityId(1), f))
            .collect();
        assert_eq!(batch, single);
    }

    #[test]
    fn raw_states_follow_speed_bands() {
        let frames = profile(&[0.2, 0.3, 2.5, 6.0, 6.5, 0.1], 10);
        let records = classifier(true).classify_batch(EntityId(1), &frames);
        let raw: Vec<_> = [5usize, 15, 25, 35, 45, 55]
            .iter()
            .map(|&i| records[i].raw_state)
            .collect();
        use MovementState::*;
        assert_eq!(
            raw,
            vec![Some(Idle), Some(Idle), Some(Walking), Some(Running), Some(Running), Some(Idle)]
        );
    }

    #[test]
    fn strict_mode_never_stops_dead_from_running() {
        let frames = profile(&[0.2, 1.5, 6.0, 6.5, 0.1], 20);
        let records = classifier(true).classify_batch(EntityId(1), &frames);
        assert_valid_path(&records, true);
        let states: Vec<_> = records.iter().map(|r| r.state).collect();
        assert!(states.contains(&MovementState::Running));
        assert_eq!(states.last(), Some(&MovementState::Idle));
        for w in states.windows(2) {
            assert!(!(w[0] == MovementState::Running && w[1] == MovementState::Idle));
        }
    }

    #[test]
    fn relaxed_mode_allows_direct_stop_at_lower_confidence() {
        let frames = profile(&[0.2, 1.5, 6.0, 6.5, 0.1], 20);
        let records = classifier(false).classify_batch(EntityId(1), &frames);
        assert_valid_path(&records, false);
        let stop = records
            .windows(2)
            .find(|w| w[0].state == MovementState::Running && w[1].state == MovementState::Idle)
            .map(|w| &w[1])
            .expect("direct stop");
        assert!(stop.confidence <= 0.5);
    }

    #[test]
    fn single_shrink_frame_is_raw_jump() {
        let mut frames = profile(&[5.0], 20);
        frames[10].silhouette_height = Some(STANDING * 0.85);
        let records = classifier(true).classify_batch(EntityId(1), &frames);
        assert_eq!(records[10].raw_state, Some(MovementState::Jumping));
        // One frame is not enough to convince the smoother
        assert_ne!(records[10].state, MovementState::Jumping);
    }

    #[test]
    fn jump_requires_silhouette_evidence() {
        let frames = profile(&[6.0], 80);
        let records = classifier(true).classify_batch(EntityId(1), &frames);
        assert!(records.iter().all(|r| r.state != MovementState::Jumping));
    }

    #[test]
    fn sustained_jump_is_recognised_and_lands() {
        // Running at 6 m/s, then a 14-frame jump with a 20 % shrink
        let mut frames = profile(&[1.5, 6.0], 30);
        let base = frames.len() as u64;
        for j in 0..14 {
            frames.push(frame(base + j, 6.0, STANDING * 0.8));
        }
        for j in 14..40 {
            frames.push(frame(base + j, 6.0, STANDING));
        }
        let records = classifier(true).classify_batch(EntityId(1), &frames);
        assert_valid_path(&records, true);
        let states: Vec<_> = records.iter().map(|r| r.state).collect();
        let jump = states.iter().position(|&s| s == MovementState::Jumping).unwrap();
        assert!(states[jump..].contains(&MovementState::Landing));
        assert_eq!(states.last(), Some(&MovementState::Running));
    }

    #[test]
    fn confidence_stays_bounded() {
        let frames = profile(&[0.0, 0.45, 2.9, 3.1, 11.0, 15.0, 0.3], 10);
        let records = classifier(false).classify_batch(EntityId(1), &frames);
        assert!(records
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.confidence) && !r.confidence.is_nan()));
    }

    #[test]
    fn statistics_and_timeline() {
        let c = classifier(true);
        let frames = profile(&[1.5], 40);
        c.classify_batch(EntityId(4), &frames);
        let stats = c.get_statistics(EntityId(4)).unwrap();
        assert_eq!(stats.frame_count, 40);
        assert_eq!(stats.invalid_input_frames, 1);
        assert_eq!(stats.state_counts.total(), 39);
        assert_eq!(stats.current_state, MovementState::Walking);
        assert_abs_diff_eq!(
            stats.valid_transition_rate + stats.invalid_transition_rate,
            1.0,
            epsilon = 1e-12
        );

        let tl = c.export_timeline(EntityId(4), 10..=19).unwrap();
        assert_eq!(tl.frames.len(), 10);
        assert_eq!(tl.preset, Preset::Default);
        assert!(tl.states().iter().all(|&s| s == MovementState::Walking));
        assert!(c.export_timeline(EntityId(99), 0..=10).is_none());
    }

    #[test]
    fn reset_and_remove() {
        let c = classifier(true);
        let frames = profile(&[0.2, 1.5, 6.0], 10);
        let first = c.classify_batch(EntityId(1), &frames);
        c.classify_batch(EntityId(2), &profile(&[1.5], 20));
        assert_eq!(c.entity_ids(), vec![EntityId(1), EntityId(2)]);

        assert!(c.reset(EntityId(1)));
        assert!(c.reset(EntityId(1)));
        let stats = c.get_statistics(EntityId(1)).unwrap();
        assert_eq!(stats.frame_count, 0);
        assert_eq!(stats.current_state, MovementState::Idle);
        assert_eq!(c.classify_batch(EntityId(1), &frames), first);

        assert!(c.remove(EntityId(2)));
        assert!(!c.remove(EntityId(2)));
        assert!(c.get_statistics(EntityId(2)).is_none());
        assert_eq!(c.entity_ids(), vec![EntityId(1)]);
    }

    #[test]
    fn session_cap_yields_failed_records() {
        let c = Classifier::new(ClassifierConfig {
            max_sessions: 1,
            ..Default::default()
        })
        .unwrap();
        c.classify_frame(EntityId(1), &frame(0, 1.0, STANDING));
        let r = c.classify_frame(EntityId(2), &frame(0, 1.0, STANDING));
        assert_eq!(r.quality, FrameQuality::Invalid(InvalidInput::SessionCapacity));
        assert_eq!(c.entity_ids(), vec![EntityId(1)]);
    }

    #[test]
    fn repeated_entity_batches_run_in_input_order() {
        let frames = profile(&[0.2, 1.5, 6.0, 0.2], 12);
        let (head, tail) = frames.split_at(20);
        let c = classifier(true);
        let out = c.classify_entities(&[
            (EntityId(1), head.to_vec()),
            (EntityId(2), profile(&[1.5], 10)),
            (EntityId(1), tail.to_vec()),
        ]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].0, EntityId(1));
        assert_eq!(out[2].0, EntityId(1));
        assert_eq!((out[0].1.len(), out[2].1.len()), (20, frames.len() - 20));

        let expected = classifier(true).classify_batch(EntityId(1), &frames);
        let joined: Vec<_> = out[0].1.iter().chain(&out[2].1).cloned().collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn parallel_entities_match_sequential() {
        let a = profile(&[0.2, 1.5, 6.0], 15);
        let b = profile(&[1.5, 0.2], 20);
        let batches = vec![(EntityId(7), a.clone()), (EntityId(3), b.clone())];
        let parallel = classifier(true).classify_entities(&batches);
        assert_eq!(parallel[0].0, EntityId(7));
        assert_eq!(parallel[1].0, EntityId(3));

        let seq = classifier(true);
        assert_eq!(parallel[0].1, seq.classify_batch(EntityId(7), &a));
        assert_eq!(parallel[1].1, seq.classify_batch(EntityId(3), &b));
    }

    struct Fixed(Option<KinematicsSnapshot>);

    impl KinematicsSource for Fixed {
        fn kinematics_at(&self, _: EntityId, _: u64) -> Option<KinematicsSnapshot> {
            self.0
        }
    }

    #[test]
    fn provider_without_data_is_missing_speed() {
        let c = classifier(true);
        c.classify_with_source(EntityId(1), 0, 0.0, &Fixed(None), Some(STANDING));
        let r = c.classify_with_source(EntityId(1), 1, 0.033, &Fixed(None), Some(STANDING));
        assert_eq!(r.quality, FrameQuality::Invalid(InvalidInput::MissingSpeed));
        let r = c.classify_with_source(
            EntityId(1),
            2,
            0.066,
            &Fixed(Some(KinematicsSnapshot::speed_only(1.0))),
            Some(STANDING),
        );
        assert!(r.is_valid());
    }

    #[test]
    fn exported_config_carries_table() {
        let cfg = classifier(false).export_config();
        assert!(!cfg.strict_mode);
        let running = &cfg.transition_table[MovementState::Running.index()];
        assert!(running.to.contains(&MovementState::Idle));
        assert!(serde_json::to_string(&cfg).is_ok());
    }
}
