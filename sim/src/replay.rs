//! Replay: serialize/deserialize simulation logs and score a classifier run
//! against the recorded ground truth.

use movement_core::{
    metrics::ClassificationMetrics,
    record::{ClassificationRecord, SessionStatistics},
    types::{EntityId, FrameInput, MovementState},
    Classifier,
};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded simulation log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub fps: f64,
    pub players: Vec<PlayerLog>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerLog {
    pub entity: EntityId,
    /// Classifier inputs for every detected frame, in frame order
    pub frames: Vec<FrameInput>,
    /// True state of every frame, indexed by frame number
    pub truth: Vec<MovementState>,
    /// Tracked path length (m)
    #[serde(default)]
    pub distance_m: f64,
    /// Highest plausible tracked speed (m/s)
    #[serde(default)]
    pub top_speed: Option<f64>,
}

/// Outcome of replaying one player through a classifier.
#[derive(Clone, Debug, Serialize)]
pub struct PlayerReport {
    pub entity: EntityId,
    pub metrics: ClassificationMetrics,
    pub accuracy: f64,
    pub distance_m: f64,
    pub top_speed: Option<f64>,
    pub statistics: Option<SessionStatistics>,
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}

/// Score records against per-frame truth labels.
///
/// Records whose frame has no label are skipped.
pub fn score_records(records: &[ClassificationRecord], truth: &[MovementState]) -> ClassificationMetrics {
    let (predicted, expected): (Vec<_>, Vec<_>) = records
        .iter()
        .filter_map(|r| truth.get(r.frame as usize).map(|&t| (r.state, t)))
        .unzip();
    ClassificationMetrics::evaluate(&predicted, &expected)
}

/// Feed every player of `log` through `classifier` and score the output.
///
/// Players are processed in parallel; each keeps its own session.
pub fn run_replay(log: &ReplayLog, classifier: &Classifier) -> Vec<PlayerReport> {
    let batches: Vec<(EntityId, Vec<FrameInput>)> =
        log.players.iter().map(|p| (p.entity, p.frames.clone())).collect();
    let results = classifier.classify_entities(&batches);

    log.players
        .iter()
        .zip(results)
        .map(|(player, (entity, records))| {
            let metrics = score_records(&records, &player.truth);
            PlayerReport {
                entity,
                accuracy: metrics.accuracy(),
                metrics,
                distance_m: player.distance_m,
                top_speed: player.top_speed,
                statistics: classifier.get_statistics(entity),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{Scenario, ScenarioKind};
    use movement_core::ClassifierConfig;

    #[test]
    fn save_and_load_preserve_log() {
        let log = Scenario::build(ScenarioKind::FastBreak, 5).simulate(15);
        let path = std::env::temp_dir().join(format!("movetrack_replay_{}.json", std::process::id()));
        save_replay(&log, &path).unwrap();
        let loaded = load_replay(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.scenario_name, "fast_break");
        assert_eq!(loaded.players.len(), 1);
        assert_eq!(loaded.players[0].truth, log.players[0].truth);
        assert_eq!(loaded.players[0].frames.len(), log.players[0].frames.len());
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(load_replay(Path::new("/nonexistent/replay.json")).is_err());
    }

    #[test]
    fn score_skips_unlabelled_frames() {
        let truth = vec![MovementState::Idle, MovementState::Walking];
        let records = vec![
            ClassificationRecord::failed(EntityId(1), 0, 0.0, MovementState::Idle, movement_core::InvalidInput::MissingSpeed),
            ClassificationRecord::failed(EntityId(1), 1, 0.1, MovementState::Idle, movement_core::InvalidInput::MissingSpeed),
            ClassificationRecord::failed(EntityId(1), 7, 0.2, MovementState::Idle, movement_core::InvalidInput::MissingSpeed),
        ];
        let m = score_records(&records, &truth);
        assert_eq!(m.n_frames, 2);
        assert_eq!(m.n_correct, 1);
    }

    #[test]
    fn fast_break_replay_is_mostly_correct() {
        let log = Scenario::build(ScenarioKind::FastBreak, 3).simulate(15);
        let classifier = Classifier::new(ClassifierConfig::default()).unwrap();
        let reports = run_replay(&log, &classifier);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert!(report.accuracy > 0.7, "accuracy {}", report.accuracy);
        let stats = report.statistics.as_ref().unwrap();
        assert_eq!(stats.frame_count, log.players[0].frames.len() as u64);
        assert_eq!(report.distance_m, log.players[0].distance_m);
        assert!(report.top_speed.is_some());
    }
}
