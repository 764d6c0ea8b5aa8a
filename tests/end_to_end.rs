//! End-to-End Run Tests
//!
//! Full combination runs over result files on disk: output files, the run
//! manifest and decision log replay.

use std::path::{Path, PathBuf};

use elrover::config::{load_config, SettingsOverrides};
use elrover::core::CombinationSettings;
use elrover::domain::SelectionReason;
use elrover::io::reader::HEADER_PREFIX;
use elrover::io::{DecisionLog, RunManifest, TsvResultFile};
use elrover::CombineRun;
use tempfile::TempDir;

const CONFIG: &str = r#"
version: "1.0"
combination:
  scheme: small
  mention_selection: votes
linker_order: [A, B, C]
exclusive:
  - [A, A2]
schemes:
  small:
    rank_spacer: -1.75
    ranked: [A, B, C]
    weights:
      sam: { A: 0.6, B: 0.5, C: 0.45, A2: 0.6 }
    min_confidence:
      C: { sam: 0.3 }
"#;

struct Fixture {
    temp: TempDir,
    config_path: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let elrover_dir = temp.path().join(".elrover");
        std::fs::create_dir_all(&elrover_dir).unwrap();

        let config_path = elrover_dir.join("config.yaml");
        std::fs::write(&config_path, CONFIG).unwrap();

        write_results(
            temp.path(),
            "A",
            &[
                "d1\tObama\t7\t13\tObama_(surname)\tA\t0.9",
                "d2\tParis\t0\t5\tParis\tA\t0.9",
                "d2\tbad\t9\t4\tBad\tA\t0.9",
            ],
        );
        write_results(temp.path(), "B", &["d1\tBarack Obama\t0\t13\tBarack_Obama\tB\t0.8"]);
        write_results(
            temp.path(),
            "C",
            &[
                "d1\tBarack Obama\t0\t13\tBarack Obama\tC\t0.7",
                "d2\tRome\t10\t14\tRome\tC\t0.1",
            ],
        );

        Self { temp, config_path }
    }

    fn settings(&self, use_confidence: bool) -> CombinationSettings {
        let overrides = SettingsOverrides {
            use_confidence,
            ..Default::default()
        };
        load_config(Some(&self.config_path))
            .unwrap()
            .settings(&overrides)
            .unwrap()
    }

    fn sources(&self, services: &[&str]) -> Vec<TsvResultFile> {
        services
            .iter()
            .map(|s| TsvResultFile::new(*s, self.temp.path().join(format!("{}.tsv", s))))
            .collect()
    }

    fn out_dir(&self) -> PathBuf {
        self.temp.path().join("out")
    }
}

fn write_results(dir: &Path, service: &str, rows: &[&str]) {
    let mut content = format!("{}link\tservice\tconfidence\n", HEADER_PREFIX);
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    std::fs::write(dir.join(format!("{}.tsv", service)), content).unwrap();
}

#[tokio::test]
async fn test_run_writes_selected_and_neleval() {
    let fixture = Fixture::new();
    let run = CombineRun::new(fixture.sources(&["C", "A", "B"]), fixture.out_dir(), "combined");

    let manifest = run.execute(&fixture.settings(false)).await.unwrap();

    let selected = std::fs::read_to_string(fixture.out_dir().join("selected.tsv")).unwrap();
    assert_eq!(
        selected,
        "d1\tBarack Obama\t0\t13\tBarack_Obama\t0.8\tB\tHigherBeatsBest\tB|C\tB:C\n\
         d2\tParis\t0\t5\tParis\t0.9\tA\tBestAlone\tA\tA\n"
    );

    let neleval = std::fs::read_to_string(fixture.out_dir().join("combined_neleval")).unwrap();
    assert_eq!(neleval, "d1\t0\t13\tBarack_Obama\nd2\t0\t5\tParis\n");

    assert_eq!(manifest.counts.documents, 2);
    assert_eq!(manifest.counts.clusters, 3);
    assert_eq!(manifest.counts.selected, 2);
    assert_eq!(manifest.counts.rejected, 1);
    assert_eq!(manifest.best_service, "A");
    assert!(manifest.finished_at.is_some());
}

#[tokio::test]
async fn test_manifest_records_inputs_in_linker_order() {
    let fixture = Fixture::new();
    let run = CombineRun::new(fixture.sources(&["C", "B", "A"]), fixture.out_dir(), "combined");
    run.execute(&fixture.settings(false)).await.unwrap();

    let manifest = RunManifest::load(&fixture.out_dir().join("manifest.json")).await.unwrap();
    let services: Vec<&str> = manifest.inputs.iter().map(|i| i.service.as_str()).collect();
    assert_eq!(services, vec!["A", "B", "C"]);
    assert!(manifest.inputs.iter().all(|i| i.digest.starts_with("sha256:")));
    assert_eq!(manifest.inputs[0].records, 3);
    assert_eq!(manifest.scheme, "small");
}

#[tokio::test]
async fn test_confidence_filter_drops_low_rows() {
    let fixture = Fixture::new();
    let run = CombineRun::new(fixture.sources(&["A", "B", "C"]), fixture.out_dir(), "combined");

    let manifest = run.execute(&fixture.settings(true)).await.unwrap();

    // Rome (C, 0.1) falls below C's 0.3 threshold
    assert_eq!(manifest.counts.clusters, 2);
    assert_eq!(manifest.inputs[2].records, 1);
    assert_eq!(manifest.counts.selected, 2);
}

#[tokio::test]
async fn test_decision_log_replays_every_cluster() {
    let fixture = Fixture::new();
    let run = CombineRun::new(fixture.sources(&["A", "B", "C"]), fixture.out_dir(), "combined");
    let manifest = run.execute(&fixture.settings(false)).await.unwrap();

    let log = DecisionLog::new(fixture.out_dir().join("decisions.jsonl"));
    let records = log.replay().await.unwrap();

    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.run_id == manifest.run_id));

    let obama = &records[0];
    assert_eq!(obama.document_id, "d1");
    assert_eq!(obama.reason, Some(SelectionReason::HigherBeatsBest));
    assert_eq!(obama.reason_code.as_deref(), Some("HgtB"));
    assert!(obama.render().contains("== **SEL_HgtB LinkGroup [Barack_Obama] =="));
    assert!(obama.render().contains("== __REJ LinkGroup [Obama_(surname)] =="));

    let rome = records
        .iter()
        .find(|r| r.members.iter().any(|m| m.surface == "Rome"))
        .unwrap();
    assert!(rome.selected.is_none());
    assert!(rome.render().contains("==== SelectedLinkGroup ====: 0"));
}

#[tokio::test]
async fn test_rerun_replaces_decision_log() {
    let fixture = Fixture::new();
    let run = CombineRun::new(fixture.sources(&["A", "B", "C"]), fixture.out_dir(), "combined");
    let settings = fixture.settings(false);

    run.execute(&settings).await.unwrap();
    let second = run.execute(&settings).await.unwrap();

    let records = DecisionLog::new(fixture.out_dir().join("decisions.jsonl"))
        .replay()
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.run_id == second.run_id));
}

#[tokio::test]
async fn test_individual_dumps() {
    let fixture = Fixture::new();
    let run = CombineRun::new(fixture.sources(&["A", "B", "C"]), fixture.out_dir(), "combined")
        .with_individual_dumps(true);
    run.execute(&fixture.settings(false)).await.unwrap();

    let dump = fixture.out_dir().join("individual").join("combined_C_neleval");
    let content = std::fs::read_to_string(dump).unwrap();
    // Individual dumps always apply the service's threshold
    assert_eq!(content, "d1\t0\t13\tBarack_Obama\n");
}

#[tokio::test]
async fn test_missing_service_fails_before_writing() {
    let fixture = Fixture::new();
    let run = CombineRun::new(fixture.sources(&["A", "B"]), fixture.out_dir(), "combined");

    let err = run.execute(&fixture.settings(false)).await.unwrap_err();
    assert!(format!("{:#}", err).contains("expects 3"));
    assert!(!fixture.out_dir().exists());
}

#[tokio::test]
async fn test_exclusive_services_rejected() {
    let fixture = Fixture::new();
    write_results(fixture.temp.path(), "A2", &["d1\tObama\t7\t13\tBarack_Obama\tA2\t0.9"]);
    let run = CombineRun::new(fixture.sources(&["A", "A2", "B"]), fixture.out_dir(), "combined");

    let err = run.execute(&fixture.settings(false)).await.unwrap_err();
    assert!(format!("{:#}", err).contains("A2"));
}
