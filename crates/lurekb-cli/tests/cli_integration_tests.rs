//! CLI integration tests for lurekb
//!
//! Tests the lurekb CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a command isolated in `home`, with no embedding backend
#[allow(deprecated)]
fn lurekb_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lurekb").unwrap();
    cmd.current_dir(home.path());
    cmd.env("LUREKB_DATA_DIR", home.path().join("data"));
    cmd.env("LUREKB_CONFIG_DIR", home.path().join("config"));
    cmd.env_remove("LUREKB_EMBEDDING_API_KEY");
    cmd.env_remove("OPENAI_API_KEY");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn add_record(home: &TempDir, category: &str, record: &str) {
    lurekb_cmd(home)
        .args(["add", category, "--json", record])
        .assert()
        .success();
}

#[test]
fn test_add_creates_then_merges() {
    let home = TempDir::new().unwrap();
    let record = r#"{"name": "Mandarin fish", "aliases": ["Chinese perch"], "habits": "Ambush predator"}"#;

    lurekb_cmd(&home)
        .args(["add", "fish", "--json", record])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added fish 'Mandarin fish' (v1"));

    lurekb_cmd(&home)
        .args(["add", "fish", "--json", record])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated fish 'Mandarin fish' (v2"));

    assert!(home.path().join("data").join("knowledge.json").exists());
    assert!(home.path().join("data").join("knowledge_versions.json").exists());
}

#[test]
fn test_add_json_output() {
    let home = TempDir::new().unwrap();

    lurekb_cmd(&home)
        .args([
            "add",
            "lure",
            "--json",
            r#"{"name": "Spoon"}"#,
            "--source",
            "llm_generated",
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"created\""))
        .stdout(predicate::str::contains("\"confidence\": 0.6"));
}

#[test]
fn test_add_batch_from_file() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("rigs.json");
    std::fs::write(
        &file,
        r#"[{"name": "Texas rig"}, {"components": ["hook"]}, {"name": "Drop shot"}]"#,
    )
    .unwrap();

    lurekb_cmd(&home)
        .args(["add", "rig", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 added, 0 updated, 1 rejected"));
}

#[test]
fn test_add_rejects_record_without_name() {
    let home = TempDir::new().unwrap();

    lurekb_cmd(&home)
        .args(["add", "fish", "--json", r#"{"habits": "Schools"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001"))
        .stderr(predicate::str::contains("lurekb schema fish"));
}

#[test]
fn test_unknown_category() {
    let home = TempDir::new().unwrap();

    lurekb_cmd(&home)
        .args(["add", "bait", "--json", r#"{"name": "Corn"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E003"));
}

#[test]
fn test_feedback_deprecates_item() {
    let home = TempDir::new().unwrap();
    add_record(&home, "technique", r#"{"name": "Dragging"}"#);

    for _ in 0..4 {
        lurekb_cmd(&home)
            .args(["feedback", "technique", "Dragging", "negative"])
            .assert()
            .success();
    }

    lurekb_cmd(&home)
        .args(["feedback", "technique", "dragging", "positive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/5 positive"))
        .stdout(predicate::str::contains("pending -> deprecated"));
}

#[test]
fn test_verify_and_history() {
    let home = TempDir::new().unwrap();
    add_record(&home, "spot_type", r#"{"name": "Bridge pier"}"#);

    lurekb_cmd(&home)
        .args(["verify", "spot_type", "Bridge pier", "--by", "guide"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Verified spot_type 'Bridge pier' (v2, confidence 1.00)"));

    lurekb_cmd(&home)
        .args(["history", "spot_type", "Bridge pier"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1"))
        .stdout(predicate::str::contains("initial version"))
        .stdout(predicate::str::contains("verified by guide"));
}

#[test]
fn test_verify_unknown_item() {
    let home = TempDir::new().unwrap();

    lurekb_cmd(&home)
        .args(["verify", "fish", "Ghost carp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E002"));
}

#[test]
fn test_search_falls_back_to_keyword() {
    let home = TempDir::new().unwrap();
    add_record(
        &home,
        "fish",
        r#"{"name": "Largemouth bass", "habits": "Hides near rock"}"#,
    );
    add_record(
        &home,
        "rig",
        r#"{"name": "Texas rig", "suitable_fish": ["bass"]}"#,
    );

    lurekb_cmd(&home)
        .args(["search", "bass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. [fish] Largemouth bass"))
        .stdout(predicate::str::contains("keyword"))
        .stdout(predicate::str::contains("2. [rig] Texas rig"));

    lurekb_cmd(&home)
        .args(["search", "bass", "--category", "rig"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Texas rig"))
        .stdout(predicate::str::contains("Largemouth").not());
}

#[test]
fn test_semantic_search_requires_backend() {
    let home = TempDir::new().unwrap();
    add_record(&home, "fish", r#"{"name": "Perch"}"#);

    lurekb_cmd(&home)
        .args(["search", "perch", "--mode", "semantic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E100"));

    lurekb_cmd(&home)
        .args(["reindex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E100"));
}

#[test]
fn test_stats_and_audit() {
    let home = TempDir::new().unwrap();
    add_record(&home, "lure", r#"{"name": "Soft worm"}"#);
    lurekb_cmd(&home)
        .args([
            "add",
            "lure",
            "--json",
            r#"{"name": "Popper"}"#,
            "--source",
            "expert",
            "--verified",
        ])
        .assert()
        .success();

    lurekb_cmd(&home)
        .args(["stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total items:        2"))
        .stdout(predicate::str::contains("Verified:           1 (50.0%)"));

    lurekb_cmd(&home)
        .args(["audit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Soft worm"))
        .stdout(predicate::str::contains("Popper").not());
}

#[test]
fn test_backup_writes_copies() {
    let home = TempDir::new().unwrap();
    add_record(&home, "equipment", r#"{"name": "Spinning rod"}"#);

    lurekb_cmd(&home)
        .args(["backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backed up knowledge to"));

    let backups = std::fs::read_dir(home.path().join("data"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".backup_"))
        .count();
    assert_eq!(backups, 2);
}

#[test]
fn test_migrate_legacy_file() {
    let home = TempDir::new().unwrap();
    let data_dir = home.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(
        data_dir.join("knowledge.json"),
        r#"{"fish_species": [{"name": "Perch"}]}"#,
    )
    .unwrap();

    lurekb_cmd(&home)
        .args(["migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Migrated 1 items"));

    lurekb_cmd(&home)
        .args(["migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to migrate"));
}

#[test]
fn test_schema_command() {
    let home = TempDir::new().unwrap();

    lurekb_cmd(&home)
        .args(["schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("spot_type"));

    lurekb_cmd(&home)
        .args(["schema", "rig"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"components\""));
}

#[test]
fn test_config_set_get() {
    let home = TempDir::new().unwrap();

    lurekb_cmd(&home)
        .args(["config", "set", "retrieval.top_k", "3"])
        .assert()
        .success();

    lurekb_cmd(&home)
        .args(["config", "get", "retrieval.top_k"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));

    lurekb_cmd(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    lurekb_cmd(&home)
        .args(["config", "set", "retrieval.top_k", "0"])
        .assert()
        .failure();
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();

    lurekb_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("feedback"))
        .stdout(predicate::str::contains("reindex"));
}
