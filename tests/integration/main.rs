//! Integration tests for nixpkgs-broken

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn nixpkgs_broken() -> Command {
        cargo_bin_cmd!("nixpkgs-broken")
    }

    /// A command isolated from the user's config and database
    fn isolated(dir: &TempDir) -> Command {
        let mut cmd = nixpkgs_broken();
        cmd.env_remove("NIXPKGS_BROKEN_CONFIG")
            .arg("--config")
            .arg(dir.path().join("config.toml"))
            .arg("--database")
            .arg(dir.path().join("hydra.db"));
        cmd
    }

    #[test]
    fn help_displays() {
        nixpkgs_broken()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("mark broken packages"));
    }

    #[test]
    fn version_displays() {
        nixpkgs_broken()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("nixpkgs-broken"));
    }

    #[test]
    fn unknown_argument_fails_with_status_one() {
        nixpkgs_broken()
            .arg("--no-such-flag")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("--no-such-flag"));
    }

    #[test]
    fn missing_status_conflicts_with_eval() {
        nixpkgs_broken()
            .args(["update", "--missing-status", "--eval", "3"])
            .assert()
            .code(1);
    }

    #[test]
    fn config_path_follows_flag() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                dir.path().join("config.toml").display().to_string(),
            ));
    }

    #[test]
    fn config_show_has_defaults() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[ci]"))
            .stdout(predicate::str::contains("hydra.nixos.org"));
    }

    #[test]
    fn config_init_then_set() {
        let dir = TempDir::new().unwrap();
        isolated(&dir).args(["config", "init"]).assert().success();
        assert!(dir.path().join("config.toml").is_file());

        isolated(&dir)
            .args(["config", "set", "ci.jobset", "nixpkgs/staging-next"])
            .assert()
            .success();
        isolated(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nixpkgs/staging-next"));
    }

    #[test]
    fn config_set_keeps_flag_overrides_out_of_the_file() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["--jobset", "nixpkgs/one-off", "config", "set", "ci.concurrency", "8"])
            .assert()
            .success();

        let saved = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(saved.contains("concurrency = 8"));
        assert!(!saved.contains("one-off"));
        assert!(!saved.contains(&dir.path().join("hydra.db").display().to_string()));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["config", "set", "ci.token", "secret"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_jobset_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["--jobset", "trunk", "report"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("project/jobset"));
    }

    #[test]
    fn report_on_empty_database() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .arg("report")
            .assert()
            .success()
            .stdout(predicate::str::is_match(r"builds:\s+0").unwrap())
            .stdout(predicate::str::contains("No broken packages"));
        assert!(dir.path().join("hydra.db").is_file());
    }

    #[test]
    fn report_json_on_empty_database() {
        let dir = TempDir::new().unwrap();
        let output = isolated(&dir)
            .args(["report", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["regressed"], serde_json::json!([]));
        assert_eq!(report["never_successful"], serde_json::json!([]));
        assert_eq!(report["skipped"], 0);
    }

    #[test]
    fn mark_dry_run_on_empty_database() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["mark", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No broken packages to mark"));
    }

    #[test]
    fn mark_attr_rejects_unknown_platform() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["mark-attr", "hello", "riscv64-linux"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("riscv64-linux"));
    }

    #[test]
    fn mark_attr_needs_a_checkout() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("not-nixpkgs");
        std::fs::create_dir(&empty).unwrap();
        isolated(&dir)
            .args(["mark-attr", "hello", "x86_64-linux", "--nixpkgs"])
            .arg(&empty)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("not a nixpkgs checkout"));
    }

    #[test]
    fn update_replay_without_snapshot_fails() {
        let dir = TempDir::new().unwrap();
        isolated(&dir)
            .args(["config", "set", "snapshot.dir"])
            .arg(dir.path().join("snapshots"))
            .assert()
            .success();
        isolated(&dir)
            .args(["update", "--use-cached"])
            .assert()
            .code(1);
    }
}
