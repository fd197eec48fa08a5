//! Integration tests for kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn kiln(config: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("kiln");
        cmd.arg("--config").arg(config).env_remove("CI");
        cmd
    }

    fn config_in(dir: &TempDir) -> PathBuf {
        dir.path().join("kiln").join("config.toml")
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("kiln")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Build app images from buildpack builders"))
            .stdout(predicate::str::contains("trust-builder").not());
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("kiln")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn config_path_uses_flag() {
        let tmp = TempDir::new().unwrap();
        let path = config_in(&tmp);
        kiln(&path)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(path.display().to_string()));
    }

    #[test]
    fn config_path_uses_env() {
        let tmp = TempDir::new().unwrap();
        let path = config_in(&tmp);
        cargo_bin_cmd!("kiln")
            .env("KILN_CONFIG", &path)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(path.display().to_string()));
    }

    #[test]
    fn list_includes_suggested_builders() {
        let tmp = TempDir::new().unwrap();
        kiln(&config_in(&tmp))
            .args(["config", "trusted-builders", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Trusted Builders:"))
            .stdout(predicate::str::contains("paketobuildpacks/builder:base"))
            .stdout(predicate::str::contains("gcr.io/buildpacks/builder:v1"));
    }

    #[test]
    fn add_then_list_then_remove() {
        let tmp = TempDir::new().unwrap();
        let path = config_in(&tmp);

        kiln(&path)
            .args(["config", "trusted-builders", "add", "example/builder"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Builder example/builder is now trusted"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[[trusted-builders]]"));
        assert!(content.contains("name = \"example/builder\""));

        kiln(&path)
            .args(["config", "trusted-builder", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("example/builder"));

        kiln(&path)
            .args(["config", "trusted-builders", "remove", "example/builder"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Builder example/builder is no longer trusted"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("example/builder"));
    }

    #[test]
    fn adding_twice_writes_once() {
        let tmp = TempDir::new().unwrap();
        let path = config_in(&tmp);

        for _ in 0..2 {
            kiln(&path)
                .args(["config", "trusted-builders", "add", "example/builder"])
                .assert()
                .success();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("example/builder").count(), 1);
    }

    #[test]
    fn adding_suggested_builder_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = config_in(&tmp);

        kiln(&path)
            .args(["config", "trusted-builders", "add", "heroku/buildpacks:20"])
            .assert()
            .success();
        assert!(!path.exists());
    }

    #[test]
    fn removing_untrusted_builder_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        kiln(&config_in(&tmp))
            .args(["config", "trusted-builders", "remove", "example/never-trusted"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Builder example/never-trusted wasn't trusted"));
    }

    #[test]
    fn removing_suggested_builder_fails() {
        let tmp = TempDir::new().unwrap();
        kiln(&config_in(&tmp))
            .args(["config", "trusted-builders", "remove", "paketobuildpacks/builder:base"])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "Builder paketobuildpacks/builder:base is a suggested builder, and is trusted by default. Currently this cannot be changed.",
            ));
    }

    #[test]
    fn unwritable_config_fails_add() {
        let tmp = TempDir::new().unwrap();
        // A regular file where the config directory should be
        let blocker = tmp.path().join("kiln");
        std::fs::write(&blocker, "not a directory").unwrap();

        kiln(&blocker.join("config.toml"))
            .args(["config", "trusted-builders", "add", "example/builder"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("writing config"));
    }

    #[test]
    fn deprecated_trust_builder_warns_and_delegates() {
        let tmp = TempDir::new().unwrap();
        let path = config_in(&tmp);

        kiln(&path)
            .args(["trust-builder", "example/builder"])
            .assert()
            .success()
            .stderr(predicate::str::contains(
                "'kiln trust-builder' has been deprecated, please use 'kiln config trusted-builders add' instead",
            ))
            .stdout(predicate::str::contains("Builder example/builder is now trusted"));

        kiln(&path)
            .arg("list-trusted-builders")
            .assert()
            .success()
            .stdout(predicate::str::contains("example/builder"));

        kiln(&path)
            .args(["untrust-builder", "example/builder"])
            .assert()
            .success()
            .stdout(predicate::str::contains("no longer trusted"));
    }

    #[test]
    fn suggest_stacks_alias_matches_canonical() {
        let tmp = TempDir::new().unwrap();
        let path = config_in(&tmp);

        let canonical = kiln(&path).args(["stack", "suggest"]).output().unwrap();
        let deprecated = kiln(&path).arg("suggest-stacks").output().unwrap();

        assert!(canonical.status.success());
        assert!(deprecated.status.success());
        assert_eq!(canonical.stdout, deprecated.stdout);
        assert!(String::from_utf8_lossy(&deprecated.stderr).contains("kiln stack suggest"));
        assert!(String::from_utf8_lossy(&canonical.stdout).contains("io.buildpacks.stacks.bionic"));
    }

    #[test]
    fn builder_suggest_lists_vendors() {
        let tmp = TempDir::new().unwrap();
        kiln(&config_in(&tmp))
            .args(["builder", "suggest"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Paketo Buildpacks"))
            .stdout(predicate::str::contains("heroku/buildpacks:20"));
    }

    #[test]
    fn lifecycle_inspect_default_needs_no_download() {
        let tmp = TempDir::new().unwrap();
        kiln(&config_in(&tmp))
            .args(["lifecycle", "inspect", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"version\": \"0.11.1\""));
    }

    #[test]
    fn lifecycle_inspect_rejects_incomplete_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("lifecycle-src");
        std::fs::create_dir_all(dir.join("lifecycle")).unwrap();
        std::fs::write(
            dir.join("lifecycle.toml"),
            "[apis.buildpack]\nsupported = [\"0.4\"]\n[apis.platform]\nsupported = [\"0.6\"]\n[lifecycle]\nversion = \"0.11.1\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("lifecycle").join("detector"), "#!/bin/sh\n").unwrap();

        kiln(&config_in(&tmp))
            .args(["lifecycle", "inspect", "--lifecycle"])
            .arg(&dir)
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing binaries"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "trusted-builders = 3").unwrap();

        kiln(&path)
            .args(["config", "trusted-builders", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn completions_generate() {
        cargo_bin_cmd!("kiln")
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn build_requires_builder() {
        let tmp = TempDir::new().unwrap();
        kiln(&config_in(&tmp))
            .args(["build", "example/app"])
            .current_dir(tmp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("no builder given"));
    }
}
