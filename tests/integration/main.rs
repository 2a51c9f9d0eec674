//! Integration tests for chartctl
//!
//! Repositories are directories served through `file://` URLs, so every
//! test runs offline against its own repository, cache and config file.

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn chartctl() -> Command {
        cargo_bin_cmd!("chartctl")
    }

    #[test]
    fn help_displays() {
        chartctl()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("chart repositories"));
    }

    #[test]
    fn version_displays() {
        chartctl()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("chartctl"));
    }

    #[test]
    fn invalid_command() {
        chartctl().arg("invalid-command").assert().failure();
    }

    #[test]
    fn resolve_requires_chart_name() {
        chartctl()
            .args(["resolve", "--chart-repo", "file:///nowhere"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--chart-name"));
    }
}

mod repository_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use predicates::prelude::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const DEPLOYMENT: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: demo\n";
    const SERVICE: &str = "apiVersion: v1\nkind: Service\nmetadata:\n  name: demo\n";

    /// A repository, cache and config file in one temporary directory
    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("repo")).unwrap();
            std::fs::write(
                dir.path().join("config.toml"),
                "[retry]\nmax_attempts = 1\n\n[catalog]\nindex_ttl_secs = 0\n",
            )
            .unwrap();

            let fixture = Self { dir };
            for version in ["1.0.0", "1.2.0", "2.0.0"] {
                fixture.publish("demo", version);
            }
            fixture.publish("other", "0.1.0");
            fixture.write_index(&[
                ("demo", &["1.0.0", "1.2.0", "2.0.0"][..]),
                ("other", &["0.1.0"][..]),
            ]);
            fixture
        }

        fn repo_dir(&self) -> PathBuf {
            self.dir.path().join("repo")
        }

        fn repo_url(&self) -> String {
            format!("file://{}", self.repo_dir().display())
        }

        fn cache_dir(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn archive_path(&self, name: &str, version: &str) -> PathBuf {
            self.repo_dir().join(format!("{}-{}.tgz", name, version))
        }

        fn publish(&self, name: &str, version: &str) {
            let mut builder = tar::Builder::new(Vec::new());
            let chart_yaml = format!(
                "apiVersion: v2\nname: {}\nversion: {}\ndescription: The {} chart\n",
                name, version, name
            );
            append(&mut builder, &format!("{}/Chart.yaml", name), &chart_yaml);
            append(&mut builder, &format!("{}/values.yaml", name), "replicas: 1\n");
            append(&mut builder, &format!("{}/templates/deployment.yaml", name), DEPLOYMENT);
            append(&mut builder, &format!("{}/templates/service.yaml", name), SERVICE);
            append(&mut builder, &format!("{}/templates/_helpers.tpl", name), "{{- define \"x\" }}{{ end }}");

            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&builder.into_inner().unwrap()).unwrap();
            std::fs::write(self.archive_path(name, version), encoder.finish().unwrap()).unwrap();
        }

        fn write_index(&self, charts: &[(&str, &[&str])]) {
            let mut index = String::from("apiVersion: v1\nentries:\n");
            for (name, versions) in charts {
                index.push_str(&format!("  {}:\n", name));
                for version in versions.iter() {
                    index.push_str(&format!(
                        "  - name: {name}\n    version: {version}\n    description: The {name} chart\n    urls:\n    - {name}-{version}.tgz\n"
                    ));
                }
            }
            std::fs::write(self.repo_dir().join("index.yaml"), index).unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("chartctl");
            cmd.arg("--config")
                .arg(self.dir.path().join("config.toml"))
                .arg("--cache-dir")
                .arg(self.cache_dir());
            cmd
        }

        fn chart_args(&self, version: &str) -> Vec<String> {
            vec![
                "--chart-name".to_string(),
                "demo".to_string(),
                "--chart-version".to_string(),
                version.to_string(),
                "--chart-repo".to_string(),
                self.repo_url(),
            ]
        }
    }

    fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, content: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, content.as_bytes()).unwrap();
    }

    fn stdout_of(cmd: &mut Command) -> String {
        let output = cmd.output().unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        String::from_utf8(output.stdout).unwrap()
    }

    #[test]
    fn resolve_picks_highest_match() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .arg("resolve")
            .args(fixture.chart_args("^1.0.0"))
            .assert()
            .success()
            .stdout("1.2.0\n");
    }

    #[test]
    fn resolve_empty_constraint_is_latest() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .arg("resolve")
            .args(fixture.chart_args(""))
            .assert()
            .success()
            .stdout("2.0.0\n");
    }

    #[test]
    fn resolve_json_includes_download_url() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["resolve", "--format", "json"])
            .args(fixture.chart_args("1.0.0"))
            .assert()
            .success()
            .stdout(predicate::str::contains("\"version\": \"1.0.0\""))
            .stdout(predicate::str::contains("demo-1.0.0.tgz"));
    }

    #[test]
    fn resolve_without_match_fails() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .arg("resolve")
            .args(fixture.chart_args("^3.0.0"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("No version of chart demo"))
            .stderr(predicate::str::contains("chartctl versions"));
    }

    #[test]
    fn invalid_constraint_fails_with_hint() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .arg("resolve")
            .args(fixture.chart_args("not a version"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid version constraint"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn unreachable_repository_fails() {
        let fixture = Fixture::new();
        std::fs::remove_file(fixture.repo_dir().join("index.yaml")).unwrap();
        fixture
            .cmd()
            .arg("resolve")
            .args(fixture.chart_args("^1.0.0"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("unreachable"));
    }

    #[test]
    fn fetch_caches_archive() {
        let fixture = Fixture::new();
        let path = stdout_of(fixture.cmd().arg("fetch").args(fixture.chart_args("~1.2")));
        let path = Path::new(path.trim());

        assert!(path.starts_with(fixture.cache_dir()));
        assert!(path.ends_with("charts/demo/1.2.0.tgz"));
        assert_eq!(
            std::fs::read(path).unwrap(),
            std::fs::read(fixture.archive_path("demo", "1.2.0")).unwrap()
        );
    }

    #[test]
    fn fetch_serves_cached_archive_without_repository_copy() {
        let fixture = Fixture::new();
        fixture.cmd().arg("fetch").args(fixture.chart_args("1.2.0")).assert().success();

        std::fs::remove_file(fixture.archive_path("demo", "1.2.0")).unwrap();

        fixture
            .cmd()
            .arg("fetch")
            .args(fixture.chart_args("1.2.0"))
            .assert()
            .success()
            .stdout(predicate::str::contains("1.2.0.tgz"));
    }

    #[test]
    fn fetch_missing_archive_fails() {
        let fixture = Fixture::new();
        std::fs::remove_file(fixture.archive_path("demo", "2.0.0")).unwrap();

        fixture
            .cmd()
            .arg("fetch")
            .args(fixture.chart_args("2.0.0"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn fetch_writes_output_file() {
        let fixture = Fixture::new();
        let output = fixture.dir.path().join("out.tgz");

        fixture
            .cmd()
            .arg("fetch")
            .args(fixture.chart_args("1.0.0"))
            .arg("--output")
            .arg(&output)
            .assert()
            .success();

        assert_eq!(
            std::fs::read(&output).unwrap(),
            std::fs::read(fixture.archive_path("demo", "1.0.0")).unwrap()
        );
    }

    #[test]
    fn offline_fallback_uses_persisted_index() {
        let fixture = Fixture::new();
        fixture.cmd().arg("resolve").args(fixture.chart_args("^1.0.0")).assert().success();

        std::fs::remove_file(fixture.repo_dir().join("index.yaml")).unwrap();

        fixture
            .cmd()
            .arg("resolve")
            .args(fixture.chart_args("^1.0.0"))
            .assert()
            .failure();

        fixture
            .cmd()
            .arg("--offline-fallback")
            .arg("resolve")
            .args(fixture.chart_args("^1.0.0"))
            .assert()
            .success()
            .stdout("1.2.0\n");
    }

    #[test]
    fn versions_lists_index_order() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["versions", "demo", "--format", "plain", "--chart-repo"])
            .arg(fixture.repo_url())
            .assert()
            .success()
            .stdout("1.0.0\n1.2.0\n2.0.0\n");
    }

    #[test]
    fn versions_of_unknown_chart_fails() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["versions", "missing", "--chart-repo"])
            .arg(format!("{}/", fixture.repo_url()))
            .assert()
            .failure()
            .stderr(predicate::str::contains(format!(
                "No version of chart missing in {} matches",
                fixture.repo_url()
            )));
    }

    #[test]
    fn search_filters_by_name() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["search", "dem", "--format", "plain", "--chart-repo"])
            .arg(fixture.repo_url())
            .assert()
            .success()
            .stdout("demo\n");

        fixture
            .cmd()
            .args(["search", "--format", "plain", "--chart-repo"])
            .arg(fixture.repo_url())
            .assert()
            .success()
            .stdout("demo\nother\n");
    }

    #[test]
    fn render_chart_joins_manifests() {
        let fixture = Fixture::new();
        let stdout = stdout_of(
            fixture
                .cmd()
                .args(["render", "chart"])
                .args(fixture.chart_args("^1.0.0"))
                .args(["--values", "replicas: 3"]),
        );

        assert_eq!(
            stdout,
            format!(
                "# Source: demo/templates/deployment.yaml\n{}\n---\n# Source: demo/templates/service.yaml\n{}\n",
                DEPLOYMENT.trim_end(),
                SERVICE.trim_end()
            )
        );
    }

    #[test]
    fn render_release_manifest() {
        let fixture = Fixture::new();
        let manifest = fixture.dir.path().join("release.yaml");
        std::fs::write(
            &manifest,
            format!(
                "kind: Release\nmetadata:\n  name: demo-0\nspec:\n  environment:\n    chart:\n      name: demo\n      version: 1.0.0\n      repoUrl: {}\n",
                fixture.repo_url()
            ),
        )
        .unwrap();

        fixture
            .cmd()
            .args(["render", "release"])
            .arg(&manifest)
            .assert()
            .success()
            .stdout(predicate::str::contains("kind: Deployment"));
    }

    #[test]
    fn render_application_from_stdin() {
        let fixture = Fixture::new();
        let manifest = format!(
            "kind: Application\nmetadata:\n  name: demo\nspec:\n  template:\n    chart:\n      name: demo\n      version: ^1.0.0\n      repoUrl: {}\n    values:\n      replicas: 2\n",
            fixture.repo_url()
        );

        fixture
            .cmd()
            .args(["render", "app", "-", "--namespace", "staging"])
            .write_stdin(manifest)
            .assert()
            .success()
            .stdout(predicate::str::contains("kind: Service"));
    }

    #[test]
    fn render_rejects_wrong_kind() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["render", "app", "-"])
            .write_stdin("kind: Release\nmetadata:\n  name: x\nspec:\n  template:\n    chart:\n      name: demo\n      repoUrl: file:///x\n")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Application"));
    }

    #[test]
    fn cache_list_and_clear() {
        let fixture = Fixture::new();
        fixture.cmd().arg("fetch").args(fixture.chart_args("1.0.0")).assert().success();
        fixture.cmd().arg("fetch").args(fixture.chart_args("2.0.0")).assert().success();

        fixture
            .cmd()
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"version\": \"1.0.0\""))
            .stdout(predicate::str::contains("\"version\": \"2.0.0\""));

        fixture
            .cmd()
            .args(["cache", "clear"])
            .write_stdin("n\n")
            .assert()
            .success()
            .stderr(predicate::str::contains("This will remove 2 archive(s)"))
            .stderr(predicate::str::contains("Aborted."));

        fixture
            .cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains(".tgz"));

        let notes = fixture.cache_dir().join("notes.txt");
        std::fs::write(&notes, "not a chart").unwrap();

        fixture
            .cmd()
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Removed 2 archive(s)"));
        assert!(notes.exists());

        fixture
            .cmd()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached charts found."));
    }

    #[test]
    fn cache_gc_evicts_to_limit() {
        let fixture = Fixture::new();
        fixture.cmd().arg("fetch").args(fixture.chart_args("1.0.0")).assert().success();

        fixture
            .cmd()
            .args(["cache", "gc", "--max-mb", "0"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Evicted 1 archive(s)"));

        fixture
            .cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached charts found."));
    }

    #[test]
    fn config_path_honours_flag() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_reflects_file() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[catalog]"))
            .stdout(predicate::str::contains("max_attempts = 1"));
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Use --force to overwrite"));
    }

    #[test]
    fn config_set_persists() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["config", "set", "catalog.offline_fallback", "true"])
            .assert()
            .success();

        let content = std::fs::read_to_string(fixture.dir.path().join("config.toml")).unwrap();
        assert!(content.contains("offline_fallback = true"));
        assert!(content.contains("max_attempts = 1"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("catalog.index_ttl_secs"));
    }
}
