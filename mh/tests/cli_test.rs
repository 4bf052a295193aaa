//! CLI tests for the `mh` binary

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
host:
  theme: dark

fragments:
  - name: user-list
    code-url: https://cdn.example.com/user-list/main.js
    style-url: https://cdn.example.com/user-list/styles.css
    tag-name: user-list-element
  - name: audit
    code-url: https://cdn.example.com/audit/main.js
    capabilities:
      emit: false
"#;

fn mh(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mh").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_fragments_lists_configured_fragments() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("mfehost.yml");
    fs::write(&config, CONFIG).unwrap();

    mh(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("fragments")
        .assert()
        .success()
        .stdout(predicate::str::contains("user-list"))
        .stdout(predicate::str::contains("https://cdn.example.com/user-list/styles.css"))
        .stdout(predicate::str::contains("emit=false"));
}

#[test]
fn test_fragments_without_config() {
    let temp = TempDir::new().unwrap();

    mh(temp.path())
        .arg("fragments")
        .assert()
        .success()
        .stdout(predicate::str::contains("No fragments configured"));
}

#[test]
fn test_project_config_is_picked_up() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".mfehost.yml"), CONFIG).unwrap();

    mh(temp.path())
        .arg("fragments")
        .assert()
        .success()
        .stdout(predicate::str::contains("audit"));
}

#[test]
fn test_run_unknown_fragment_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("mfehost.yml");
    fs::write(&config, CONFIG).unwrap();

    mh(temp.path())
        .arg("--config")
        .arg(&config)
        .args(["run", "--only", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown fragment: nope"));
}

#[test]
fn test_duplicate_fragment_names_rejected() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("mfehost.yml");
    fs::write(
        &config,
        "fragments:\n  - name: a\n    code-url: https://x/a.js\n  - name: a\n    code-url: https://x/b.js\n",
    )
    .unwrap();

    mh(temp.path())
        .arg("--config")
        .arg(&config)
        .arg("fragments")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_load_rejects_non_http_url() {
    let temp = TempDir::new().unwrap();

    mh(temp.path())
        .args(["load", "local", "file:///tmp/main.js"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed to load code for local"));
}
