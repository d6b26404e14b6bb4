//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const COMPOSE: &str = r#"
services:
  web:
    image: nginx:1.25
    ports: ["8080:80"]
    labels:
      - "routing.enable=true"
      - "routing.http.routers.web.rule=Host(`web.example.com`)"
  api:
    image: api:latest
    ports: ["3000"]
    labels:
      routing.enable: "true"
      routing.http.routers.api.rule: "Host(`api.example.com`) || Host(`web.example.com`)"
      scaling.enabled: "true"
      scaling.max_replicas: "4"
  broken: 42
"#;

/// A scratch directory with a compose file and an isolated home
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("docker-compose.yml"), COMPOSE).unwrap();
    std::fs::create_dir(dir.path().join("home")).unwrap();
    dir
}

/// Run `tsm` in `dir` without touching the user's defaults or docker
fn tsm(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tsm"))
        .current_dir(dir)
        .env("HOME", dir.join("home"))
        .env_remove("TSM_COMPOSE_FILE")
        .env("TSM_GENERATOR__SWARM_MODE", "false")
        .args(args)
        .output()
        .expect("Failed to execute tsm")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let dir = workspace();
    let output = tsm(dir.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    for command in ["generate", "discover", "status", "hosts", "monitor"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let dir = workspace();
    let output = tsm(dir.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("tsm"), "Should show binary name");
}

#[test]
fn test_generate_writes_routing_document() {
    let dir = workspace();
    let output = tsm(dir.path(), &["generate", "--output-dir", "out"]);
    assert!(
        output.status.success(),
        "generate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let yaml = std::fs::read_to_string(dir.path().join("out/services.yml")).unwrap();
    assert!(yaml.contains("web_router:"));
    assert!(yaml.contains("url: http://web:80"));
    assert!(yaml.contains("api_router:"));
    assert!(yaml.contains("url: http://api:3000"));
    assert!(yaml.contains("loadBalancer:"));
    assert!(!yaml.contains("broken"));
}

#[test]
fn test_generate_twice_is_identical() {
    let dir = workspace();
    assert!(tsm(dir.path(), &["generate", "--output-dir", "a"]).status.success());
    assert!(tsm(dir.path(), &["generate", "--output-dir", "b"]).status.success());

    let first = std::fs::read(dir.path().join("a/services.yml")).unwrap();
    let second = std::fs::read(dir.path().join("b/services.yml")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_generate_missing_compose_file_fails() {
    let dir = workspace();
    let output = tsm(
        dir.path(),
        &["--compose-file", "missing.yml", "generate", "--output-dir", "out"],
    );

    assert!(!output.status.success());
    assert!(!dir.path().join("out/services.yml").exists());
}

#[test]
fn test_discover_json_lists_services_and_skipped() {
    let dir = workspace();
    let output = tsm(dir.path(), &["--format", "json", "discover"]);
    assert!(output.status.success());

    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = view["services"]
        .as_array()
        .unwrap()
        .iter()
        .map(|service| service["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["web", "api"]);

    let api = &view["services"][1];
    assert_eq!(api["scaling"]["max_replicas"], 4);
    assert_eq!(view["skipped"][0]["name"], "broken");
}

#[test]
fn test_discover_table() {
    let dir = workspace();
    let output = tsm(dir.path(), &["discover"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Service"));
    assert!(stdout.contains("nginx:1.25"));
    assert!(stdout.contains("1-4"));
}

#[test]
fn test_hosts_line() {
    let dir = workspace();
    let output = tsm(dir.path(), &["hosts", "--ip", "10.0.0.5"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert_eq!(stdout.trim(), "10.0.0.5 api.example.com web.example.com");
}

#[test]
fn test_hosts_written_to_file() {
    let dir = workspace();
    let output = tsm(dir.path(), &["hosts", "--output", "hosts.txt"]);
    assert!(output.status.success());

    let content = std::fs::read_to_string(dir.path().join("hosts.txt")).unwrap();
    assert_eq!(content, "127.0.0.1 api.example.com web.example.com\n");
}

#[test]
fn test_user_defaults_pick_compose_file() {
    let dir = workspace();
    std::fs::rename(
        dir.path().join("docker-compose.yml"),
        dir.path().join("stack.yml"),
    )
    .unwrap();

    let config_dir = dir.path().join("home/.config/tsm");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.json"),
        r#"{"compose_file": "stack.yml", "default_format": "json"}"#,
    )
    .unwrap();

    let output = tsm(dir.path(), &["discover"]);
    assert!(output.status.success());

    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["services"].as_array().unwrap().len(), 2);
}

#[test]
fn test_monitor_rejects_short_interval() {
    let dir = workspace();
    let output = tsm(dir.path(), &["monitor", "--interval", "5"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("check_interval_secs"));
}

#[test]
fn test_monitor_missing_compose_file_fails() {
    let dir = workspace();
    let output = tsm(
        dir.path(),
        &["--compose-file", "missing.yml", "monitor", "--dry-run"],
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("missing.yml"), "stderr: {}", stderr);
}
