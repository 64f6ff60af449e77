use serial_test::serial;
use std::env;
use std::fs::write;
use submitter::load_config::{definitions_url, load_config, PASSWORD_ENV, USERNAME_ENV};
use tempfile::TempDir;

fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("submitter.yaml");
    write(&path, yaml).expect("write config");
    path
}

/// A static config plus the credential env vars produces a complete CliConfig.
#[tokio::test]
#[serial]
async fn test_load_config_success_injects_env_credentials() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
definitions: https://example.edu/submit/course.xml
project: lab1
username: from-file
transport:
  timeout_secs: 5
"#,
    );

    env::set_var(USERNAME_ENV, "alice");
    env::set_var(PASSWORD_ENV, "s3cret");

    let config = load_config(&path).expect("Config should load");

    assert_eq!(config.definitions.as_str(), "https://example.edu/submit/course.xml");
    assert_eq!(config.project, dir.path().join("lab1"));
    assert_eq!(config.username, "alice", "env username overrides the file");
    assert_eq!(config.password, "s3cret");
    assert_eq!(config.transport.timeout_secs, 5);
    assert!(!format!("{config:?}").contains("s3cret"), "password must not be printed");

    env::remove_var(USERNAME_ENV);
    env::remove_var(PASSWORD_ENV);
}

#[tokio::test]
#[serial]
async fn test_load_config_uses_file_username_and_empty_password() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "definitions: defs.xml\nproject: .\nusername: bob\n");

    env::remove_var(USERNAME_ENV);
    env::remove_var(PASSWORD_ENV);

    let config = load_config(&path).expect("Config should load");
    assert_eq!(config.username, "bob");
    assert_eq!(config.password, "");
    assert_eq!(config.transport.timeout_secs, 60);
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_on_missing_username() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "definitions: defs.xml\nproject: .\n");

    env::remove_var(USERNAME_ENV);

    let err = load_config(&path).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains(USERNAME_ENV), "Must name the env var, got: {msg}");
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_invalid_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "not-yaml: [:::");

    env::set_var(USERNAME_ENV, "alice");

    let err = load_config(&path).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );

    env::remove_var(USERNAME_ENV);
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_for_missing_file() {
    let dir = TempDir::new().expect("temp dir");
    let err = load_config(dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_definitions_url_relative_path_becomes_file_url() {
    let dir = TempDir::new().expect("temp dir");
    let url = definitions_url("defs/course.xml", dir.path()).expect("file url");
    assert_eq!(url.scheme(), "file");
    assert_eq!(
        url.to_file_path().expect("local path"),
        dir.path().join("defs/course.xml")
    );

    let remote = definitions_url("http://example.edu/a.xml", dir.path()).expect("http url");
    assert_eq!(remote.as_str(), "http://example.edu/a.xml");
}
