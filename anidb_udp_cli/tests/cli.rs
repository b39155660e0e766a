use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn anidb_udp(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("anidb-udp").unwrap();
    cmd.arg("--config")
        .arg(config_dir.path().join("config.toml"))
        .env_remove("ANIDB_UDP_USERNAME")
        .env_remove("ANIDB_UDP_PASSWORD");
    cmd
}

#[test]
fn test_version() {
    let mut cmd = Command::cargo_bin("anidb-udp").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_config_path() {
    let temp_dir = TempDir::new().unwrap();
    anidb_udp(&temp_dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_then_get() {
    let temp_dir = TempDir::new().unwrap();
    anidb_udp(&temp_dir)
        .args(["config", "set", "client_port", "4600"])
        .assert()
        .success();

    anidb_udp(&temp_dir)
        .args(["config", "get", "client_port"])
        .assert()
        .success()
        .stdout("4600\n");

    let content = fs::read_to_string(temp_dir.path().join("config.toml")).unwrap();
    assert!(content.contains("client_port = 4600"));
}

#[test]
fn test_config_set_rejects_invalid_port() {
    let temp_dir = TempDir::new().unwrap();
    anidb_udp(&temp_dir)
        .args(["config", "set", "server_port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("server_port"));
}

#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.toml"),
        "server_host = \"from-file.example\"\n",
    )
    .unwrap();

    anidb_udp(&temp_dir)
        .args(["config", "get", "server_host"])
        .assert()
        .success()
        .stdout("from-file.example\n");

    anidb_udp(&temp_dir)
        .env("ANIDB_UDP_SERVER_HOST", "from-env.example")
        .args(["config", "get", "server_host"])
        .assert()
        .success()
        .stdout("from-env.example\n");
}

#[test]
fn test_config_show_masks_password() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.toml"),
        "username = \"someone\"\npassword = \"hunter2\"\n",
    )
    .unwrap();

    anidb_udp(&temp_dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("someone"))
        .stdout(predicate::str::contains("hunter2").not())
        .stdout(predicate::str::contains("api.anidb.net"));
}

#[test]
fn test_login_without_credentials_fails_offline() {
    let temp_dir = TempDir::new().unwrap();
    anidb_udp(&temp_dir)
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("credentials"));
}
