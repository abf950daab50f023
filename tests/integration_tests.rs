//! Integration tests for the coordination service CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn swarm_coordinator() -> Command {
    cargo_bin_cmd!("swarm-coordinator")
}

fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

mod cli_basics {
    use super::*;

    #[test]
    fn help_succeeds() {
        swarm_coordinator().arg("--help").assert().success();
    }

    #[test]
    fn version_succeeds() {
        swarm_coordinator().arg("--version").assert().success();
    }

    #[test]
    fn missing_subcommand_fails() {
        swarm_coordinator().assert().failure();
    }
}

mod config_subcommand {
    use super::*;

    #[test]
    fn prints_default_toml_when_no_config_file_given() {
        swarm_coordinator()
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("port = 7432"));
    }

    #[test]
    fn reflects_a_config_file_on_disk() {
        let dir = temp_dir();
        let config_path = dir.path().join("coordination.toml");
        std::fs::write(
            &config_path,
            "[server]\nhost = \"127.0.0.1\"\nport = 9191\ndatabase_path = \".spellbook/coordination.db\"\n",
        )
        .unwrap();

        swarm_coordinator()
            .arg("--config")
            .arg(&config_path)
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9191"));
    }

    #[test]
    fn env_override_wins_over_config_file() {
        let dir = temp_dir();
        let config_path = dir.path().join("coordination.toml");
        std::fs::write(&config_path, "[server]\nport = 9191\n").unwrap();

        swarm_coordinator()
            .env("SPELLBOOK_COORD_PORT", "4242")
            .arg("--config")
            .arg(&config_path)
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 4242"));
    }
}

mod serve_subcommand {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn binds_the_requested_port_and_answers_health() {
        let dir = temp_dir();
        let db_path = dir.path().join("coordination.db");

        // Pick a free port up front so the server binds deterministically.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("swarm-coordinator"))
            .arg("serve")
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .arg("--db-path")
            .arg(&db_path)
            .spawn()
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut connected = false;
        while std::time::Instant::now() < deadline {
            if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
                connected = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(connected, "server never started listening");

        if let Ok(mut stream) = std::net::TcpStream::connect(("127.0.0.1", port)) {
            use std::io::Write;
            stream
                .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).ok();
            assert!(response.contains("200"));
        }

        child.kill().ok();
        child.wait().ok();
    }
}
