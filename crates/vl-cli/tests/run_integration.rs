//! Integration tests for the `vl` binary.
//!
//! Events are piped on stdin (`vl run --stdin`) into a temporary `SQLite`
//! store, then the rows are checked directly.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

const EVENTS: &str = r#"{"participant":{"id":"1","name":"alice"},"after":{"id":"10","name":"General"},"at":"2024-05-01T01:00:00Z"}
{"participant":{"id":"2","name":"bob"},"after":{"id":"10","name":"General"},"at":"2024-05-01T01:05:00Z"}
not an event
{"participant":{"id":"1","name":"alice"},"before":{"id":"10","name":"General"},"after":{"id":"20","name":"Gaming"},"at":"2024-05-01T01:30:00Z"}
{"participant":{"id":"1","name":"alice"},"before":{"id":"20","name":"Gaming"},"at":"2024-05-01T02:00:00Z"}
{"participant":{"id":"3","name":"carol"},"before":{"id":"10","name":"General"},"at":"2024-05-01T02:10:00Z"}
"#;

/// A temp home with a config file selecting the sqlite backend.
struct Fixture {
    home: TempDir,
    config: PathBuf,
    db: PathBuf,
}

impl Fixture {
    fn sqlite() -> Self {
        let home = TempDir::new().unwrap();
        let db = home.path().join("data/voice-log.db");
        let config = home.path().join("vl.toml");
        std::fs::write(
            &config,
            format!(
                "backend = \"sqlite\"\ndatabase_path = \"{}\"\n",
                db.display()
            ),
        )
        .unwrap();
        Self { home, config, db }
    }

    fn with_config(contents: &str) -> Self {
        let home = TempDir::new().unwrap();
        let config = home.path().join("vl.toml");
        std::fs::write(&config, contents).unwrap();
        let db = home.path().join("unused.db");
        Self { home, config, db }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_vl"));
        command
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path().join(".config"))
            .env_remove("DISCORD_TOKEN")
            .env_remove("SPREADSHEET_ID")
            .env_remove("CREDENTIALS_JSON")
            .env_remove("VL_BACKEND")
            .arg("--config")
            .arg(&self.config);
        command
    }

    fn run_with_stdin(&self, args: &[&str], input: &str) -> Output {
        let mut child = self
            .command()
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to spawn vl");
        {
            let stdin = child.stdin.as_mut().unwrap();
            stdin.write_all(input.as_bytes()).unwrap();
        }
        child.wait_with_output().expect("failed to wait for vl")
    }
}

fn rows(db: &Path) -> Vec<Vec<String>> {
    let conn = rusqlite::Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT c0, c1, c2, c3, c4, c5 FROM sheet_rows WHERE sheet = 'VoiceLog' ORDER BY row_index",
        )
        .unwrap();
    stmt.query_map([], |row| {
        (0..6).map(|i| row.get::<_, String>(i)).collect::<Result<Vec<_>, _>>()
    })
    .unwrap()
    .collect::<Result<Vec<_>, _>>()
    .unwrap()
}

#[test]
fn test_run_from_stdin_records_intervals() {
    let fixture = Fixture::sqlite();

    let output = fixture.run_with_stdin(&["run", "--stdin"], EVENTS);

    assert!(
        output.status.success(),
        "vl run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        "5 events: 2 entered, 2 left, 1 moved, 0 ignored, 1 unmatched, 0 failed"
    );

    let rows = rows(&fixture.db);
    assert_eq!(
        rows,
        vec![
            vec!["Date", "Name", "ID", "RoomName", "EntryTime", "ExitTime"],
            vec!["2024-05-01", "alice", "1", "General", "10:00:00", "10:30:00"],
            vec!["2024-05-01", "bob", "2", "General", "10:05:00", ""],
            vec!["2024-05-01", "alice", "1", "Gaming", "10:30:00", "11:00:00"],
        ]
    );
}

#[test]
fn test_status_lists_rows_left_open() {
    let fixture = Fixture::sqlite();
    let output = fixture.run_with_stdin(&["run", "--stdin"], EVENTS);
    assert!(output.status.success());

    let output = fixture.command().args(["status", "--json"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(r#""name":"bob""#), "{stdout}");
}

#[test]
fn test_second_run_closes_interval_from_first() {
    let fixture = Fixture::sqlite();
    let enter = r#"{"participant":{"id":"2","name":"bob"},"after":{"id":"10","name":"General"},"at":"2024-05-01T01:05:00Z"}"#;
    let leave = r#"{"participant":{"id":"2","name":"bob"},"before":{"id":"10","name":"General"},"at":"2024-05-01T03:00:00Z"}"#;

    assert!(fixture.run_with_stdin(&["run", "--stdin"], enter).status.success());
    let output = fixture.run_with_stdin(&["run", "--stdin"], leave);

    assert!(output.status.success());
    let rows = rows(&fixture.db);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][5], "12:00:00");
}

#[test]
fn test_init_creates_header() {
    let fixture = Fixture::sqlite();

    let output = fixture.command().arg("init").output().unwrap();

    assert!(output.status.success());
    assert_eq!(rows(&fixture.db).len(), 1);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Created header in sheet VoiceLog."), "{stdout}");
}

#[test]
fn test_sheets_backend_without_spreadsheet_id_fails() {
    let fixture = Fixture::with_config("backend = \"sheets\"\n");

    let output = fixture.run_with_stdin(&["run", "--stdin"], EVENTS);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("spreadsheet_id is not set"), "{stderr}");
}

#[test]
fn test_bridge_without_token_fails() {
    let fixture = Fixture::with_config("backend = \"sqlite\"\nbridge_command = [\"true\"]\n");

    let output = fixture.command().arg("run").output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("discord_token is not set"), "{stderr}");
}
