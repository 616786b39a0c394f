//! Integration tests for the `maa-manager` binary.
//!
//! Spawns the binary against a temporary config directory. Covers help,
//! a one-shot sign-in with nothing to do, the HTTP endpoints of `serve`, and
//! `serve` with an account the game service rejects.

use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PATH: &str = "/user/auth/v1/token_by_phone_password";

fn maa_bin() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_maa-manager")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("target/debug/maa-manager"))
}

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, contents).unwrap();
    path
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn http_get(port: u16, path: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(
        stream,
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        path
    )?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    Ok(response)
}

struct KillOnDrop(Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn help_lists_commands() {
    let output = Command::new(maa_bin())
        .arg("help")
        .output()
        .expect("maa-manager help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("signin"));
    assert!(stdout.contains("--config"));
}

#[test]
fn unknown_command_fails() {
    let output = Command::new(maa_bin())
        .arg("launch")
        .output()
        .expect("maa-manager launch");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown command"));
}

#[test]
fn signin_without_accounts_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path(), r#"{"accounts": []}"#);

    let output = Command::new(maa_bin())
        .arg("signin")
        .arg("--config")
        .arg(&config)
        .env_remove("MAA_CONFIG")
        .output()
        .expect("maa-manager signin");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("No accounts configured"));
}

fn spawn_serve(dir: &Path, config: &Path, port: u16, stdout: Stdio) -> KillOnDrop {
    let child = Command::new(maa_bin())
        .arg("serve")
        .arg("--config")
        .arg(config)
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .arg("--saved")
        .arg(dir.join("saved.json"))
        .env_remove("MAA_CONFIG")
        .env_remove("MAA_HOST")
        .env_remove("MAA_PORT")
        .env_remove("MAA_SSL_CERTFILE")
        .env_remove("MAA_SSL_KEYFILE")
        .env_remove("MAA_SKLAND_BASE")
        .stdout(stdout)
        .stderr(Stdio::null())
        .spawn()
        .expect("maa-manager serve");
    KillOnDrop(child)
}

/// Polls `/query/{agent}` until the listener answers or `within` runs out.
fn wait_for_query(port: u16, agent: &str, within: Duration) -> String {
    let deadline = Instant::now() + within;
    loop {
        match http_get(port, &format!("/query/{}", agent)) {
            Ok(response) => return response,
            Err(_) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(100)),
            Err(e) => panic!("server did not answer within {:?}: {}", within, e),
        }
    }
}

fn config_with_account(dir: &Path, skland: &MockServer) -> PathBuf {
    let config = json!({
        "accounts": [{"phone": "p1", "password": "wrong", "uid": "10001"}],
        "skland": {"auth-base": skland.uri(), "api-base": skland.uri()}
    });
    write_config(dir, &config.to_string())
}

#[test]
fn serve_answers_report_and_query() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path(), "{}");
    let port = free_port();
    let _server = spawn_serve(tmp.path(), &config, port, Stdio::null());

    let first = wait_for_query(port, "alpha", Duration::from_secs(15));
    assert!(first.starts_with("HTTP/1.1 200"));
    assert!(first.ends_with("MAA has no action since the server started.\n"), "{}", first);

    let report = http_get(port, "/report/alpha/online").unwrap();
    assert!(report.starts_with("HTTP/1.1 200"));

    let query = http_get(port, "/query/alpha").unwrap();
    assert!(query.contains("MAA last online"), "{}", query);

    let bad = http_get(port, "/report/alpha/sleeping").unwrap();
    assert!(bad.starts_with("HTTP/1.1 404"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serve_answers_while_sign_in_login_hangs() {
    let skland = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 100, "msg": "wrong password"}))
                .set_delay(Duration::from_secs(25)),
        )
        .mount(&skland)
        .await;
    let tmp = tempfile::tempdir().unwrap();
    let config = config_with_account(tmp.path(), &skland);
    let port = free_port();
    let _server = spawn_serve(tmp.path(), &config, port, Stdio::null());

    let response = tokio::task::spawn_blocking(move || {
        wait_for_query(port, "alpha", Duration::from_secs(10))
    })
    .await
    .unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serve_keeps_serving_after_sign_in_login_fails() {
    let skland = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": 100, "msg": "wrong password"})),
        )
        .expect(1)
        .mount(&skland)
        .await;
    let tmp = tempfile::tempdir().unwrap();
    let config = config_with_account(tmp.path(), &skland);
    let port = free_port();
    let mut server = spawn_serve(tmp.path(), &config, port, Stdio::piped());

    let stdout = server.0.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let scheduled = tokio::task::spawn_blocking(move || {
        let deadline = Instant::now() + Duration::from_secs(15);
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(line) if line.contains("account(s) scheduled for daily sign-in") => {
                    return Some(line);
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    })
    .await
    .unwrap()
    .expect("sign-in setup never finished");
    assert!(scheduled.contains("0 of 1"), "{}", scheduled);

    let response = tokio::task::spawn_blocking(move || {
        let query = wait_for_query(port, "alpha", Duration::from_secs(5));
        let report = http_get(port, "/report/alpha/offline").unwrap();
        (query, report)
    })
    .await
    .unwrap();
    assert!(response.0.starts_with("HTTP/1.1 200"), "{}", response.0);
    assert!(response.1.starts_with("HTTP/1.1 200"), "{}", response.1);
}
