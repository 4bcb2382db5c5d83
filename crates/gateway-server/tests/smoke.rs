//! End-to-end smoke test: spawn the built binary and poll its HTTP
//! surface.

use std::net::TcpListener as StdTcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

struct ServerProcess {
    child: Child,
    port: u16,
}

impl ServerProcess {
    fn spawn() -> Self {
        let port = free_port();
        let child = Command::new(env!("CARGO_BIN_EXE_gateway-server"))
            .env("PORT", port.to_string())
            .env("HOST", "127.0.0.1")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn gateway-server binary");

        Self { child, port }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    async fn wait_until_ready(&self) {
        let url = format!("{}/healthz", self.base_url());
        for _ in 0..50 {
            if reqwest::get(&url).await.map(|r| r.status().is_success()).unwrap_or(false) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("gateway-server never became ready at {url}");
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .expect("failed to bind an ephemeral port")
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn healthz_reports_ok_once_the_server_is_up() {
    let server = ServerProcess::spawn();
    server.wait_until_ready().await;

    let resp = reqwest::get(format!("{}/healthz", server.base_url()))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn loading_an_empty_model_reports_model_register_error() {
    let server = ServerProcess::spawn();
    server.wait_until_ready().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/model", server.base_url()))
        .json(&serde_json::json!({
            "model": { "source": "data", "data": [], "type": "TFLITE_FLAT_BUFFER" }
        }))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "MODEL_REGISTER_ERROR");
}

#[tokio::test]
async fn inference_against_an_unknown_handle_reports_invalid_handle_error() {
    let server = ServerProcess::spawn();
    server.wait_until_ready().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/inference", server.base_url()))
        .json(&serde_json::json!({
            "handle": 999,
            "tensor": [{ "dimensions": [1], "payload": { "type": "int_array", "array": [1] } }]
        }))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "INVALID_HANDLE_ERROR");
}
