//! Mock DeepSeek balance server for testing
//!
//! A tiny HTTP server that answers `GET /user/balance` with the same
//! document shape as the real API:
//! `{ is_available, balance_infos: [{ currency, total_balance, granted_balance, topped_up_balance }] }`
//!
//! Keys starting with `sk-` are accepted; anything else gets a 401.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde::Serialize;

use super::deepseek::BALANCE_PATH;

/// Mock server handle; stops on drop
pub struct MockDeepSeekServer {
    port: u16,
    running: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

/// Behaviour of the mock
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Total balance reported for CNY
    pub total: String,
    /// Whether a CNY entry is included at all
    pub include_cny: bool,
    /// Reject every key
    pub fail_auth: bool,
    /// Force this HTTP status for every request
    pub status: Option<u16>,
    /// Respond 200 with a body that is not a balance document
    pub malformed_body: bool,
    /// Delay in milliseconds before responding
    pub delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            total: "110.00".to_string(),
            include_cny: true,
            fail_auth: false,
            status: None,
            malformed_body: false,
            delay_ms: 0,
        }
    }
}

#[derive(Serialize)]
struct BalanceDocument {
    is_available: bool,
    balance_infos: Vec<BalanceEntry>,
}

#[derive(Serialize)]
struct BalanceEntry {
    currency: String,
    total_balance: String,
    granted_balance: String,
    topped_up_balance: String,
}

impl MockDeepSeekServer {
    /// Start a new mock server on a random available port
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(AtomicUsize::new(0));

        // Non-blocking accept so the loop can notice shutdown
        listener.set_nonblocking(true)?;

        let running_clone = Arc::clone(&running);
        let requests_clone = Arc::clone(&requests);
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let cfg = config.clone();
                        let counter = Arc::clone(&requests_clone);
                        thread::spawn(move || handle_connection(stream, &cfg, &counter));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            requests,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Number of balance requests received (including rejected ones)
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockDeepSeekServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, config: &MockConfig, requests: &AtomicUsize) {
    let _ = stream.set_nonblocking(false);
    let mut buffer = [0; 8192];

    let Ok(n) = stream.read(&mut buffer) else {
        return;
    };
    let request = String::from_utf8_lossy(&buffer[..n]);

    if config.delay_ms > 0 {
        thread::sleep(std::time::Duration::from_millis(config.delay_ms));
    }

    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_response(&mut stream, 400, "Bad Request", r#"{"error": "Invalid request"}"#);
        return;
    }

    let (method, path) = (parts[0], parts[1]);
    let path = path.split('?').next().unwrap_or(path);

    if method != "GET" || path != BALANCE_PATH {
        send_response(&mut stream, 404, "Not Found", r#"{"error": "Endpoint not found"}"#);
        return;
    }

    requests.fetch_add(1, Ordering::SeqCst);

    let has_valid_auth = request
        .lines()
        .filter_map(|line| line.split_once(':'))
        .any(|(name, value)| {
            name.trim().eq_ignore_ascii_case("authorization")
                && value.trim().starts_with("Bearer sk-")
        });

    if config.fail_auth || !has_valid_auth {
        send_response(
            &mut stream,
            401,
            "Unauthorized",
            r#"{"error": {"message": "Authentication Fails", "type": "authentication_error"}}"#,
        );
        return;
    }

    if let Some(status) = config.status {
        send_response(&mut stream, status, "Mock Status", r#"{"error": "forced"}"#);
        return;
    }

    if config.malformed_body {
        send_response(&mut stream, 200, "OK", r#"{"balance_infos": "nope"}"#);
        return;
    }

    let mut balance_infos = vec![BalanceEntry {
        currency: "USD".to_string(),
        total_balance: "3.20".to_string(),
        granted_balance: "0.00".to_string(),
        topped_up_balance: "3.20".to_string(),
    }];
    if config.include_cny {
        balance_infos.push(BalanceEntry {
            currency: "CNY".to_string(),
            total_balance: config.total.clone(),
            granted_balance: "10.00".to_string(),
            topped_up_balance: "100.00".to_string(),
        });
    }

    let document = BalanceDocument {
        is_available: true,
        balance_infos,
    };
    let json = serde_json::to_string(&document).unwrap_or_default();
    send_response(&mut stream, 200, "OK", &json);
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_server_starts() {
        let server = MockDeepSeekServer::start(MockConfig::default()).unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert_eq!(server.request_count(), 0);
    }
}
