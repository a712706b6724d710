//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use buffer_agent::forward::{EventSink, HttpTransport, TaskEvent};
use buffer_agent::task::TaskReport;
use buffer_agent::{AgentConfig, RelayServer, ServeError};

/// A destination on a random local port.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Raw requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Build a relay request-target pointing at this backend.
    pub fn target(&self, path: &str) -> String {
        format!("/http://{}{}", self.addr, path)
    }
}

/// Start a backend that answers the n-th request (0-based) with `status(n)`,
/// after sleeping `delay`.
pub async fn start_programmable_backend<F>(delay: Duration, status: F) -> MockBackend
where
    F: Fn(u32) -> u16 + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let status = Arc::new(status);

    {
        let hits = Arc::clone(&hits);
        let requests = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let hits = Arc::clone(&hits);
                let requests = Arc::clone(&requests);
                let status = Arc::clone(&status);
                tokio::spawn(async move {
                    let raw = read_http_request(&mut socket).await;
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    requests.lock().unwrap().push(raw);

                    tokio::time::sleep(delay).await;
                    let code = status(n);
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                        code,
                        reason(code)
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
    }

    MockBackend {
        addr,
        hits,
        requests,
    }
}

/// Start a backend that always answers `status` immediately.
pub async fn start_mock_backend(status: u16) -> MockBackend {
    start_programmable_backend(Duration::ZERO, move |_| status).await
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Read one request: headers up to the blank line, then `Content-Length` bytes.
async fn read_http_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// Collects task events in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(TaskEvent, TaskReport)>>,
}

impl RecordingSink {
    pub fn done(&self) -> Vec<TaskReport> {
        self.of(TaskEvent::Done)
    }

    pub fn puts(&self) -> Vec<TaskReport> {
        self.of(TaskEvent::Put)
    }

    fn of(&self, kind: TaskEvent) -> Vec<TaskReport> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event, _)| *event == kind)
            .map(|(_, report)| report.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TaskEvent, report: &TaskReport) {
        self.events.lock().unwrap().push((event, report.clone()));
    }
}

/// Loopback config on a random port with fast polling and no system proxy.
pub fn relay_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.port = 0;
    config.listener.host = "127.0.0.1".into();
    config.listener.read_timeout_ms = 500;
    config.forward.poll_interval_ms = 20;
    config.forward.request_timeout_secs = 5;
    config.forward.system_proxy = false;
    config
}

/// A relay running in the background with a recording sink.
pub struct RunningRelay {
    pub server: Arc<RelayServer>,
    pub sink: Arc<RecordingSink>,
    serving: JoinHandle<Result<(), ServeError>>,
}

impl RunningRelay {
    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Shut down and wait for the accept loop to return.
    pub async fn stop(self) {
        self.server.shutdown().await;
        self.serving.await.unwrap().unwrap();
    }
}

pub async fn start_relay(config: AgentConfig) -> RunningRelay {
    let sink = Arc::new(RecordingSink::default());
    let transport = HttpTransport::new(config.forward.request_timeout())
        .with_system_proxy(config.forward.system_proxy);
    let server = Arc::new(
        RelayServer::bind_with(&config, Arc::new(transport), sink.clone())
            .await
            .unwrap(),
    );

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve().await })
    };
    // Let the accept loop start.
    tokio::time::sleep(Duration::from_millis(20)).await;

    RunningRelay {
        server,
        sink,
        serving,
    }
}

/// Send one raw request to the relay and read the whole response.
pub async fn send_raw(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

/// JSON body of a relay acknowledgement.
pub fn ack_body(response: &str) -> serde_json::Value {
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}
