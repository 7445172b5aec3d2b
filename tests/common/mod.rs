//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use endpoint_monitor::health::reporter::{ReportError, StatusReporter, TripNotice};
use endpoint_monitor::health::{ProbeOutcome, ProbeTransport};
use futures_util::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One scripted probe answer.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub ok: bool,
    pub latency: Duration,
}

pub fn up(ms: u64) -> Step {
    Step {
        ok: true,
        latency: Duration::from_millis(ms),
    }
}

pub fn down() -> Step {
    Step {
        ok: false,
        latency: Duration::ZERO,
    }
}

/// Hangs past any sane probe timeout.
pub fn hang() -> Step {
    Step {
        ok: true,
        latency: Duration::from_secs(3600),
    }
}

#[derive(Default)]
struct Script {
    steps: HashMap<String, VecDeque<Step>>,
    fallback: HashMap<String, Step>,
    calls: HashMap<String, usize>,
}

/// Probe transport answering from per-endpoint scripts, in Tokio time.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for `endpoint`, consumed in order.
    pub fn push(&self, endpoint: &str, steps: impl IntoIterator<Item = Step>) {
        let mut script = self.script.lock().unwrap();
        script
            .steps
            .entry(endpoint.to_string())
            .or_default()
            .extend(steps);
    }

    /// Answer used once the queue for `endpoint` is empty. Defaults to `up(10)`.
    pub fn always(&self, endpoint: &str, step: Step) {
        self.script
            .lock()
            .unwrap()
            .fallback
            .insert(endpoint.to_string(), step);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }
}

impl ProbeTransport for ScriptedTransport {
    fn probe(&self, endpoint: &str, _timeout: Duration) -> BoxFuture<'static, ProbeOutcome> {
        let step = {
            let mut script = self.script.lock().unwrap();
            *script.calls.entry(endpoint.to_string()).or_default() += 1;
            let queued = script.steps.get_mut(endpoint).and_then(VecDeque::pop_front);
            queued
                .or_else(|| script.fallback.get(endpoint).copied())
                .unwrap_or_else(|| up(10))
        };

        async move {
            tokio::time::sleep(step.latency).await;
            ProbeOutcome {
                ok: step.ok,
                elapsed: step.latency,
            }
        }
        .boxed()
    }
}

/// Status reporter that records every trip report.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<TripNotice>>>,
    fail: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter whose every report fails after being recorded.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<TripNotice> {
        self.reports.lock().unwrap().clone()
    }
}

impl StatusReporter for RecordingReporter {
    fn report_tripped(&self, endpoint: &str, message: &str) -> BoxFuture<'static, Result<(), ReportError>> {
        self.reports.lock().unwrap().push(TripNotice {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        });
        let fail = self.fail;
        async move {
            if fail {
                Err(ReportError::Rejected(503))
            } else {
                Ok(())
            }
        }
        .boxed()
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the raw request head and returns `(status, body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_request_head(&mut socket).await;
                        let (status, body) = f(head).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
