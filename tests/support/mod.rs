//! Minimal HTTP stub of the detection service for integration tests.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtod_client::{DetectError, DetectionBatch, Frame, LogSink, Renderer};

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl CannedResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub const PERSON_REPLY: &str = r#"[{"class":"person","confidence":0.92,"box":[10,10,50,50]}]"#;

/// Serves every request with the same canned response and records it.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub fn start(response: CannedResponse) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let recorded = recorded.clone();
                let response = response.clone();
                std::thread::spawn(move || {
                    let _ = serve(stream, &response, &recorded);
                });
            }
        });
        Self { base_url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn detect_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|req| req.path == "/detect")
            .count()
    }
}

fn serve(
    stream: TcpStream,
    response: &CannedResponse,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    let mut content_type = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type = value.to_string();
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    recorded.lock().unwrap().push(RecordedRequest {
        method,
        path,
        content_type,
        body,
    });

    std::thread::sleep(response.delay);
    let reply = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.body.len(),
        response.body
    );
    let mut stream = stream;
    stream.write_all(reply.as_bytes())?;
    stream.flush()
}

/// Base URL of a port with nothing listening.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub batches: Mutex<Vec<DetectionBatch>>,
}

impl RecordingRenderer {
    pub fn batches(&self) -> Vec<DetectionBatch> {
        self.batches.lock().unwrap().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, _frame: &Frame, batch: &DetectionBatch) {
        self.batches.lock().unwrap().push(batch.clone());
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub errors: Mutex<Vec<DetectError>>,
    pub classes: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn errors(&self) -> Vec<DetectError> {
        self.errors.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn report(&self, error: &DetectError) {
        self.errors.lock().unwrap().push(error.clone());
    }

    fn new_class(&self, class: &str) {
        self.classes.lock().unwrap().push(class.to_string());
    }
}
