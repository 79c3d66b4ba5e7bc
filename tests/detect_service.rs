//! HTTP detection client against a local stub service.
//!
//! These tests verify that:
//! 1. A frame is uploaded as multipart field `file` to `POST /detect`
//! 2. A valid reply becomes exactly the boxes the service sent
//! 3. A backend error surfaces its `detail` and applies nothing
//! 4. An unreachable service is a transport error, reported to the log sink
//! 5. The status endpoint is parsed

mod support;

use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use rtod_client::{
    DetectError, DetectionService, Frame, HttpBackend, HttpBackendConfig, ProducerState, Session,
    SessionConfig, TickOutcome,
};
use support::{
    closed_port_url, CannedResponse, RecordingRenderer, RecordingSink, StubServer, PERSON_REPLY,
};

fn test_frame(sequence: u64) -> Frame {
    let image = RgbImage::from_pixel(64, 48, Rgb([120, 80, 40]));
    Frame::encode(&image, 80, sequence).expect("encode test frame")
}

fn backend(base_url: &str) -> HttpBackend {
    HttpBackend::new(HttpBackendConfig {
        base_url: base_url.to_string(),
        timeout: Some(Duration::from_secs(5)),
    })
    .expect("backend")
}

fn session_for(
    base_url: &str,
) -> (Session, Arc<RecordingRenderer>, Arc<RecordingSink>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let sink = Arc::new(RecordingSink::default());
    let session = Session::new(
        SessionConfig {
            backend_url: base_url.to_string(),
            ..SessionConfig::default()
        },
        Arc::new(backend(base_url)),
        renderer.clone(),
        sink.clone(),
    );
    (session, renderer, sink)
}

#[test]
fn uploads_multipart_file_field_to_detect() {
    let server = StubServer::start(CannedResponse::json(200, "[]"));
    let frame = test_frame(0);

    let batch = backend(&server.base_url).detect(&frame).expect("detect");
    assert!(batch.is_empty());

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/detect");
    assert!(req.content_type.starts_with("multipart/form-data; boundary="));

    let body = String::from_utf8_lossy(&req.body);
    assert!(body.contains(r#"Content-Disposition: form-data; name="file"; filename="frame.jpg""#));
    assert!(body.contains("Content-Type: image/jpeg"));
    let jpeg = frame.jpeg_bytes();
    assert!(req
        .body
        .windows(jpeg.len())
        .any(|window| window == jpeg));
}

#[test]
fn person_reply_renders_exactly_one_box() {
    let server = StubServer::start(CannedResponse::json(200, PERSON_REPLY));
    let (session, renderer, sink) = session_for(&server.base_url);
    session.begin();

    assert_eq!(session.submit(test_frame(1)), TickOutcome::Submitted);
    assert!(session.wait_idle(Duration::from_secs(5)));

    let batches = renderer.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].frame_sequence, 1);
    assert_eq!(batches[0].len(), 1);
    let det = batches[0].iter().next().unwrap();
    assert_eq!(det.class(), "person");
    assert_eq!(det.bbox(), [10.0, 10.0, 50.0, 50.0]);
    assert_eq!(det.display_confidence(), "92.0%");
    assert_eq!(det.label(), "person 92.0%");

    assert_eq!(session.seen_classes(), vec!["person"]);
    assert_eq!(*sink.classes.lock().unwrap(), vec!["person".to_string()]);
    assert!(sink.errors().is_empty());
}

#[test]
fn backend_error_reaches_log_sink_and_applies_nothing() {
    let server = StubServer::start(CannedResponse::json(500, r#"{"detail":"model error"}"#));
    let (session, renderer, sink) = session_for(&server.base_url);
    session.begin();

    assert_eq!(session.submit(test_frame(2)), TickOutcome::Submitted);
    assert!(session.wait_idle(Duration::from_secs(5)));

    assert!(renderer.batches().is_empty());
    assert!(session.seen_classes().is_empty());
    let errors = sink.errors();
    assert_eq!(
        errors,
        vec![DetectError::Backend {
            status: 500,
            detail: "model error".to_string(),
        }]
    );
    assert!(errors[0].to_string().contains("model error"));
    assert_eq!(session.stats().backend_errors, 1);
    assert_eq!(session.phase(), ProducerState::Idle);
}

#[test]
fn unreachable_service_is_transport_error() {
    let url = closed_port_url();
    let err = backend(&url).detect(&test_frame(3)).unwrap_err();
    assert!(matches!(err, DetectError::Transport(_)), "got {:?}", err);
    assert_eq!(err.code(), "transport");
}

#[test]
fn transport_error_reaches_log_sink_and_next_submit_retries() {
    let (session, renderer, sink) = session_for(&closed_port_url());
    session.begin();

    assert_eq!(session.submit(test_frame(10)), TickOutcome::Submitted);
    assert!(session.wait_idle(Duration::from_secs(5)));

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], DetectError::Transport(_)), "got {:?}", errors[0]);
    assert_eq!(session.stats().transport_errors, 1);
    assert_eq!(session.phase(), ProducerState::Idle);
    assert!(renderer.batches().is_empty());

    assert_eq!(session.submit(test_frame(11)), TickOutcome::Submitted);
    assert!(session.wait_idle(Duration::from_secs(5)));
    assert_eq!(sink.errors().len(), 2);
    assert_eq!(session.stats().frames_submitted, 2);
    assert_eq!(session.stats().transport_errors, 2);
}

#[test]
fn malformed_reply_applies_empty_batch() {
    let server = StubServer::start(CannedResponse::json(200, r#"{"unexpected":true}"#));
    let batch = backend(&server.base_url)
        .detect(&test_frame(4))
        .expect("detect");
    assert!(batch.is_empty());
    assert_eq!(batch.frame_sequence, 4);
}

#[test]
fn out_of_range_confidence_is_dropped() {
    let reply = r#"[
        {"class":"person","confidence":0.92,"box":[10,10,50,50]},
        {"class":"dog","confidence":1.7,"box":[0,0,5,5]}
    ]"#;
    let server = StubServer::start(CannedResponse::json(200, reply));
    let batch = backend(&server.base_url)
        .detect(&test_frame(5))
        .expect("detect");
    assert_eq!(batch.len(), 1);
    assert!(batch
        .iter()
        .all(|det| (0.0..=1.0).contains(&det.confidence())));
}

#[test]
fn status_endpoint_is_parsed() {
    let reply = r#"{
        "status": "ok",
        "message": "Real-time Object Detection API is running",
        "model_loaded": true,
        "model_device": "cpu",
        "cuda_available": false,
        "yolo_model_path": "yolov8n.pt",
        "confidence_threshold": 0.5
    }"#;
    let server = StubServer::start(CannedResponse::json(200, reply));
    let status = backend(&server.base_url).status().expect("status");

    assert!(status.is_ready());
    assert_eq!(status.model_device, "cpu");
    assert_eq!(status.confidence_threshold, Some(0.5));
    let requests = server.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/status");
}

#[test]
fn trailing_slash_in_base_url_is_normalized() {
    let server = StubServer::start(CannedResponse::json(200, "[]"));
    let base = format!("{}/", server.base_url);
    backend(&base).detect(&test_frame(6)).expect("detect");
    assert_eq!(server.requests()[0].path, "/detect");
}
