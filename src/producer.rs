//! Frame producer.
//!
//! Drives capture cadence for one session:
//! 1. Waits `interval` on a stop channel (stop wakes it immediately)
//! 2. Drops the tick if a request is outstanding
//! 3. Pulls the next image from the source and encodes it to JPEG
//! 4. Submits the frame through the session gate
//!
//! Capture and encode failures forfeit the tick; only a failure to connect the source
//! prevents capture from starting.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::anyhow;

use crate::detect::{service_for_url, DetectionService};
use crate::error::DetectError;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::session::{ProducerState, Session, SessionConfig, SessionStats, TickOutcome};
use crate::sink::{LogSink, Renderer};

pub struct Producer<S: FrameSource + 'static> {
    session: Session,
    source: Option<S>,
    worker: Option<TimerWorker<S>>,
}

struct TimerWorker<S> {
    stop_tx: mpsc::Sender<()>,
    join: JoinHandle<S>,
}

impl<S: FrameSource + 'static> Producer<S> {
    /// Build a producer whose detection service comes from `config.backend_url`.
    pub fn new(
        config: SessionConfig,
        source: S,
        renderer: Arc<dyn Renderer>,
        log_sink: Arc<dyn LogSink>,
    ) -> anyhow::Result<Self> {
        let service = service_for_url(&config.backend_url, config.request_timeout)?;
        Ok(Self::with_service(config, source, service, renderer, log_sink))
    }

    pub fn with_service(
        config: SessionConfig,
        source: S,
        service: Arc<dyn DetectionService>,
        renderer: Arc<dyn Renderer>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            session: Session::new(config, service, renderer, log_sink),
            source: Some(source),
            worker: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ProducerState {
        self.session.phase()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn seen_classes(&self) -> Vec<String> {
        self.session.seen_classes()
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    /// Connect the source and start ticking.
    ///
    /// A connect failure is reported as a capture error and capture does not start.
    pub fn start(&mut self) -> Result<(), DetectError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut source = self
            .source
            .take()
            .ok_or_else(|| DetectError::Capture("frame source unavailable".to_string()))?;

        if let Err(e) = source.connect() {
            let error = DetectError::Capture(format!("{}: {:#}", source.describe(), e));
            self.source = Some(source);
            self.session.log_sink().report(&error);
            return Err(error);
        }

        self.session.begin();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let session = self.session.clone();
        let interval = session.config().interval;
        log::info!(
            "producer started: source={} interval={}ms",
            source.describe(),
            interval.as_millis()
        );
        let join = std::thread::spawn(move || {
            let mut sequence = 0u64;
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let outcome = run_tick(&session, &mut source, &mut sequence);
                        log::trace!("tick: {:?}", outcome);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            source
        });
        self.worker = Some(TimerWorker { stop_tx, join });
        Ok(())
    }

    /// Stop ticking. Any outstanding request's result is discarded.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        self.session.end();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = worker.stop_tx.send(());
        let source = worker
            .join
            .join()
            .map_err(|_| anyhow!("producer timer thread panicked"))?;
        self.source = Some(source);
        log::info!("producer stopped");
        Ok(())
    }
}

impl<S: FrameSource + 'static> Drop for Producer<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("producer stop failed: {}", e);
        }
    }
}

/// One capture tick.
pub(crate) fn run_tick<S: FrameSource + ?Sized>(
    session: &Session,
    source: &mut S,
    sequence: &mut u64,
) -> TickOutcome {
    if session.phase() == ProducerState::Stopped {
        return TickOutcome::Stopped;
    }
    if session.request_outstanding() {
        session.note_skipped();
        log::debug!("tick skipped: request still outstanding");
        return TickOutcome::SkippedInFlight;
    }

    let image = match source.next_image() {
        Ok(Some(image)) => image,
        Ok(None) => return TickOutcome::NoFrame,
        Err(e) => {
            session.report(DetectError::Capture(format!(
                "{}: {:#}",
                source.describe(),
                e
            )));
            return TickOutcome::CaptureFailed;
        }
    };

    let frame = match Frame::encode(&image, session.config().jpeg_quality, *sequence) {
        Ok(frame) => frame,
        Err(error) => {
            session.report(error);
            return TickOutcome::EncodeFailed;
        }
    };
    *sequence += 1;
    session.submit(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::ingest::{SourceStats, SyntheticConfig, SyntheticSource};
    use crate::sink::{EnvLogSink, LogRenderer};
    use image::RgbImage;
    use std::time::Duration;

    struct EmptyImageSource;

    impl FrameSource for EmptyImageSource {
        fn describe(&self) -> String {
            "empty".to_string()
        }

        fn connect(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn next_image(&mut self) -> anyhow::Result<Option<RgbImage>> {
            Ok(Some(RgbImage::new(0, 0)))
        }

        fn stats(&self) -> SourceStats {
            SourceStats::default()
        }
    }

    fn session_with(service: Arc<StubBackend>) -> Session {
        Session::new(
            SessionConfig::default(),
            service,
            Arc::new(LogRenderer),
            Arc::new(EnvLogSink),
        )
    }

    #[test]
    fn tick_encodes_and_submits() {
        let service = Arc::new(StubBackend::person());
        let session = session_with(service.clone());
        session.begin();
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 32,
            height: 32,
            ..SyntheticConfig::default()
        });
        source.connect().unwrap();
        let mut sequence = 0;

        assert_eq!(
            run_tick(&session, &mut source, &mut sequence),
            TickOutcome::Submitted
        );
        assert!(session.wait_idle(Duration::from_secs(5)));
        assert_eq!(sequence, 1);
        assert_eq!(service.calls(), 1);
        assert_eq!(session.seen_classes(), vec!["person"]);
    }

    #[test]
    fn empty_encode_forfeits_tick() {
        let service = Arc::new(StubBackend::person());
        let session = session_with(service.clone());
        session.begin();
        let mut sequence = 0;

        assert_eq!(
            run_tick(&session, &mut EmptyImageSource, &mut sequence),
            TickOutcome::EncodeFailed
        );
        assert_eq!(service.calls(), 0);
        assert_eq!(session.stats().encode_failures, 1);
        assert_eq!(session.phase(), ProducerState::Idle);
    }

    #[test]
    fn stopped_session_does_not_capture() {
        let service = Arc::new(StubBackend::person());
        let session = session_with(service.clone());
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        source.connect().unwrap();
        let mut sequence = 0;

        assert_eq!(
            run_tick(&session, &mut source, &mut sequence),
            TickOutcome::Stopped
        );
        assert_eq!(source.stats().frames_captured, 0);
    }
}
