use super::types::{InferOptions, SegmentationError, SegmentationMask, SegmentationModel};
use crate::capture::Frame;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Loads the model on the worker thread.
pub type ModelLoader =
    Box<dyn FnOnce() -> Result<Box<dyn SegmentationModel>, SegmentationError> + Send>;

/// Where the engine is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Loading,
    Ready,
    Unavailable(SegmentationError),
}

/// Outcome of asking for an inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Accepted under this sequence number.
    Submitted(u64),
    /// Another inference is still running; skip this tick.
    Busy,
    /// The model is loading or failed to load.
    NotReady,
}

/// A finished inference.
#[derive(Debug, Clone)]
pub struct Inference {
    pub sequence: u64,
    pub mask: Arc<SegmentationMask>,
    pub elapsed: Duration,
}

struct Request {
    sequence: u64,
    frame: Frame,
}

enum WorkerMessage {
    Loaded { name: String },
    LoadFailed(SegmentationError),
    Finished {
        sequence: u64,
        result: Result<SegmentationMask, SegmentationError>,
        elapsed: Duration,
    },
}

/// Runs a segmentation model on its own thread with at most one inference
/// in flight. Submitting while busy is refused rather than queued.
///
/// Dropping the engine closes the request channel; an inference still running
/// completes on the worker and its result is discarded.
pub struct SegmentationEngine {
    requests: Option<Sender<Request>>,
    results: Receiver<WorkerMessage>,
    status: EngineStatus,
    next_sequence: u64,
    in_flight: Option<u64>,
}

impl SegmentationEngine {
    /// Start the worker and begin loading the model in the background.
    pub fn spawn(loader: ModelLoader, options: InferOptions) -> Result<Self, SegmentationError> {
        // One slot: a request waiting or running means the engine is busy.
        let (request_tx, request_rx) = crossbeam_channel::bounded::<Request>(1);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<WorkerMessage>();

        std::thread::Builder::new()
            .name("segmentation".to_string())
            .spawn(move || worker(loader, options, request_rx, result_tx))
            .map_err(|e| SegmentationError::ModelLoadFailed(format!("spawn worker: {}", e)))?;

        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            status: EngineStatus::Loading,
            next_sequence: 0,
            in_flight: None,
        })
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Hand `frame` to the worker unless it is busy or not ready.
    pub fn infer(&mut self, frame: &Frame) -> Submission {
        if self.status != EngineStatus::Ready {
            return Submission::NotReady;
        }
        if self.in_flight.is_some() {
            return Submission::Busy;
        }
        let Some(requests) = self.requests.as_ref() else {
            return Submission::NotReady;
        };

        let sequence = self.next_sequence;
        let request = Request {
            sequence,
            frame: frame.clone(),
        };
        match requests.try_send(request) {
            Ok(()) => {
                self.next_sequence += 1;
                self.in_flight = Some(sequence);
                tracing::debug!("Inference {} submitted for frame {}", sequence, frame.sequence());
                Submission::Submitted(sequence)
            }
            Err(TrySendError::Full(_)) => Submission::Busy,
            Err(TrySendError::Disconnected(_)) => {
                self.mark_unavailable(SegmentationError::WorkerUnavailable);
                Submission::NotReady
            }
        }
    }

    /// Drain finished work without blocking; returns the newest successful
    /// inference, if any completed since the last poll.
    pub fn poll(&mut self) -> Option<Inference> {
        let mut latest = None;
        loop {
            match self.results.try_recv() {
                Ok(message) => {
                    if let Some(done) = self.handle(message) {
                        latest = Some(done);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.status != EngineStatus::Ready || self.in_flight.is_some() {
                        self.mark_unavailable(SegmentationError::WorkerUnavailable);
                    }
                    break;
                }
            }
        }
        latest
    }

    /// Block until the model finishes loading or the in-flight inference
    /// resolves, up to `timeout`. Returns the inference if one succeeded.
    pub fn wait(&mut self, timeout: Duration) -> Option<Inference> {
        let deadline = Instant::now() + timeout;
        while self.status == EngineStatus::Loading || self.in_flight.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(message) => {
                    if let Some(done) = self.handle(message) {
                        return Some(done);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.mark_unavailable(SegmentationError::WorkerUnavailable);
                    return None;
                }
            }
        }
        None
    }

    /// Stop accepting work. The worker exits once any running inference ends.
    pub fn shutdown(&mut self) {
        if self.requests.take().is_some() {
            tracing::debug!("Segmentation engine shutting down");
        }
    }

    fn handle(&mut self, message: WorkerMessage) -> Option<Inference> {
        match message {
            WorkerMessage::Loaded { name } => {
                tracing::info!("Segmentation model '{}' ready", name);
                self.status = EngineStatus::Ready;
                None
            }
            WorkerMessage::LoadFailed(err) => {
                tracing::warn!("{}; continuing without background removal", err);
                self.mark_unavailable(err);
                None
            }
            WorkerMessage::Finished {
                sequence,
                result,
                elapsed,
            } => {
                if self.in_flight == Some(sequence) {
                    self.in_flight = None;
                }
                match result {
                    Ok(mask) => {
                        tracing::debug!(
                            "Inference {} finished in {:.1}ms ({}x{} mask)",
                            sequence,
                            elapsed.as_secs_f64() * 1000.0,
                            mask.width(),
                            mask.height()
                        );
                        Some(Inference {
                            sequence,
                            mask: Arc::new(mask),
                            elapsed,
                        })
                    }
                    Err(err) => {
                        tracing::warn!("Inference {} failed: {}", sequence, err);
                        None
                    }
                }
            }
        }
    }

    fn mark_unavailable(&mut self, err: SegmentationError) {
        self.in_flight = None;
        self.status = EngineStatus::Unavailable(err);
    }
}

impl Drop for SegmentationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(
    loader: ModelLoader,
    options: InferOptions,
    requests: Receiver<Request>,
    results: Sender<WorkerMessage>,
) {
    let mut model = match loader() {
        Ok(model) => model,
        Err(err) => {
            let _ = results.send(WorkerMessage::LoadFailed(err));
            return;
        }
    };
    model.reset_state();
    if results
        .send(WorkerMessage::Loaded {
            name: model.name().to_string(),
        })
        .is_err()
    {
        return;
    }

    while let Ok(request) = requests.recv() {
        let started = Instant::now();
        let result = model.segment(request.frame.image(), &options);
        let message = WorkerMessage::Finished {
            sequence: request.sequence,
            result,
            elapsed: started.elapsed(),
        };
        // The engine may be gone by now; the result is simply dropped.
        if results.send(message).is_err() {
            break;
        }
    }
    tracing::debug!("Segmentation worker stopped");
}

/// The single "latest mask" slot read every paint tick.
///
/// Publishing replaces the whole mask at once and never moves backwards: a
/// result older than the installed one is discarded.
#[derive(Debug, Default)]
pub struct MaskSlot {
    latest: Option<(u64, Arc<SegmentationMask>)>,
}

impl MaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `mask` computed by inference `sequence`. Returns false if a
    /// newer result is already installed.
    pub fn publish(&mut self, sequence: u64, mask: Arc<SegmentationMask>) -> bool {
        if let Some((current, _)) = &self.latest {
            if sequence <= *current {
                tracing::debug!(
                    "Discarding stale mask {} (installed {})",
                    sequence,
                    current
                );
                return false;
            }
        }
        self.latest = Some((sequence, mask));
        true
    }

    pub fn current(&self) -> Option<&SegmentationMask> {
        self.latest.as_ref().map(|(_, mask)| mask.as_ref())
    }

    /// Sequence number of the installed mask.
    pub fn generation(&self) -> Option<u64> {
        self.latest.as_ref().map(|(sequence, _)| *sequence)
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(cell: u8) -> Arc<SegmentationMask> {
        Arc::new(SegmentationMask::from_raw(1, 1, vec![cell]).unwrap())
    }

    #[test]
    fn slot_starts_empty() {
        let slot = MaskSlot::new();
        assert!(slot.current().is_none());
        assert_eq!(slot.generation(), None);
    }

    #[test]
    fn slot_rejects_older_results() {
        let mut slot = MaskSlot::new();
        assert!(slot.publish(3, mask(1)));
        assert!(!slot.publish(2, mask(0)));
        assert!(!slot.publish(3, mask(0)));

        assert_eq!(slot.generation(), Some(3));
        assert!(slot.current().unwrap().is_foreground(0, 0));

        assert!(slot.publish(4, mask(0)));
        assert!(!slot.current().unwrap().is_foreground(0, 0));
    }
}
