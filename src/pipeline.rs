//! Per-frame detection pipeline and the loop that drives it.
//!
//! One cycle: take a frame from the source, run the detector (bounded by a
//! timeout), keep allow-listed classes, label people with an activity, draw
//! the overlay and prepend a history entry when anything was kept.
//!
//! The last person box lives in a `PipelineState` value. Callers pass it into
//! `FramePipeline::run_cycle` and get the next state back; nothing else holds
//! it.

use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::activity::{self, ActivityThresholds, PreviousObservation};
use crate::detect::{Detection, DetectorBackend, RawDetection};
use crate::filter::AllowList;
use crate::frame::{Frame, FrameDimensions};
use crate::history::{HistoryEntry, HistoryLog, HistoryView, MAX_HISTORY_ENTRIES};
use crate::ingest::VideoSource;
use crate::overlay::{OverlayRenderer, Surface};
use crate::selection;

/// Default bound on a single detector call.
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default loop pacing, roughly one display refresh.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// State carried from one cycle to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PipelineState {
    previous: Option<PreviousObservation>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_previous(previous: PreviousObservation) -> Self {
        Self {
            previous: Some(previous),
        }
    }

    pub fn previous(&self) -> Option<&PreviousObservation> {
        self.previous.as_ref()
    }
}

/// Label every person in detector order.
///
/// Each person is compared with the previous person box, then becomes the
/// previous box for the next one.
pub fn annotate_activity(
    detections: &mut [Detection],
    state: PipelineState,
    thresholds: &ActivityThresholds,
) -> PipelineState {
    let mut previous = state.previous;
    for det in detections.iter_mut().filter(|det| det.class.is_person()) {
        det.activity = Some(activity::estimate(
            Some(&det.bbox),
            previous.as_ref(),
            thresholds,
        ));
        previous = Some(PreviousObservation::new(det.bbox));
    }
    PipelineState { previous }
}

/// Pipeline tuning.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub allow_list: AllowList,
    pub thresholds: ActivityThresholds,
    /// Frame size `thresholds` were tuned for. Other sizes are rejected.
    pub resolution: FrameDimensions,
    pub detect_timeout: Duration,
    pub history_capacity: usize,
    pub overlay_visible: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            allow_list: AllowList::default(),
            thresholds: ActivityThresholds::default(),
            resolution: FrameDimensions::new(
                ActivityThresholds::CALIBRATION_WIDTH,
                ActivityThresholds::CALIBRATION_HEIGHT,
            ),
            detect_timeout: DEFAULT_DETECT_TIMEOUT,
            history_capacity: MAX_HISTORY_ENTRIES,
            overlay_visible: true,
        }
    }
}

/// Why a cycle did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Inactive,
    DetectorLoading,
    SourceNotReady,
    /// The source was ready but the read failed.
    FrameUnavailable,
    EmptyFrame,
}

/// Result of one processed frame, handed to display consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub dimensions: FrameDimensions,
    pub detections: Vec<Detection>,
    /// Entry prepended to the history, if any detection was kept.
    pub history_entry: Option<HistoryEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    /// The loop was stopped while the detector was running; the result was dropped.
    Discarded,
    Processed(FrameReport),
}

// ----------------------------------------------------------------------------
// DetectorWorker: detector on its own thread, calls bounded by a timeout
// ----------------------------------------------------------------------------

enum WorkerEvent {
    Ready(Result<()>),
    Detected {
        seq: u64,
        result: Result<Vec<RawDetection>>,
    },
}

struct DetectRequest {
    seq: u64,
    frame: Frame,
}

/// Owns a detector backend on a dedicated thread.
///
/// The backend's `warm_up` runs on the thread first; until it finishes the
/// worker reports itself as not loaded. A call that exceeds its timeout marks
/// the worker hung and every later call fails. A late answer to a timed-out
/// request is dropped by sequence number.
pub struct DetectorWorker {
    name: &'static str,
    requests: Option<Sender<DetectRequest>>,
    events: Receiver<WorkerEvent>,
    join: Option<JoinHandle<()>>,
    next_seq: u64,
    loaded: bool,
    hung: bool,
}

impl DetectorWorker {
    pub fn spawn(mut backend: Box<dyn DetectorBackend>) -> Result<Self> {
        let name = backend.name();
        let (request_tx, request_rx) = mpsc::channel::<DetectRequest>();
        let (event_tx, event_rx) = mpsc::channel();

        let join = std::thread::Builder::new()
            .name(format!("detector-{name}"))
            .spawn(move || {
                let ready = backend.warm_up();
                let failed = ready.is_err();
                if event_tx.send(WorkerEvent::Ready(ready)).is_err() || failed {
                    return;
                }
                for request in request_rx {
                    let result = backend.detect(request.frame.view());
                    let event = WorkerEvent::Detected {
                        seq: request.seq,
                        result,
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            name,
            requests: Some(request_tx),
            events: event_rx,
            join: Some(join),
            next_seq: 0,
            loaded: false,
            hung: false,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Non-blocking check whether warm-up has finished.
    ///
    /// A failed warm-up is returned as an error.
    pub fn poll_loaded(&mut self) -> Result<bool> {
        if self.loaded {
            return Ok(true);
        }
        match self.events.try_recv() {
            Ok(WorkerEvent::Ready(result)) => {
                result.map_err(|e| anyhow!("detector {} failed to load: {}", self.name, e))?;
                log::info!("detector {} loaded", self.name);
                self.loaded = true;
                Ok(true)
            }
            Ok(WorkerEvent::Detected { seq, .. }) => {
                log::debug!("detector {}: dropping stray result #{}", self.name, seq);
                Ok(false)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => {
                Err(anyhow!("detector {} worker exited", self.name))
            }
        }
    }

    /// Block until warm-up finishes or `timeout` elapses.
    pub fn wait_loaded(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.poll_loaded()? {
            if Instant::now() >= deadline {
                bail!("detector {} did not load within {:?}", self.name, timeout);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_hung(&self) -> bool {
        self.hung
    }

    /// Run the detector on `frame`, waiting at most `timeout`.
    pub fn detect(&mut self, frame: Frame, timeout: Duration) -> Result<Vec<RawDetection>> {
        if self.hung {
            bail!("detector {} is hung after an earlier timeout", self.name);
        }
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| anyhow!("detector {} is shut down", self.name))?;

        self.next_seq += 1;
        let seq = self.next_seq;
        requests
            .send(DetectRequest { seq, frame })
            .map_err(|_| anyhow!("detector {} worker exited", self.name))?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(WorkerEvent::Detected { seq: got, result }) if got == seq => return result,
                Ok(WorkerEvent::Detected { seq: got, .. }) => {
                    log::debug!("detector {}: dropping stale result #{}", self.name, got);
                }
                Ok(WorkerEvent::Ready(result)) => {
                    result?;
                    self.loaded = true;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.hung = true;
                    bail!("detector {} timed out after {:?}", self.name, timeout);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("detector {} worker exited", self.name);
                }
            }
        }
    }
}

impl Drop for DetectorWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(join) = self.join.take() {
            // A hung backend would block forever; leave that thread detached.
            if !self.hung && join.join().is_err() {
                log::error!("detector {} worker panicked", self.name);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// FramePipeline
// ----------------------------------------------------------------------------

pub struct FramePipeline<S> {
    detector: DetectorWorker,
    settings: PipelineSettings,
    renderer: OverlayRenderer,
    surface: S,
    history: HistoryLog,
    current: Vec<Detection>,
}

impl<S: Surface> FramePipeline<S> {
    pub fn new(
        backend: Box<dyn DetectorBackend>,
        settings: PipelineSettings,
        surface: S,
    ) -> Result<Self> {
        let detector = DetectorWorker::spawn(backend)?;
        Ok(Self {
            detector,
            renderer: OverlayRenderer::new(settings.overlay_visible),
            history: HistoryLog::with_capacity(settings.history_capacity),
            settings,
            surface,
            current: Vec::new(),
        })
    }

    /// Run one cycle.
    ///
    /// Preconditions that are not met (inactive, detector still loading,
    /// source not ready, failed frame read, zero-sized frame) skip the cycle
    /// and return `state` unchanged. A detector error or timeout is returned
    /// as an error, as is a frame whose size differs from the resolution the
    /// thresholds are calibrated for.
    pub fn run_cycle(
        &mut self,
        source: &mut dyn VideoSource,
        state: PipelineState,
        active: &AtomicBool,
    ) -> Result<(CycleOutcome, PipelineState)> {
        if !active.load(Ordering::SeqCst) {
            return Ok((CycleOutcome::Skipped(SkipReason::Inactive), state));
        }
        if !self.detector.poll_loaded()? {
            return Ok((CycleOutcome::Skipped(SkipReason::DetectorLoading), state));
        }
        if !source.is_ready() {
            return Ok((CycleOutcome::Skipped(SkipReason::SourceNotReady), state));
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("frame read failed: {:#}", err);
                return Ok((CycleOutcome::Skipped(SkipReason::FrameUnavailable), state));
            }
        };
        let dims = frame.dimensions();
        if dims.is_empty() {
            return Ok((CycleOutcome::Skipped(SkipReason::EmptyFrame), state));
        }
        if dims != self.settings.resolution {
            bail!(
                "frame is {}x{} but activity thresholds are calibrated for {}x{}",
                dims.width,
                dims.height,
                self.settings.resolution.width,
                self.settings.resolution.height
            );
        }

        let raw = self.detector.detect(frame, self.settings.detect_timeout)?;
        if !active.load(Ordering::SeqCst) {
            return Ok((CycleOutcome::Discarded, state));
        }

        let mut detections = self.settings.allow_list.filter(raw);
        let next = annotate_activity(&mut detections, state, &self.settings.thresholds);

        self.renderer.render(&mut self.surface, &detections, dims);

        let history_entry = if detections.is_empty() {
            None
        } else {
            let entry = HistoryEntry::now(detections.clone());
            self.history.push(entry.clone());
            Some(entry)
        };
        self.current = detections.clone();

        let report = FrameReport {
            dimensions: dims,
            detections,
            history_entry,
        };
        Ok((CycleOutcome::Processed(report), next))
    }

    /// Detections drawn by the last processed cycle.
    pub fn current_detections(&self) -> &[Detection] {
        &self.current
    }

    /// Hit test against the last rendered detections.
    pub fn select_at(&self, x: f32, y: f32) -> Option<&Detection> {
        selection::hit_test(&self.current, x, y)
    }

    pub fn history(&self) -> HistoryView<'_> {
        self.history.view()
    }

    pub fn renderer(&self) -> &OverlayRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut OverlayRenderer {
        &mut self.renderer
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn detector(&mut self) -> &mut DetectorWorker {
        &mut self.detector
    }

    /// Clear the overlay, as when a session stops.
    pub fn clear_overlay(&mut self) {
        self.surface.clear();
        self.current.clear();
    }
}

// ----------------------------------------------------------------------------
// DetectionLoop: start/stop task around run_cycle
// ----------------------------------------------------------------------------

/// What a finished loop hands back.
pub struct LoopExit<S> {
    pub pipeline: FramePipeline<S>,
    pub state: PipelineState,
    /// Error that ended the loop, if it did not stop on request.
    pub error: Option<anyhow::Error>,
}

/// Handle to a running detection loop.
pub struct LoopHandle<S> {
    active: Arc<AtomicBool>,
    reports: Receiver<FrameReport>,
    join: Option<JoinHandle<LoopExit<S>>>,
}

impl<S> LoopHandle<S> {
    /// Reports of processed frames, in order.
    pub fn reports(&self) -> &Receiver<FrameReport> {
        &self.reports
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Clear the active flag and wait for the loop to exit.
    ///
    /// An in-flight detector call is not interrupted; its result is dropped.
    pub fn stop(mut self) -> Result<LoopExit<S>> {
        self.active.store(false, Ordering::SeqCst);
        self.join_inner()
    }

    /// Wait for the loop to end on its own (after an error).
    pub fn join(mut self) -> Result<LoopExit<S>> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<LoopExit<S>> {
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("detection loop already joined"))?;
        join.join()
            .map_err(|_| anyhow!("detection loop thread panicked"))
    }
}

impl<S> Drop for LoopHandle<S> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

pub struct DetectionLoop;

impl DetectionLoop {
    /// Start cycling `pipeline` over `source`, one cycle per `tick`.
    ///
    /// The source is connected when the loop starts and disconnected when it
    /// ends. Skipped cycles are retried on the next tick.
    pub fn spawn<S, V>(pipeline: FramePipeline<S>, source: V, tick: Duration) -> Result<LoopHandle<S>>
    where
        S: Surface + Send + 'static,
        V: VideoSource + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let (report_tx, report_rx) = mpsc::channel();
        let loop_active = active.clone();

        let join = std::thread::Builder::new()
            .name("detection-loop".to_string())
            .spawn(move || {
                let mut pipeline = pipeline;
                let mut source = source;
                let mut state = PipelineState::new();
                let error = drive(
                    &mut pipeline,
                    &mut source,
                    &mut state,
                    &loop_active,
                    &report_tx,
                    tick,
                )
                .err();
                source.disconnect();
                pipeline.clear_overlay();
                if let Some(err) = &error {
                    log::error!("detection loop stopped: {:#}", err);
                }
                LoopExit {
                    pipeline,
                    state,
                    error,
                }
            })?;

        Ok(LoopHandle {
            active,
            reports: report_rx,
            join: Some(join),
        })
    }
}

fn drive<S: Surface>(
    pipeline: &mut FramePipeline<S>,
    source: &mut dyn VideoSource,
    state: &mut PipelineState,
    active: &AtomicBool,
    reports: &Sender<FrameReport>,
    tick: Duration,
) -> Result<()> {
    source.connect()?;
    while active.load(Ordering::SeqCst) {
        let started = Instant::now();
        let (outcome, next) = pipeline.run_cycle(source, *state, active)?;
        *state = next;
        match outcome {
            CycleOutcome::Processed(report) => {
                log::debug!(
                    "frame processed: {} detections, history={}",
                    report.detections.len(),
                    pipeline.history().len()
                );
                // No consumer is fine.
                let _ = reports.send(report);
            }
            CycleOutcome::Skipped(reason) => log::trace!("cycle skipped: {:?}", reason),
            CycleOutcome::Discarded => log::debug!("detector result discarded after stop"),
        }
        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Activity;
    use crate::detect::{BoundingBox, ObjectClass, StubBackend};
    use crate::ingest::{CameraConfig, SyntheticSource};
    use crate::overlay::RecordingSurface;

    fn person(x: f32, y: f32, h: f32) -> Detection {
        Detection {
            class: ObjectClass::Person,
            score: 0.9,
            bbox: BoundingBox::new(x, y, 50.0, h),
            activity: None,
        }
    }

    fn raw(label: &str, x: f32, y: f32) -> RawDetection {
        RawDetection::new(label, 0.9, BoundingBox::new(x, y, 50.0, 100.0))
    }

    fn stub_source() -> SyntheticSource {
        SyntheticSource::new(CameraConfig {
            url: "stub://pipeline".to_string(),
            target_fps: 30,
            width: 64,
            height: 48,
        })
    }

    fn small_frame_settings() -> PipelineSettings {
        PipelineSettings {
            resolution: FrameDimensions::new(64, 48),
            ..PipelineSettings::default()
        }
    }

    fn pipeline(frames: Vec<Vec<RawDetection>>) -> FramePipeline<RecordingSurface> {
        let mut pipeline = FramePipeline::new(
            Box::new(StubBackend::scripted(frames)),
            small_frame_settings(),
            RecordingSurface::new(),
        )
        .unwrap();
        pipeline
            .detector()
            .wait_loaded(Duration::from_secs(5))
            .unwrap();
        pipeline
    }

    #[test]
    fn annotation_threads_previous_box_through_people() {
        let mut dets = vec![person(100.0, 50.0, 100.0), person(130.0, 50.0, 100.0)];
        let next = annotate_activity(
            &mut dets,
            PipelineState::new(),
            &ActivityThresholds::default(),
        );
        assert_eq!(dets[0].activity, Some(Activity::Standing));
        assert_eq!(dets[1].activity, Some(Activity::Walking));
        assert_eq!(next.previous().unwrap().bbox, dets[1].bbox);
    }

    #[test]
    fn annotation_leaves_objects_and_state_alone_without_people() {
        let mut dets = vec![Detection {
            class: ObjectClass::Cup,
            ..person(0.0, 0.0, 10.0)
        }];
        let state = PipelineState::with_previous(PreviousObservation::new(BoundingBox::new(
            1.0, 2.0, 3.0, 4.0,
        )));
        let next = annotate_activity(&mut dets, state, &ActivityThresholds::default());
        assert_eq!(dets[0].activity, None);
        assert_eq!(next, state);
    }

    #[test]
    fn cycle_skips_until_source_is_ready() -> Result<()> {
        let mut pipeline = pipeline(vec![vec![raw("person", 0.0, 0.0)]]);
        let mut source = stub_source();
        let active = AtomicBool::new(true);

        let (outcome, state) = pipeline.run_cycle(&mut source, PipelineState::new(), &active)?;
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::SourceNotReady));
        assert_eq!(state, PipelineState::new());

        source.connect()?;
        let (outcome, _) = pipeline.run_cycle(&mut source, state, &active)?;
        assert!(matches!(outcome, CycleOutcome::Processed(_)));
        Ok(())
    }

    #[test]
    fn inactive_cycle_is_skipped() -> Result<()> {
        let mut pipeline = pipeline(Vec::new());
        let mut source = stub_source();
        source.connect()?;
        let active = AtomicBool::new(false);
        let (outcome, _) = pipeline.run_cycle(&mut source, PipelineState::new(), &active)?;
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::Inactive));
        Ok(())
    }

    #[test]
    fn zero_sized_frames_are_skipped() -> Result<()> {
        let mut pipeline = pipeline(vec![vec![raw("person", 0.0, 0.0)]]);
        let mut source = SyntheticSource::new(CameraConfig {
            url: "stub://empty".to_string(),
            target_fps: 30,
            width: 0,
            height: 0,
        });
        source.connect()?;
        let active = AtomicBool::new(true);
        let (outcome, _) = pipeline.run_cycle(&mut source, PipelineState::new(), &active)?;
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::EmptyFrame));
        Ok(())
    }

    #[test]
    fn processed_cycle_filters_annotates_draws_and_records() -> Result<()> {
        let mut pipeline = pipeline(vec![
            vec![raw("person", 100.0, 50.0), raw("dog", 0.0, 0.0), raw("cup", 5.0, 5.0)],
            vec![raw("person", 140.0, 50.0)],
            vec![raw("dog", 0.0, 0.0)],
        ]);
        let mut source = stub_source();
        source.connect()?;
        let active = AtomicBool::new(true);

        let (outcome, state) = pipeline.run_cycle(&mut source, PipelineState::new(), &active)?;
        let CycleOutcome::Processed(report) = outcome else {
            panic!("expected a processed cycle");
        };
        assert_eq!(report.dimensions, FrameDimensions::new(64, 48));
        assert_eq!(report.detections.len(), 2);
        assert_eq!(report.detections[0].activity, Some(Activity::Standing));
        assert_eq!(report.detections[1].activity, None);
        assert!(report.history_entry.is_some());
        assert_eq!(pipeline.surface().commands().len(), 6);

        let (outcome, state) = pipeline.run_cycle(&mut source, state, &active)?;
        let CycleOutcome::Processed(report) = outcome else {
            panic!("expected a processed cycle");
        };
        assert_eq!(report.detections[0].activity, Some(Activity::Walking));

        // Only a dog: nothing kept, no history entry, overlay cleared.
        let (outcome, state) = pipeline.run_cycle(&mut source, state, &active)?;
        let CycleOutcome::Processed(report) = outcome else {
            panic!("expected a processed cycle");
        };
        assert!(report.detections.is_empty());
        assert!(report.history_entry.is_none());
        assert!(pipeline.surface().commands().is_empty());
        assert_eq!(state.previous().unwrap().bbox.x, 140.0);

        let history = pipeline.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().items[0].bbox.x, 140.0);
        Ok(())
    }

    #[test]
    fn selection_uses_last_rendered_detections() -> Result<()> {
        let mut pipeline = pipeline(vec![vec![raw("cup", 10.0, 10.0)]]);
        let mut source = stub_source();
        source.connect()?;
        let active = AtomicBool::new(true);
        pipeline.run_cycle(&mut source, PipelineState::new(), &active)?;

        assert_eq!(
            pipeline.select_at(20.0, 20.0).map(|d| d.class.clone()),
            Some(ObjectClass::Cup)
        );
        assert!(pipeline.select_at(500.0, 20.0).is_none());
        Ok(())
    }

    /// Ready source whose reads fail a set number of times before succeeding.
    struct FlakySource {
        failures_left: u32,
        inner: SyntheticSource,
    }

    impl VideoSource for FlakySource {
        fn connect(&mut self) -> Result<()> {
            self.inner.connect()
        }

        fn disconnect(&mut self) {
            self.inner.disconnect()
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn next_frame(&mut self) -> Result<Frame> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                bail!("transient capture error");
            }
            self.inner.next_frame()
        }

        fn stats(&self) -> crate::ingest::SourceStats {
            self.inner.stats()
        }
    }

    #[test]
    fn failed_frame_read_skips_and_keeps_state() -> Result<()> {
        let mut pipeline = pipeline(vec![vec![raw("person", 0.0, 0.0)]]);
        let mut source = FlakySource {
            failures_left: 1,
            inner: stub_source(),
        };
        source.connect()?;
        let active = AtomicBool::new(true);
        let state = PipelineState::with_previous(PreviousObservation::new(BoundingBox::new(
            5.0, 5.0, 10.0, 10.0,
        )));

        let (outcome, next) = pipeline.run_cycle(&mut source, state, &active)?;
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::FrameUnavailable));
        assert_eq!(next, state);
        assert!(pipeline.history().is_empty());

        let (outcome, _) = pipeline.run_cycle(&mut source, next, &active)?;
        assert!(matches!(outcome, CycleOutcome::Processed(_)));
        Ok(())
    }

    #[test]
    fn frame_size_other_than_calibration_is_an_error() -> Result<()> {
        let mut pipeline = FramePipeline::new(
            Box::new(StubBackend::scripted(vec![vec![raw("person", 100.0, 400.0)]])),
            PipelineSettings::default(),
            RecordingSurface::new(),
        )?;
        pipeline.detector().wait_loaded(Duration::from_secs(5))?;
        let mut source = SyntheticSource::new(CameraConfig {
            url: "stub://hd".to_string(),
            target_fps: 30,
            width: 1920,
            height: 1080,
        });
        source.connect()?;
        let active = AtomicBool::new(true);

        let err = pipeline
            .run_cycle(&mut source, PipelineState::new(), &active)
            .unwrap_err();
        assert!(err.to_string().contains("calibrated for 640x480"));
        assert!(pipeline.history().is_empty());
        assert!(pipeline.current_detections().is_empty());
        Ok(())
    }

    #[test]
    fn detector_failure_is_an_error() -> Result<()> {
        let mut pipeline = FramePipeline::new(
            Box::new(StubBackend::failing("boom")),
            small_frame_settings(),
            RecordingSurface::new(),
        )?;
        pipeline.detector().wait_loaded(Duration::from_secs(5))?;
        let mut source = stub_source();
        source.connect()?;
        let active = AtomicBool::new(true);
        let err = pipeline
            .run_cycle(&mut source, PipelineState::new(), &active)
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        Ok(())
    }

    #[test]
    fn slow_detector_times_out_and_stays_hung() -> Result<()> {
        let backend = StubBackend::scripted(vec![Vec::new()]).with_delay(Duration::from_millis(300));
        let mut worker = DetectorWorker::spawn(Box::new(backend))?;
        worker.wait_loaded(Duration::from_secs(5))?;

        let frame = Frame::new(vec![0; 3], 1, 1);
        let err = worker
            .detect(frame, Duration::from_millis(20))
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(worker.is_hung());

        let frame = Frame::new(vec![0; 3], 1, 1);
        assert!(worker.detect(frame, Duration::from_secs(1)).is_err());
        Ok(())
    }

    #[test]
    fn loop_runs_until_stopped_and_returns_pipeline() -> Result<()> {
        let pipeline = FramePipeline::new(
            Box::new(StubBackend::new()),
            PipelineSettings::default(),
            RecordingSurface::new(),
        )?;
        let source = SyntheticSource::new(CameraConfig::default());
        let handle = DetectionLoop::spawn(pipeline, source, Duration::from_millis(1))?;

        let first = handle.reports().recv_timeout(Duration::from_secs(5))?;
        assert_eq!(first.dimensions, FrameDimensions::new(640, 480));
        assert!(handle.is_running());

        let exit = handle.stop()?;
        assert!(exit.error.is_none());
        assert!(!exit.pipeline.history().is_empty());
        assert!(exit.pipeline.history().len() <= MAX_HISTORY_ENTRIES);
        assert!(exit.pipeline.current_detections().is_empty());
        Ok(())
    }

    #[test]
    fn loop_halts_on_detector_error() -> Result<()> {
        let pipeline = FramePipeline::new(
            Box::new(StubBackend::failing("model crashed")),
            PipelineSettings::default(),
            RecordingSurface::new(),
        )?;
        let handle = DetectionLoop::spawn(
            pipeline,
            SyntheticSource::new(CameraConfig::default()),
            Duration::from_millis(1),
        )?;
        let exit = handle.join()?;
        let err = exit.error.expect("loop should report the detector error");
        assert!(err.to_string().contains("model crashed"));
        assert!(exit.pipeline.history().is_empty());
        Ok(())
    }
}
