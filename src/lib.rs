//! AR object detection pipeline
//!
//! Runs an object detector over camera frames, keeps a small allow-list of
//! everyday classes, estimates what each detected person is doing and draws
//! an AR-style overlay, while keeping a short rolling history of detections.
//!
//! # Module Structure
//!
//! - `frame`: captured frames and the borrowed view detectors receive
//! - `ingest`: camera sources (synthetic `stub://`, V4L2 devices)
//! - `detect`: detector backends, raw and filtered detection types
//! - `filter`: class allow-list
//! - `activity`: person activity heuristics
//! - `pipeline`: per-frame cycle, detector worker and the detection loop
//! - `overlay`: AR overlay drawing against a `Surface`
//! - `history`: bounded most-recent-first detection history
//! - `selection`: point selection and object info
//! - `preview`: procedural 3D preview data per class
//! - `api`: HTTP detection log sink and upload client
//! - `config`: file and environment configuration

pub mod activity;
pub mod api;
pub mod config;
pub mod detect;
pub mod filter;
pub mod frame;
pub mod history;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod preview;
pub mod selection;

pub use activity::{Activity, ActivityThresholds, PreviousObservation};
pub use api::{upload_history, LogReceipt, LogServer, LogServerConfig, LogServerHandle};
pub use config::AppConfig;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectorBackend, ObjectClass, RawDetection,
    StubBackend,
};
pub use filter::AllowList;
pub use frame::{Frame, FrameDimensions, FrameView};
pub use history::{HistoryEntry, HistoryLog, HistoryView, MAX_HISTORY_ENTRIES};
pub use ingest::{CameraConfig, CameraSource, SyntheticSource, VideoSource};
pub use overlay::{OverlayRenderer, RecordingSurface, Surface};
pub use pipeline::{
    CycleOutcome, DetectionLoop, FramePipeline, FrameReport, LoopExit, LoopHandle,
    PipelineSettings, PipelineState, SkipReason,
};
pub use selection::{hit_test, ObjectInfo};
