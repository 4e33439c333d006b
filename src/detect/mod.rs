mod adapter;
mod backend;
mod backends;
mod postprocess;
mod registry;
mod result;

pub use adapter::DetectorAdapter;
pub use backend::{parse_device, DetectionParams, DetectorBackend, Device};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use postprocess::{clamp_unit, iou, non_max_suppression};
pub use registry::{BackendRegistry, BackendSpec};
pub use result::{BoxDetection, Detection, Timing, PERSON_CLASS_ID};
