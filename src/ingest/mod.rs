//! Input sources for a detection run.
//!
//! The ingestion layer is responsible for:
//! - Discovering input images under a local directory
//! - Producing a stable, sorted workload (the manifest)
//!
//! Decoding happens later, one image at a time, inside the detector adapter.

pub mod images;

pub use images::{enumerate_images, is_image_file, ImageRef, IMAGE_EXTENSIONS};
