//! `chroma-perception` – turns camera frames into pickable candidates.
//!
//! # Modules
//!
//! - [`segmenter`] – [`Segmenter`][segmenter::Segmenter]: the seam to the
//!   color-segmentation collaborator, plus a scripted implementation for
//!   tests.
//! - [`hsv`] – [`ColorThresholdSegmenter`][hsv::ColorThresholdSegmenter]:
//!   reference HSV band segmenter with connected-region labelling.
//! - [`detection`] – [`DetectionAdapter`][detection::DetectionAdapter]:
//!   normalises blobs into [`Detection`][chroma_types::Detection]s ranked by
//!   area.
//! - [`projection`] – [`PixelProjector`][projection::PixelProjector]: pixel
//!   error and pixel → world projection for the eye-in-hand camera.
//! - [`drop_zone`] – [`DropZoneFilter`][drop_zone::DropZoneFilter]: discards
//!   objects already resting in a drop zone.
//! - [`pipeline`] – [`CandidatePipeline`][pipeline::CandidatePipeline]:
//!   detection followed by drop-zone filtering.

pub mod detection;
pub mod drop_zone;
pub mod hsv;
pub mod pipeline;
pub mod projection;
pub mod segmenter;

pub use detection::DetectionAdapter;
pub use drop_zone::DropZoneFilter;
pub use hsv::ColorThresholdSegmenter;
pub use pipeline::CandidatePipeline;
pub use projection::PixelProjector;
pub use segmenter::{Blob, ScriptedSegmenter, Segmenter};
