//! [`Segmenter`] – the seam to the color-segmentation collaborator.
//!
//! A segmenter turns a frame plus a color name into raw pixel blobs. It owns
//! whatever the color name means (HSV bands, a trained model, ...); the
//! control core never looks inside.
//!
//! [`ScriptedSegmenter`] ignores the frame entirely and replays canned blob
//! lists, which is how the servo, search and sort loops are tested without
//! rendering anything.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chroma_hal::CameraFrame;
use chroma_types::RobotError;

/// One connected region of matching pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Centroid column.
    pub x: f64,
    /// Centroid row.
    pub y: f64,
    /// Pixel count.
    pub area: u32,
}

impl Blob {
    pub fn new(x: f64, y: f64, area: u32) -> Self {
        Self { x, y, area }
    }
}

/// Color segmentation of a single frame.
pub trait Segmenter: Send {
    /// Return every blob of `color` in `frame`, in any order. An empty list
    /// is a normal result.
    ///
    /// # Errors
    ///
    /// [`RobotError::UnknownColor`] when the segmenter has no definition for
    /// `color`, or [`RobotError::Segmentation`] on internal failure.
    fn segment(&mut self, frame: &CameraFrame, color: &str) -> Result<Vec<Blob>, RobotError>;
}

impl<T: Segmenter + ?Sized> Segmenter for Box<T> {
    fn segment(&mut self, frame: &CameraFrame, color: &str) -> Result<Vec<Blob>, RobotError> {
        (**self).segment(frame, color)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ScriptedSegmenter
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Vec<Blob>>>,
    repeating: HashMap<String, Vec<Blob>>,
    calls: HashMap<String, usize>,
}

/// Replays scripted blob lists per color, one list per call.
///
/// Queued lists are consumed first; once a color's queue is empty its
/// repeating list (if any) is returned forever, otherwise nothing. Clones
/// share the same script.
///
/// ```
/// use chroma_hal::CameraFrame;
/// use chroma_perception::segmenter::{Blob, ScriptedSegmenter, Segmenter};
///
/// let script = ScriptedSegmenter::new();
/// script.push("red", vec![Blob::new(320.0, 360.0, 500)]);
///
/// let mut seg = script.clone();
/// let frame = CameraFrame::filled(1, 1, [0, 0, 0]);
/// assert_eq!(seg.segment(&frame, "red").unwrap().len(), 1);
/// assert!(seg.segment(&frame, "red").unwrap().is_empty());
/// assert_eq!(script.calls("red"), 2);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedSegmenter {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the result of one future call for `color`.
    pub fn push(&self, color: &str, blobs: Vec<Blob>) {
        self.lock()
            .queued
            .entry(color.to_string())
            .or_default()
            .push_back(blobs);
    }

    /// Queue `n` empty results for `color`.
    pub fn push_misses(&self, color: &str, n: usize) {
        for _ in 0..n {
            self.push(color, Vec::new());
        }
    }

    /// Result returned for `color` once its queue is drained.
    pub fn repeat(&self, color: &str, blobs: Vec<Blob>) {
        self.lock().repeating.insert(color.to_string(), blobs);
    }

    /// Number of `segment` calls made for `color`.
    pub fn calls(&self, color: &str) -> usize {
        self.lock().calls.get(color).copied().unwrap_or(0)
    }

    /// Total `segment` calls across all colors.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }
}

impl Segmenter for ScriptedSegmenter {
    fn segment(&mut self, _frame: &CameraFrame, color: &str) -> Result<Vec<Blob>, RobotError> {
        let mut script = self.lock();
        *script.calls.entry(color.to_string()).or_default() += 1;
        if let Some(next) = script.queued.get_mut(color).and_then(VecDeque::pop_front) {
            return Ok(next);
        }
        Ok(script.repeating.get(color).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> CameraFrame {
        CameraFrame::filled(2, 2, [0, 0, 0])
    }

    #[test]
    fn queue_then_repeat() {
        let mut s = ScriptedSegmenter::new();
        s.push("blue", vec![Blob::new(1.0, 1.0, 10)]);
        s.repeat("blue", vec![Blob::new(2.0, 2.0, 20), Blob::new(3.0, 3.0, 30)]);

        assert_eq!(s.segment(&frame(), "blue").unwrap().len(), 1);
        assert_eq!(s.segment(&frame(), "blue").unwrap().len(), 2);
        assert_eq!(s.segment(&frame(), "blue").unwrap().len(), 2);
        assert!(s.segment(&frame(), "green").unwrap().is_empty());
        assert_eq!(s.calls("blue"), 3);
        assert_eq!(s.total_calls(), 4);
    }

    #[test]
    fn colors_are_independent() {
        let mut s = ScriptedSegmenter::new();
        s.push("red", vec![Blob::new(1.0, 1.0, 10)]);
        s.push_misses("green", 2);
        assert!(s.segment(&frame(), "green").unwrap().is_empty());
        assert_eq!(s.segment(&frame(), "red").unwrap().len(), 1);
    }
}
