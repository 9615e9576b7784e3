use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::validate_raster;
use crate::error::EditorError;

/// Euclidean RGB distance under which a pixel counts as background.
pub const SEGMENT_THRESHOLD: f32 = 50.0;

/// Background removal against the mean of the four corner pixels.
///
/// 1. **Sample** the corners and average their RGB.
/// 2. **Key out** every pixel whose RGB distance to that mean is below
///    [`SEGMENT_THRESHOLD`] by setting its alpha to 0.
///
/// No flood fill and no feathering: interior pixels that happen to match the
/// corner color are cleared as well. Everything else, alpha included, is left
/// byte-identical.
pub fn segment(pixels: &RgbaImage) -> Result<RgbaImage, EditorError> {
    validate_raster(pixels, "photo")?;
    let w = pixels.width();
    let h = pixels.height();

    let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
    let mut avg = [0.0f32; 3];
    for &(x, y) in &corners {
        let p = pixels.get_pixel(x, y);
        for c in 0..3 {
            avg[c] += p[c] as f32;
        }
    }
    for v in &mut avg {
        *v /= corners.len() as f32;
    }

    let threshold_sq = SEGMENT_THRESHOLD * SEGMENT_THRESHOLD;
    let mut out = pixels.clone();
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_mut(4).for_each(|px| {
        if color_dist_sq(px, &avg) < threshold_sq {
            px[3] = 0;
        }
    });
    Ok(out)
}

/// Number of pixels `segment` made transparent.
pub fn cleared_pixel_count(original: &RgbaImage, cutout: &RgbaImage) -> usize {
    original
        .pixels()
        .zip(cutout.pixels())
        .filter(|(a, b)| a[3] != 0 && b[3] == 0)
        .count()
}

/// Squared Euclidean distance in RGB space.
#[inline]
fn color_dist_sq(px: &[u8], avg: &[f32; 3]) -> f32 {
    let dr = px[0] as f32 - avg[0];
    let dg = px[1] as f32 - avg[1];
    let db = px[2] as f32 - avg[2];
    dr * dr + dg * dg + db * db
}

// ============================================================================
// BACKGROUND JOB
// ============================================================================

/// User-facing progress of a segmentation run. Purely informational.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Analyzing,
    RemovingBackground,
    Complete,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Analyzing => "Analyzing image...",
            Phase::RemovingBackground => "Removing background...",
            Phase::Complete => "Complete!",
        }
    }
}

enum JobMessage {
    Phase(Phase),
    Done(Result<RgbaImage, EditorError>),
}

/// A segmentation running on the rayon pool.
///
/// Phases and the result are delivered on the thread that polls the job, so
/// the optional phase callback never runs concurrently with the caller.
pub struct SegmentJob {
    receiver: Receiver<JobMessage>,
    on_phase: Option<Box<dyn FnMut(Phase)>>,
    last_phase: Option<Phase>,
}

impl SegmentJob {
    pub fn spawn(photo: Arc<RgbaImage>, on_phase: Option<Box<dyn FnMut(Phase)>>) -> Self {
        let (sender, receiver) = mpsc::channel();
        rayon::spawn(move || {
            let _ = sender.send(JobMessage::Phase(Phase::Analyzing));
            let _ = sender.send(JobMessage::Phase(Phase::RemovingBackground));
            let result = segment(&photo);
            if let Ok(cutout) = &result {
                log_info!(
                    "Segmentation cleared {} of {} pixels",
                    cleared_pixel_count(&photo, cutout),
                    photo.width() as u64 * photo.height() as u64
                );
                let _ = sender.send(JobMessage::Phase(Phase::Complete));
            }
            let _ = sender.send(JobMessage::Done(result));
        });
        Self {
            receiver,
            on_phase,
            last_phase: None,
        }
    }

    pub fn last_phase(&self) -> Option<Phase> {
        self.last_phase
    }

    /// Drain pending messages. `Some` once the job has finished.
    pub fn poll(&mut self) -> Option<Result<RgbaImage, EditorError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => {
                    if let Some(done) = self.handle(msg) {
                        return Some(done);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    return Some(Err(EditorError::InvalidImage(
                        "segmentation worker exited without a result".into(),
                    )));
                }
            }
        }
    }

    /// Block until the job finishes.
    pub fn wait(mut self) -> Result<RgbaImage, EditorError> {
        loop {
            match self.receiver.recv() {
                Ok(msg) => {
                    if let Some(done) = self.handle(msg) {
                        return done;
                    }
                }
                Err(_) => {
                    return Err(EditorError::InvalidImage(
                        "segmentation worker exited without a result".into(),
                    ));
                }
            }
        }
    }

    fn handle(&mut self, msg: JobMessage) -> Option<Result<RgbaImage, EditorError>> {
        match msg {
            JobMessage::Phase(phase) => {
                log_info!("Segmentation: {}", phase.label());
                self.last_phase = Some(phase);
                if let Some(cb) = self.on_phase.as_mut() {
                    cb(phase);
                }
                None
            }
            JobMessage::Done(result) => Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn photo() -> RgbaImage {
        // Uniform background (10, 200, 30) with a 2x2 subject in the middle.
        let mut img = RgbaImage::from_pixel(6, 6, Rgba([10, 200, 30, 255]));
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            img.put_pixel(x, y, Rgba([240, 20, 20, 255]));
        }
        img
    }

    #[test]
    fn background_goes_transparent_and_subject_stays() {
        let src = photo();
        let out = segment(&src).unwrap();
        assert_eq!(out.dimensions(), src.dimensions());
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(5, 4)[3], 0);
        assert_eq!(*out.get_pixel(2, 2), *src.get_pixel(2, 2));
        assert_eq!(cleared_pixel_count(&src, &out), 32);
    }

    #[test]
    fn only_alpha_changes_for_background_pixels() {
        let src = photo();
        let out = segment(&src).unwrap();
        for (a, b) in src.pixels().zip(out.pixels()) {
            assert_eq!(&a.0[..3], &b.0[..3]);
        }
    }

    #[test]
    fn threshold_boundary() {
        let mut img = RgbaImage::from_pixel(5, 1, Rgba([100, 100, 100, 255]));
        // distance 49 → cleared, 50 → kept, 30-40-0 (=50) → kept
        img.put_pixel(1, 0, Rgba([149, 100, 100, 255]));
        img.put_pixel(2, 0, Rgba([150, 100, 100, 200]));
        img.put_pixel(3, 0, Rgba([130, 140, 100, 255]));
        let out = segment(&img).unwrap();
        assert_eq!(out.get_pixel(1, 0)[3], 0);
        assert_eq!(*out.get_pixel(2, 0), Rgba([150, 100, 100, 200]));
        assert_eq!(*out.get_pixel(3, 0), Rgba([130, 140, 100, 255]));
    }

    #[test]
    fn interior_pixels_matching_corners_are_cleared_too() {
        let mut img = photo();
        img.put_pixel(3, 3, Rgba([12, 198, 31, 255]));
        let out = segment(&img).unwrap();
        assert_eq!(out.get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn corners_are_averaged() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([200, 0, 0, 255]));
        img.put_pixel(2, 2, Rgba([200, 0, 0, 255]));
        // mean corner = (100, 0, 0); centre pixel (100, 0, 0) is cleared,
        // the pure black corners sit exactly 100 away and stay.
        img.put_pixel(1, 1, Rgba([100, 0, 0, 255]));
        let out = segment(&img).unwrap();
        assert_eq!(out.get_pixel(1, 1)[3], 0);
        assert_eq!(out.get_pixel(2, 0)[3], 255);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let src = photo();
        assert_eq!(segment(&src).unwrap().into_raw(), segment(&src).unwrap().into_raw());
    }

    #[test]
    fn single_pixel_and_empty_inputs() {
        let one = RgbaImage::from_pixel(1, 1, Rgba([5, 5, 5, 255]));
        assert_eq!(segment(&one).unwrap().get_pixel(0, 0)[3], 0);
        assert!(matches!(
            segment(&RgbaImage::new(0, 0)),
            Err(EditorError::InvalidImage(_))
        ));
    }

    #[test]
    fn job_reports_phases_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let job = SegmentJob::spawn(
            Arc::new(photo()),
            Some(Box::new(move |p| sink.borrow_mut().push(p))),
        );
        let out = job.wait().unwrap();
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(
            *seen.borrow(),
            vec![Phase::Analyzing, Phase::RemovingBackground, Phase::Complete]
        );
    }

    #[test]
    fn job_surfaces_invalid_image() {
        let job = SegmentJob::spawn(Arc::new(RgbaImage::new(0, 3)), None);
        assert!(matches!(job.wait(), Err(EditorError::InvalidImage(_))));
    }
}
