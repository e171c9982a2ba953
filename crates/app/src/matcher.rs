//! Template matcher: locates a cached template inside a frame.
//!
//! Scores are zero-mean normalized cross-correlation (ZNCC), the measure
//! OpenCV calls `TM_CCOEFF_NORMED`:
//!
//! ```text
//!            Σ (I(x+i, y+j) − Ī) · (T(i, j) − T̄)
//! R(x, y) = ───────────────────────────────────────
//!           √( Σ (I − Ī)² · Σ (T − T̄)² )
//! ```
//!
//! Window sums come from integral images and the numerator for every
//! placement at once comes from one FFT cross-correlation, so a search
//! costs `O(frame · log frame)` whatever the template size. The frame's
//! spectrum is computed once and shared by every template searched in it.
//! Single scale, grayscale only.

use std::path::Path;
use std::sync::Arc;

use image::GrayImage;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tapflow_domain::geometry::Point;
use tapflow_domain::scenario::TemplateProbe;

use crate::frame::Frame;
use crate::template_store::TemplateStore;

/// Scores this close to 1.0 are reported as exactly 1.0.
const PERFECT_SCORE_TOLERANCE: f64 = 1e-9;

/// Placements whose scores differ by less than this count as tied.
const TIE_TOLERANCE: f64 = 1e-9;

/// Highest-scoring placement of a template in a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    /// Top-left corner of the template placement, in frame pixels.
    pub top_left: Point,
    /// Center of the placement: `top_left + (w / 2, h / 2)`.
    pub center: Point,
    /// ZNCC score in `[-1, 1]`.
    pub score: f64,
}

/// Finds templates from a shared [`TemplateStore`] in captured frames.
#[derive(Debug, Clone)]
pub struct Matcher {
    templates: Arc<TemplateStore>,
}

impl Matcher {
    #[must_use]
    pub fn new(templates: Arc<TemplateStore>) -> Self {
        Self { templates }
    }

    #[must_use]
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Center of the best placement of `probe.path`, if it reaches
    /// `probe.threshold` (inclusive).
    ///
    /// Templates missing from the store never match.
    #[must_use]
    pub fn find(&self, frame: &Frame, probe: TemplateProbe<'_>) -> Option<Point> {
        let best = self.score(frame, probe.path)?;
        let found = best.score >= probe.threshold;
        tracing::debug!(
            template = %probe.path.display(),
            score = best.score,
            threshold = probe.threshold,
            found,
            "template match"
        );
        found.then_some(best.center)
    }

    /// Best placement of the template at `path`, whatever its score.
    #[must_use]
    pub fn score(&self, frame: &Frame, path: &Path) -> Option<BestMatch> {
        let template = self.templates.get(path)?;
        if !fits(frame.image(), template) {
            return None;
        }
        search(frame.prepared(), template)
    }
}

/// Exhaustive ZNCC search of `template` over `frame`.
///
/// Returns `None` for an empty template or one larger than the frame.
/// Ties resolve to the first placement in row-major order. A flat
/// template scores 1.0 everywhere; a flat frame window scores 0.
#[must_use]
pub fn best_match(frame: &GrayImage, template: &GrayImage) -> Option<BestMatch> {
    if !fits(frame, template) {
        return None;
    }
    search(&PreparedFrame::new(frame), template)
}

fn fits(frame: &GrayImage, template: &GrayImage) -> bool {
    let (fw, fh) = dims(frame);
    let (tw, th) = dims(template);
    tw > 0 && th > 0 && tw <= fw && th <= fh
}

/// Score every placement of a template that [`fits`] the prepared frame.
fn search(frame: &PreparedFrame, template: &GrayImage) -> Option<BestMatch> {
    let (fw, fh) = (frame.width, frame.height);
    let (tw, th) = dims(template);

    #[allow(clippy::cast_precision_loss)]
    let n = (tw * th) as f64;
    let t_mean = template.as_raw().iter().map(|&p| f64::from(p)).sum::<f64>() / n;
    let centered: Vec<f64> = template
        .as_raw()
        .iter()
        .map(|&p| f64::from(p) - t_mean)
        .collect();
    let t_energy: f64 = centered.iter().map(|v| v * v).sum();
    if t_energy < f64::EPSILON {
        return Some(placement(0, 0, tw, th, 1.0));
    }

    let mut padded = vec![Complex::new(0.0, 0.0); fw * fh];
    for (j, row) in centered.chunks_exact(tw).enumerate() {
        for (i, &v) in row.iter().enumerate() {
            padded[j * fw + i] = Complex::new(v, 0.0);
        }
    }
    let t_spectrum = frame.fft.forward(padded);
    let product = frame
        .spectrum
        .iter()
        .zip(&t_spectrum)
        .map(|(f, t)| *f * t.conj())
        .collect();
    let numerators = frame.fft.inverse(product);

    let mut best: Option<(usize, usize, f64)> = None;
    for y in 0..=fh - th {
        for x in 0..=fw - tw {
            let w_energy = frame.integral.energy(x, y, tw, th);
            let score = if w_energy > 0.0 {
                snap(numerators[y * fw + x] / (w_energy * t_energy).sqrt())
            } else {
                0.0
            };
            if best.is_none_or(|(_, _, s)| score > s + TIE_TOLERANCE) {
                best = Some((x, y, score));
            }
        }
    }

    best.map(|(x, y, score)| placement(x, y, tw, th, score))
}

fn placement(x: usize, y: usize, tw: usize, th: usize, score: f64) -> BestMatch {
    BestMatch {
        top_left: Point::new(to_coord(x), to_coord(y)),
        center: Point::new(to_coord(x + tw / 2), to_coord(y + th / 2)),
        score,
    }
}

/// Frame-side search data, shared by every template looked up in one frame.
pub(crate) struct PreparedFrame {
    width: usize,
    height: usize,
    integral: IntegralImage,
    fft: Fft2d,
    /// Spectrum of the frame with its global mean removed.
    spectrum: Vec<Complex<f64>>,
}

impl PreparedFrame {
    /// `frame` must be at least one pixel in each dimension.
    pub(crate) fn new(frame: &GrayImage) -> Self {
        let (width, height) = dims(frame);
        let pixels = frame.as_raw();
        #[allow(clippy::cast_precision_loss)]
        let mean = pixels.iter().map(|&p| f64::from(p)).sum::<f64>() / pixels.len() as f64;
        let fft = Fft2d::new(width, height);
        let spectrum = fft.forward(
            pixels
                .iter()
                .map(|&p| Complex::new(f64::from(p) - mean, 0.0))
                .collect(),
        );
        Self {
            width,
            height,
            integral: IntegralImage::new(frame),
            fft,
            spectrum,
        }
    }
}

/// Separable 2D FFT over a row-major `width × height` buffer.
struct Fft2d {
    width: usize,
    height: usize,
    rows: Arc<dyn Fft<f64>>,
    columns: Arc<dyn Fft<f64>>,
    rows_inverse: Arc<dyn Fft<f64>>,
    columns_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            rows: planner.plan_fft_forward(width),
            columns: planner.plan_fft_forward(height),
            rows_inverse: planner.plan_fft_inverse(width),
            columns_inverse: planner.plan_fft_inverse(height),
        }
    }

    /// Forward transform; the spectrum comes back column-major.
    fn forward(&self, mut buffer: Vec<Complex<f64>>) -> Vec<Complex<f64>> {
        self.rows.process(&mut buffer);
        let mut columns = transpose(&buffer, self.width, self.height);
        self.columns.process(&mut columns);
        columns
    }

    /// Inverse of [`forward`](Self::forward), normalized, real part only.
    fn inverse(&self, mut columns: Vec<Complex<f64>>) -> Vec<f64> {
        self.columns_inverse.process(&mut columns);
        let mut buffer = transpose(&columns, self.height, self.width);
        self.rows_inverse.process(&mut buffer);
        #[allow(clippy::cast_precision_loss)]
        let scale = (self.width * self.height) as f64;
        buffer.into_iter().map(|c| c.re / scale).collect()
    }
}

/// Transpose a row-major `cols × rows` buffer.
fn transpose(src: &[Complex<f64>], cols: usize, rows: usize) -> Vec<Complex<f64>> {
    let mut dst = vec![Complex::new(0.0, 0.0); src.len()];
    for (r, row) in src.chunks_exact(cols).enumerate() {
        for (c, &v) in row.iter().enumerate() {
            dst[c * rows + r] = v;
        }
    }
    dst
}

fn snap(score: f64) -> f64 {
    if (1.0 - score).abs() < PERFECT_SCORE_TOLERANCE {
        1.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}

fn dims(image: &GrayImage) -> (usize, usize) {
    let (w, h) = image.dimensions();
    (w as usize, h as usize)
}

fn to_coord(v: usize) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Summed-area tables of pixel values and squared pixel values.
struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = dims(image);
        let stride = w + 1;
        let mut sum = vec![0_u64; stride * (h + 1)];
        let mut sum_sq = vec![0_u64; stride * (h + 1)];
        let pixels = image.as_raw();
        for y in 0..h {
            let mut row = 0_u64;
            let mut row_sq = 0_u64;
            for x in 0..w {
                let p = u64::from(pixels[y * w + x]);
                row += p;
                row_sq += p * p;
                let at = (y + 1) * stride + x + 1;
                sum[at] = sum[at - stride] + row;
                sum_sq[at] = sum_sq[at - stride] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    /// `Σ (I − Ī)²` over the `w × h` window at `(x, y)`.
    ///
    /// Computed in integers, so a flat window is exactly zero.
    #[allow(clippy::cast_precision_loss)]
    fn energy(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let rect = |table: &[u64]| {
            let a = table[y * self.stride + x];
            let b = table[y * self.stride + x + w];
            let c = table[(y + h) * self.stride + x];
            let d = table[(y + h) * self.stride + x + w];
            u128::from((d + a) - (b + c))
        };
        let (sum, sum_sq) = (rect(&self.sum), rect(&self.sum_sq));
        let n = (w * h) as u128;
        (n * sum_sq - sum * sum) as f64 / n as f64
    }
}
