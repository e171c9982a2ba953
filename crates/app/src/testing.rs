//! Test doubles and synthetic images shared by the engine's unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{GrayImage, Luma};
use tapflow_domain::error::TapflowError;
use tapflow_domain::event::RunEvent;
use tapflow_domain::geometry::Point;

use crate::frame::Frame;
use crate::ports::{DeviceControl, RunEventSink};

pub(crate) const SCREEN_SIZE: u32 = 64;
const BACKGROUND_SEED: u32 = 0xBAC6;

/// Deterministic pseudo-random texture; distinct seeds barely correlate.
pub(crate) fn texture(seed: u32, width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let mut v = seed.wrapping_mul(0x9E37_79B1)
            ^ x.wrapping_mul(0x85EB_CA77)
            ^ y.wrapping_mul(0xC2B2_AE3D);
        v ^= v >> 15;
        v = v.wrapping_mul(0x2C1B_3C6D);
        v ^= v >> 12;
        v = v.wrapping_mul(0x297A_2D39);
        v ^= v >> 15;
        Luma([v.to_le_bytes()[0]])
    })
}

/// A textured screen with each `(template, x, y)` pasted at its top-left.
pub(crate) fn scene(items: &[(&GrayImage, u32, u32)]) -> GrayImage {
    let mut screen = texture(BACKGROUND_SEED, SCREEN_SIZE, SCREEN_SIZE);
    for (template, x, y) in items {
        image::imageops::replace(&mut screen, *template, i64::from(*x), i64::from(*y));
    }
    screen
}

/// A device that plays back queued screens and records every tap.
///
/// When the queue runs dry it keeps showing the fallback screen (or keeps
/// failing, if there is none).
pub(crate) struct ScriptedDevice {
    screens: Mutex<VecDeque<Option<GrayImage>>>,
    fallback: Option<GrayImage>,
    taps: Mutex<Vec<Point>>,
    captures: AtomicUsize,
}

impl ScriptedDevice {
    pub(crate) fn showing(fallback: GrayImage) -> Self {
        Self::with_fallback(Some(fallback))
    }

    pub(crate) fn broken() -> Self {
        Self::with_fallback(None)
    }

    fn with_fallback(fallback: Option<GrayImage>) -> Self {
        Self {
            screens: Mutex::new(VecDeque::new()),
            fallback,
            taps: Mutex::new(Vec::new()),
            captures: AtomicUsize::new(0),
        }
    }

    pub(crate) fn then(self, screen: GrayImage) -> Self {
        self.screens.lock().unwrap().push_back(Some(screen));
        self
    }

    pub(crate) fn then_fail(self) -> Self {
        self.screens.lock().unwrap().push_back(None);
        self
    }

    pub(crate) fn taps(&self) -> Vec<Point> {
        self.taps.lock().unwrap().clone()
    }

    pub(crate) fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl DeviceControl for ScriptedDevice {
    fn capture_screen(&self) -> impl Future<Output = Result<Frame, TapflowError>> + Send {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let next = self
            .screens
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        async move {
            next.map(Frame::new)
                .ok_or_else(|| TapflowError::Device("scripted capture failure".into()))
        }
    }

    fn tap(&self, point: Point) -> impl Future<Output = Result<(), TapflowError>> + Send {
        self.taps.lock().unwrap().push(point);
        async { Ok(()) }
    }
}

/// Records every published event.
#[derive(Default)]
pub(crate) struct SpySink {
    events: Mutex<Vec<RunEvent>>,
}

impl SpySink {
    pub(crate) fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl RunEventSink for SpySink {
    fn publish(&self, event: RunEvent) -> impl Future<Output = ()> + Send {
        self.events.lock().unwrap().push(event);
        async {}
    }
}

/// Center of a template pasted at `(x, y)`.
pub(crate) fn center_of(template: &GrayImage, x: u32, y: u32) -> Point {
    let (w, h) = template.dimensions();
    Point::new(
        i32::try_from(x + w / 2).unwrap(),
        i32::try_from(y + h / 2).unwrap(),
    )
}
