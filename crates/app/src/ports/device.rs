//! Device port: the two primitives the engine needs from an emulator.

use std::future::Future;

use tapflow_domain::error::TapflowError;
use tapflow_domain::geometry::Point;

use crate::frame::Frame;

/// Screen capture and input injection on one device.
///
/// The engine only trusts a capture that returns `Ok`; a failed tap is
/// logged and otherwise ignored.
pub trait DeviceControl: Send + Sync {
    /// Capture the current screen.
    fn capture_screen(&self) -> impl Future<Output = Result<Frame, TapflowError>> + Send;

    /// Tap the screen at `point`.
    fn tap(&self, point: Point) -> impl Future<Output = Result<(), TapflowError>> + Send;
}

impl<T: DeviceControl> DeviceControl for std::sync::Arc<T> {
    fn capture_screen(&self) -> impl Future<Output = Result<Frame, TapflowError>> + Send {
        (**self).capture_screen()
    }

    fn tap(&self, point: Point) -> impl Future<Output = Result<(), TapflowError>> + Send {
        (**self).tap(point)
    }
}
