//! Screen capture: the X11 backend, frame data shapes, and the paced pump
//! thread that drives them (spec.md §4.5, §6 `Capture` interface).

mod frame;
mod pump;
mod x11;

pub use frame::{Frame, FrameStats};
pub use pump::{CaptureJob, CaptureParams, FrameCallback};
pub use x11::{ScreenCapturer, X11Capturer};
