//! Wire protocol shared by the control and input channels.
//!
//! Framing (`envelope`) is factored out from the message shapes
//! (`control`, `input`, `video`): one reader decodes length/line framing
//! once, then hands a string to `serde_json` for a tagged-enum decode —
//! dynamic dispatch by message `type` becomes a tagged sum decoded once
//! at the framing boundary, not a string-keyed lookup per handler.

pub mod control;
pub mod envelope;
pub mod input;
pub mod video;

pub use control::{ControlPush, ControlRequest, ControlResponse};
pub use envelope::{read_envelope, write_envelope};
pub use input::InputEvent;
pub use video::{read_frame, write_frame};
