//! Display surface and UI task loop
//!
//! Exactly one loop thread owns all display interaction. Everything
//! display-related crosses onto that thread as a posted task.

pub mod event_loop;
pub mod window;

pub use event_loop::EventLoop;
pub use window::{MessageBox, Window};
