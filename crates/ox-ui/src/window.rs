//! Display surface
//!
//! The window owns the UI task loop. There is no real surface in
//! headless builds; dialogs are recorded so callers and tests can
//! observe what would have been presented.

use crate::event_loop::EventLoop;
use parking_lot::Mutex;
use std::sync::Arc;

/// A dialog presented to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBox {
    pub title: String,
    pub message: String,
}

/// The main display surface
pub struct Window {
    title: String,
    event_loop: EventLoop,
    dialogs: Mutex<Vec<MessageBox>>,
}

impl Window {
    pub fn new(title: &str) -> Arc<Self> {
        tracing::info!("Window created: {}", title);
        Arc::new(Self {
            title: title.to_string(),
            event_loop: EventLoop::new(),
            dialogs: Mutex::new(Vec::new()),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The UI task loop owned by this window
    pub fn loop_(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Present a blocking notification. Recorded for observation; the
    /// log line is the visible artifact in headless runs.
    pub fn show_message_box(&self, title: &str, message: &str) {
        tracing::warn!("{}: {}", title, message);
        self.dialogs.lock().push(MessageBox {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    /// Dialogs presented so far, oldest first
    pub fn shown_message_boxes(&self) -> Vec<MessageBox> {
        self.dialogs.lock().clone()
    }
}
