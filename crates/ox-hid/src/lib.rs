//! Input system and drivers
//!
//! The input system aggregates one or more drivers (real controller
//! backends, keyboard emulation, or the null driver) and brings them
//! up together during machine setup.

pub mod null;

pub use null::NullInputDriver;

use ox_core::error::SetupError;
use ox_ui::Window;
use std::sync::Arc;

/// One source of controller input
pub trait InputDriver: Send {
    /// Driver name for diagnostics
    fn name(&self) -> &str;

    /// Open the underlying device(s).
    fn setup(&mut self) -> Result<(), SetupError>;
}

/// Aggregates the input drivers attached to a window
pub struct InputSystem {
    window: Arc<Window>,
    drivers: Vec<Box<dyn InputDriver>>,
}

impl InputSystem {
    pub fn new(window: &Arc<Window>) -> Self {
        Self {
            window: Arc::clone(window),
            drivers: Vec::new(),
        }
    }

    pub fn add_driver(&mut self, driver: Box<dyn InputDriver>) {
        tracing::debug!("Input driver {} attached", driver.name());
        self.drivers.push(driver);
    }

    /// Bring up every attached driver. The first failure aborts setup
    /// and is returned as-is; later drivers stay untouched.
    pub fn setup(&mut self) -> Result<(), SetupError> {
        for driver in &mut self.drivers {
            driver.setup()?;
        }
        tracing::info!("Input system ready with {} driver(s)", self.drivers.len());
        Ok(())
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }
}
