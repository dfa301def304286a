//! Null input driver

use crate::InputDriver;
use ox_core::error::SetupError;

/// Driver that reports no devices and no input
#[derive(Default)]
pub struct NullInputDriver;

impl NullInputDriver {
    pub fn new() -> Self {
        Self
    }
}

impl InputDriver for NullInputDriver {
    fn name(&self) -> &str {
        "null"
    }

    fn setup(&mut self) -> Result<(), SetupError> {
        Ok(())
    }
}
