//! Guest processor emulation for oxidized-xenon.
//!
//! The processor owns the translation backend and its executable code
//! cache, plus the export resolver that binds guest imports to host
//! kernel routines.

pub mod backend;
pub mod export_resolver;
pub mod processor;

pub use backend::{Backend, CodeCache};
pub use export_resolver::{Export, ExportKind, ExportResolver};
pub use processor::Processor;
