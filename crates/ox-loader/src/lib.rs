//! Guest executable loading for oxidized-xenon.
//!
//! Parses the XEX2 container wrapping every Xbox 360 executable and
//! recovers the plaintext basefile for the kernel to map.

pub mod xex;

pub use xex::{ExecutionInfo, XexImage, DEVKIT_KEY, RETAIL_KEY};
