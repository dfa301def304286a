//! Error types for the oxidized-xenon emulator

use thiserror::Error;

/// Main error type for the emulator
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("CPU error: {0}")]
    Cpu(#[from] CpuError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Filesystem error: {0}")]
    Vfs(#[from] VfsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Errors raised while bringing up the subsystem graph
///
/// Each variant corresponds to one stage of the fixed setup sequence;
/// a failed stage aborts the rest of the sequence and this value tells
/// the caller exactly which stage gave up.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Guest memory initialization failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("Processor setup failed: {0}")]
    Processor(#[from] CpuError),

    #[error("Audio system factory returned no implementation")]
    AudioNotImplemented,

    #[error("Graphics system factory returned no implementation")]
    GraphicsNotImplemented,

    #[error("Input system setup failed: {0}")]
    Input(String),

    #[error("Graphics system setup failed: {0}")]
    Graphics(String),

    #[error("Audio system setup failed: {0}")]
    Audio(String),
}

/// Errors raised while resolving and launching a guest title
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The launch target could not be opened or mounted. Device-level
    /// corruption, bad formats and missing files all collapse into this.
    #[error("No such file: {0}")]
    NoSuchFile(String),

    /// The device mounted fine but could not be registered with the
    /// virtual filesystem (mount path already occupied, usually).
    #[error("Unable to register device at {0}")]
    UnableToRegister(String),

    /// The final module in the handoff chain returned a nonzero result.
    #[error("Module launch failed with code {0}")]
    ModuleLaunchFailed(i32),
}

/// Memory-related errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Invalid guest address: 0x{0:08x}")]
    InvalidAddress(u32),

    #[error("Access of {size} bytes at 0x{addr:08x} crosses the address space")]
    OutOfRange { addr: u32, size: u32 },
}

/// CPU / translation backend errors
#[derive(Error, Debug)]
pub enum CpuError {
    #[error("Code cache reservation failed: {0}")]
    CodeCache(String),

    #[error("Translation backend already installed")]
    BackendAlreadyInstalled,
}

/// Kernel state errors
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Invalid handle: 0x{0:08x}")]
    InvalidHandle(u32),

    #[error("Kernel module not loaded: {0}")]
    ModuleNotLoaded(String),

    #[error("Object type mismatch for handle 0x{0:08x}")]
    ObjectTypeMismatch(u32),
}

/// Guest executable loader errors
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Invalid XEX: {0}")]
    InvalidXex(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Compressed basefiles are not supported")]
    UnsupportedCompression,
}

/// Virtual filesystem errors
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("Path does not resolve to a device: {0}")]
    NoDevice(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Read failed for {path}: {message}")]
    ReadFailed { path: String, message: String },
}

/// Result type alias for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;
