//! Kernel core emulation (`xboxkrnl.exe`)
//!
//! Registers the kernel export table with the processor's resolver,
//! keeps the guest-visible timestamp block ticking, and implements the
//! module launch entry point the handoff loop drives.

use crate::kernel_state::{KernelModule, KernelState, LoadableModule};
use ox_core::error::{EmulatorError, KernelError, LoaderError};
use ox_cpu::{Export, ExportResolver};
use ox_loader::{XexImage, DEVKIT_KEY, RETAIL_KEY};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

pub const MODULE_NAME: &str = "xboxkrnl.exe";

/// Guest address of the KeTimeStampBundle block: interrupt time at +0,
/// system time at +8, uptime milliseconds at +16. Sits in the low
/// virtual range reserved for kernel shared data.
pub const TIMESTAMP_BUNDLE_ADDRESS: u32 = 0x0001_0000;

/// Update cadence of the timestamp block.
const TIMESTAMP_INTERVAL: Duration = Duration::from_millis(1);

/// Ordinals of the exports this module registers
mod ordinals {
    pub const EX_GET_XCONFIG_SETTING: u32 = 0x0010;
    pub const KE_DEBUG_MONITOR_DATA: u32 = 0x0059;
    pub const NT_CLOSE: u32 = 0x00BA;
    pub const NT_CREATE_FILE: u32 = 0x00BD;
    pub const KE_TIME_STAMP_BUNDLE: u32 = 0x0154;
    pub const XBOX_HARDWARE_INFO: u32 = 0x0192;
    pub const XBOX_KRNL_VERSION: u32 = 0x0193;
}

/// The kernel core module
pub struct XboxkrnlModule {
    kernel_state: Weak<KernelState>,
    timer_running: Arc<AtomicBool>,
    timestamp_timer: Mutex<Option<JoinHandle<()>>>,
}

impl XboxkrnlModule {
    /// Register the kernel export table with the resolver
    pub fn register_export_table(resolver: &Arc<ExportResolver>) {
        resolver.register_exports(
            MODULE_NAME,
            vec![
                Export::function(ordinals::EX_GET_XCONFIG_SETTING, "ExGetXConfigSetting"),
                Export::variable(ordinals::KE_DEBUG_MONITOR_DATA, "KeDebugMonitorData"),
                Export::function(ordinals::NT_CLOSE, "NtClose"),
                Export::function(ordinals::NT_CREATE_FILE, "NtCreateFile"),
                Export::variable(ordinals::KE_TIME_STAMP_BUNDLE, "KeTimeStampBundle"),
                Export::variable(ordinals::XBOX_HARDWARE_INFO, "XboxHardwareInfo"),
                Export::variable(ordinals::XBOX_KRNL_VERSION, "XboxKrnlVersion"),
            ],
        );
    }

    /// Load and start a guest executable.
    ///
    /// Returns 0 on success and a nonzero code on failure; the handoff
    /// loop only distinguishes zero from nonzero.
    pub fn launch_module(&self, path: &str) -> i32 {
        match self.load_and_start(path) {
            Ok(()) => 0,
            Err(error) => {
                tracing::error!("Failed to launch {}: {}", path, error);
                1
            }
        }
    }

    fn load_and_start(&self, path: &str) -> Result<(), EmulatorError> {
        let Some(kernel_state) = self.kernel_state.upgrade() else {
            return Err(KernelError::ModuleNotLoaded(MODULE_NAME.to_string()).into());
        };

        let data = kernel_state.file_system().read_file(path)?;
        let image = XexImage::parse(&data)?;
        let basefile = if image.is_encrypted() {
            Self::decrypt_with_known_keys(&image)?
        } else {
            image.basefile().to_vec()
        };

        kernel_state.memory().write_bytes(image.image_base(), &basefile)?;

        let thread = kernel_state.create_guest_thread("main", true);
        tracing::info!(
            "Module {} loaded at 0x{:08X}, entry 0x{:08X}, main thread 0x{:08X}",
            path,
            image.image_base(),
            image.entry_point(),
            thread.handle()
        );
        Ok(())
    }

    /// Retail images wrap the session key with the retail console key,
    /// devkit images with zeroes. The container does not say which, so
    /// try retail first and check for the PE magic.
    fn decrypt_with_known_keys(image: &XexImage) -> Result<Vec<u8>, EmulatorError> {
        let retail = image.decrypt_basefile(&RETAIL_KEY)?;
        if retail.starts_with(b"MZ") {
            return Ok(retail);
        }
        let devkit = image.decrypt_basefile(&DEVKIT_KEY)?;
        if devkit.starts_with(b"MZ") {
            return Ok(devkit);
        }
        Err(LoaderError::DecryptionFailed("no known console key fits".into()).into())
    }

    fn start_timestamp_timer(
        kernel_state: &Arc<KernelState>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let memory = Arc::clone(kernel_state.memory());
        let clock = Arc::clone(kernel_state.clock());

        std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                let system_time = clock.guest_system_time();
                let interrupt_time = system_time - clock.system_time_base();
                let uptime_ms = (interrupt_time / 10_000) as u32;

                let written = memory
                    .write_u64(TIMESTAMP_BUNDLE_ADDRESS, interrupt_time)
                    .and_then(|_| memory.write_u64(TIMESTAMP_BUNDLE_ADDRESS + 8, system_time))
                    .and_then(|_| memory.write_u32(TIMESTAMP_BUNDLE_ADDRESS + 16, uptime_ms));
                if written.is_err() {
                    // Guest memory was never committed; nothing to
                    // keep updated.
                    break;
                }
                std::thread::sleep(TIMESTAMP_INTERVAL);
            }
        })
    }
}

impl KernelModule for XboxkrnlModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

impl LoadableModule for XboxkrnlModule {
    fn load(kernel_state: &Arc<KernelState>) -> Arc<Self> {
        Self::register_export_table(kernel_state.processor().export_resolver());

        let timer_running = Arc::new(AtomicBool::new(true));
        let timestamp_timer =
            Self::start_timestamp_timer(kernel_state, Arc::clone(&timer_running));

        Arc::new(Self {
            kernel_state: Arc::downgrade(kernel_state),
            timer_running,
            timestamp_timer: Mutex::new(Some(timestamp_timer)),
        })
    }
}

impl Drop for XboxkrnlModule {
    fn drop(&mut self) {
        self.timer_running.store(false, Ordering::Release);
        if let Some(timer) = self.timestamp_timer.lock().take() {
            let _ = timer.join();
        }
    }
}
