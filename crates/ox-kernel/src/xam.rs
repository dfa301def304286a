//! Application services emulation (`xam.xex`)
//!
//! Owns the loader state through which a running title can ask for a
//! different executable to be launched in its place.

use crate::kernel_state::{KernelModule, KernelState, LoadableModule};
use ox_cpu::{Export, ExportResolver};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

pub const MODULE_NAME: &str = "xam.xex";

/// Ordinals of the exports this module registers
mod ordinals {
    pub const XAM_GET_SYSTEM_VERSION: u32 = 0x0051;
    pub const XAM_LOADER_GET_LAUNCH_DATA: u32 = 0x01A0;
    pub const XAM_LOADER_GET_LAUNCH_DATA_SIZE: u32 = 0x01A1;
    pub const XAM_LOADER_SET_LAUNCH_DATA: u32 = 0x01A2;
    pub const XAM_LOADER_LAUNCH_TITLE: u32 = 0x01A3;
    pub const XAM_LOADER_TERMINATE_TITLE: u32 = 0x01A6;
    pub const XAM_USER_GET_SIGNIN_STATE: u32 = 0x0210;
}

/// Launch request state owned by the guest's application layer.
///
/// `launch_path` names the next executable to run; empty means no
/// handoff is pending.
#[derive(Debug, Default)]
pub struct LoaderData {
    pub launch_path: String,
    pub launch_flags: u32,
}

/// The application services module
pub struct XamModule {
    loader_data: Mutex<LoaderData>,
}

impl XamModule {
    /// Register the application services export table with the resolver
    pub fn register_export_table(resolver: &Arc<ExportResolver>) {
        resolver.register_exports(
            MODULE_NAME,
            vec![
                Export::function(ordinals::XAM_GET_SYSTEM_VERSION, "XamGetSystemVersion"),
                Export::function(ordinals::XAM_LOADER_GET_LAUNCH_DATA, "XamLoaderGetLaunchData"),
                Export::function(
                    ordinals::XAM_LOADER_GET_LAUNCH_DATA_SIZE,
                    "XamLoaderGetLaunchDataSize",
                ),
                Export::function(ordinals::XAM_LOADER_SET_LAUNCH_DATA, "XamLoaderSetLaunchData"),
                Export::function(ordinals::XAM_LOADER_LAUNCH_TITLE, "XamLoaderLaunchTitle"),
                Export::function(
                    ordinals::XAM_LOADER_TERMINATE_TITLE,
                    "XamLoaderTerminateTitle",
                ),
                Export::function(ordinals::XAM_USER_GET_SIGNIN_STATE, "XamUserGetSigninState"),
            ],
        );
    }

    /// The mutable loader state. A caller that consumes `launch_path`
    /// must clear it, so one handoff request triggers one launch.
    pub fn loader_data(&self) -> MutexGuard<'_, LoaderData> {
        self.loader_data.lock()
    }
}

impl KernelModule for XamModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

impl LoadableModule for XamModule {
    fn load(kernel_state: &Arc<KernelState>) -> Arc<Self> {
        Self::register_export_table(kernel_state.processor().export_resolver());
        Arc::new(Self {
            loader_data: Mutex::new(LoaderData::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xboxkrnl::XboxkrnlModule;
    use ox_core::GuestClock;
    use ox_cpu::Processor;
    use ox_memory::Memory;
    use ox_vfs::VirtualFileSystem;

    #[test]
    fn test_loader_data_take_clears() {
        let xam = XamModule {
            loader_data: Mutex::new(LoaderData::default()),
        };

        assert!(xam.loader_data().launch_path.is_empty());

        xam.loader_data().launch_path = "game:\\next.xex".to_string();
        xam.loader_data().launch_flags = 0x2;

        let taken = std::mem::take(&mut xam.loader_data().launch_path);
        assert_eq!(taken, "game:\\next.xex");
        assert!(xam.loader_data().launch_path.is_empty());
        assert_eq!(xam.loader_data().launch_flags, 0x2);
    }

    #[test]
    fn test_export_table_registered() {
        let resolver = Arc::new(ExportResolver::new());
        XamModule::register_export_table(&resolver);

        let launch = resolver
            .resolve(MODULE_NAME, ordinals::XAM_LOADER_LAUNCH_TITLE)
            .unwrap();
        assert_eq!(launch.name, "XamLoaderLaunchTitle");
        assert_eq!(resolver.export_count(MODULE_NAME), 7);
    }

    #[test]
    fn test_baseline_modules_coexist() {
        let memory = Memory::new().unwrap();
        let resolver = Arc::new(ExportResolver::new());
        let processor = Arc::new(Processor::new(Arc::clone(&memory), resolver, None));
        let file_system = Arc::new(VirtualFileSystem::new());
        let clock = Arc::new(GuestClock::new(1.0));
        let kernel_state = KernelState::new(memory, processor, file_system, clock);

        kernel_state.load_kernel_module::<XboxkrnlModule>();
        kernel_state.load_kernel_module::<XamModule>();

        assert!(kernel_state
            .get_kernel_module::<XboxkrnlModule>("xboxkrnl.exe")
            .is_some());
        assert!(kernel_state.get_kernel_module::<XamModule>("xam.xex").is_some());
        assert_eq!(kernel_state.processor().export_resolver().module_count(), 2);
    }
}
