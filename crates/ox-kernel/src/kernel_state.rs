//! Central kernel state for one guest machine

use crate::guest_thread::GuestThread;
use crate::object_table::{ObjectTable, ObjectType};
use ox_core::GuestClock;
use ox_cpu::Processor;
use ox_memory::Memory;
use ox_vfs::VirtualFileSystem;
use parking_lot::RwLock;
use std::sync::Arc;

/// A host-implemented guest kernel module
pub trait KernelModule: Send + Sync + std::any::Any {
    /// Guest-visible module name, e.g. `xboxkrnl.exe`
    fn name(&self) -> &str;

    /// Helper for downcasting
    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync>;
}

/// Construction hook for [`KernelState::load_kernel_module`]
pub trait LoadableModule: KernelModule {
    fn load(kernel_state: &Arc<KernelState>) -> Arc<Self>
    where
        Self: Sized;
}

/// Root of the emulated kernel.
///
/// Owns the guest object table and the loaded kernel modules, and
/// hands the subsystem references out to module implementations.
pub struct KernelState {
    memory: Arc<Memory>,
    processor: Arc<Processor>,
    file_system: Arc<VirtualFileSystem>,
    clock: Arc<GuestClock>,
    object_table: ObjectTable,
    kernel_modules: RwLock<Vec<Arc<dyn KernelModule>>>,
}

impl KernelState {
    pub fn new(
        memory: Arc<Memory>,
        processor: Arc<Processor>,
        file_system: Arc<VirtualFileSystem>,
        clock: Arc<GuestClock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            memory,
            processor,
            file_system,
            clock,
            object_table: ObjectTable::new(),
            kernel_modules: RwLock::new(Vec::new()),
        })
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn processor(&self) -> &Arc<Processor> {
        &self.processor
    }

    pub fn file_system(&self) -> &Arc<VirtualFileSystem> {
        &self.file_system
    }

    pub fn clock(&self) -> &Arc<GuestClock> {
        &self.clock
    }

    pub fn object_table(&self) -> &ObjectTable {
        &self.object_table
    }

    /// Construct a kernel module bound to this state and add it to the
    /// module registry.
    pub fn load_kernel_module<M: LoadableModule + 'static>(self: &Arc<Self>) -> Arc<M> {
        let module = M::load(self);
        tracing::info!("Kernel module {} loaded", module.name());
        self.kernel_modules.write().push(Arc::clone(&module) as Arc<dyn KernelModule>);
        module
    }

    /// Look up a loaded kernel module by guest name
    pub fn get_kernel_module<M: KernelModule + 'static>(&self, name: &str) -> Option<Arc<M>> {
        self.kernel_modules
            .read()
            .iter()
            .find(|module| module.name().eq_ignore_ascii_case(name))
            .and_then(|module| Arc::clone(module).as_any().downcast::<M>().ok())
    }

    /// Create a guest thread object and register it in the object table
    pub fn create_guest_thread(&self, name: &str, can_debugger_suspend: bool) -> Arc<GuestThread> {
        let handle = self.object_table.allocate_handle();
        let thread = GuestThread::new(handle, name, can_debugger_suspend);
        self.object_table
            .register(Arc::clone(&thread) as Arc<dyn crate::object_table::KernelObject>);
        tracing::debug!("Guest thread {} created, handle 0x{:08X}", name, handle);
        thread
    }

    /// All registered guest threads
    pub fn guest_threads(&self) -> Vec<Arc<GuestThread>> {
        self.object_table.objects_by_type::<GuestThread>(ObjectType::Thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ox_cpu::ExportResolver;

    fn make_kernel_state() -> Arc<KernelState> {
        let memory = Memory::new().unwrap();
        let resolver = Arc::new(ExportResolver::new());
        let processor = Arc::new(Processor::new(Arc::clone(&memory), resolver, None));
        let file_system = Arc::new(VirtualFileSystem::new());
        let clock = Arc::new(GuestClock::new(1.0));
        KernelState::new(memory, processor, file_system, clock)
    }

    struct TestModule {
        name: String,
    }

    impl KernelModule for TestModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
            self
        }
    }

    impl LoadableModule for TestModule {
        fn load(_kernel_state: &Arc<KernelState>) -> Arc<Self> {
            Arc::new(Self {
                name: "test.xex".to_string(),
            })
        }
    }

    #[test]
    fn test_module_registry() {
        let kernel_state = make_kernel_state();
        let loaded = kernel_state.load_kernel_module::<TestModule>();
        assert_eq!(loaded.name(), "test.xex");

        // Lookup is case-insensitive, guests mix casings freely.
        let found = kernel_state.get_kernel_module::<TestModule>("TEST.XEX").unwrap();
        assert!(Arc::ptr_eq(&loaded, &found));

        assert!(kernel_state.get_kernel_module::<TestModule>("other.xex").is_none());
    }

    #[test]
    fn test_guest_thread_registry() {
        let kernel_state = make_kernel_state();
        assert!(kernel_state.guest_threads().is_empty());

        let main = kernel_state.create_guest_thread("main", true);
        let audio = kernel_state.create_guest_thread("audio worker", false);
        assert_ne!(main.handle(), audio.handle());

        let threads = kernel_state.guest_threads();
        assert_eq!(threads.len(), 2);
        assert!(kernel_state.object_table().exists(main.handle()));

        let fetched = kernel_state
            .object_table()
            .get::<GuestThread>(audio.handle())
            .unwrap();
        assert!(!fetched.can_debugger_suspend());
    }
}
