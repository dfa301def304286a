//! The guest machine orchestrator.
//!
//! `Emulator` owns one complete guest machine and drives its whole
//! lifecycle: bring-up of the subsystem graph in a fixed order, title
//! launch with the xam module handoff chain, last-chance fault routing
//! while the guest runs, and teardown in reverse bring-up order.

use std::path::Path;
use std::sync::Arc;

use ox_apu::AudioSystem;
use ox_core::clock::GuestClock;
use ox_core::config::Config;
use ox_core::critical_region;
use ox_core::error::{LaunchError, SetupError};
use ox_core::exception::{self, Exception, HandlerRegistration};
use ox_core::threading;
use ox_cpu::{Backend, ExportResolver, Processor};
use ox_debug::{is_host_debugger_attached, Debugger};
use ox_gpu::GraphicsSystem;
use ox_hid::{InputDriver, InputSystem};
use ox_kernel::{GuestThread, Handle, KernelState, XamModule, XboxkrnlModule, xam, xboxkrnl};
use ox_memory::Memory;
use ox_ui::Window;
use ox_vfs::{Device, DiscImageDevice, HostPathDevice, StfsContainerDevice, VirtualFileSystem};

use crate::launch::{self, LaunchTarget};

/// Produces the audio system during setup, once the processor exists.
/// Returning `None` means audio is wanted but no implementation fits.
pub type AudioSystemFactory = Box<dyn FnOnce(&Arc<Processor>) -> Option<Box<dyn AudioSystem>>>;

/// Produces the graphics system during setup.
pub type GraphicsSystemFactory = Box<dyn FnOnce() -> Option<Box<dyn GraphicsSystem>>>;

/// Produces the input drivers to attach to the display window.
pub type InputDriverFactory = Box<dyn FnOnce(&Arc<Window>) -> Vec<Box<dyn InputDriver>>>;

/// One guest machine.
///
/// Field order is teardown order: struct fields drop in declaration
/// order, so the kernel state releases before the filesystem, the
/// filesystem before the processor, and guest memory goes last.
pub struct Emulator {
    config: Config,
    command_line: String,
    display_window: Option<Arc<Window>>,

    exception_registration: Option<HandlerRegistration>,
    kernel_state: Option<Arc<KernelState>>,
    file_system: Option<Arc<VirtualFileSystem>>,
    input_system: Option<InputSystem>,
    graphics_system: Option<Box<dyn GraphicsSystem>>,
    audio_system: Option<Box<dyn AudioSystem>>,
    processor: Option<Arc<Processor>>,
    debugger: Option<Arc<Debugger>>,
    export_resolver: Option<Arc<ExportResolver>>,
    memory: Option<Arc<Memory>>,
    clock: Option<Arc<GuestClock>>,
}

impl Emulator {
    /// Create an empty machine. No subsystem exists until `setup` runs.
    pub fn new(config: Config, command_line: String) -> Self {
        Self {
            config,
            command_line,
            display_window: None,
            exception_registration: None,
            kernel_state: None,
            file_system: None,
            input_system: None,
            graphics_system: None,
            audio_system: None,
            processor: None,
            debugger: None,
            export_resolver: None,
            memory: None,
            clock: None,
        }
    }

    /// Bring up the subsystem graph.
    ///
    /// Stages run in a fixed order because each one hands pieces to the
    /// next; the first failure aborts the sequence and leaves the later
    /// stages untouched.
    pub fn setup(
        &mut self,
        window: Arc<Window>,
        audio_system_factory: Option<AudioSystemFactory>,
        graphics_system_factory: GraphicsSystemFactory,
        input_driver_factory: Option<InputDriverFactory>,
    ) -> Result<(), SetupError> {
        self.display_window = Some(Arc::clone(&window));

        // Guest time starts now. The scalar can be adjusted later.
        let clock = Arc::new(GuestClock::new(self.config.general.time_scalar));
        self.clock = Some(Arc::clone(&clock));

        // Let worker threads pick their own logical processors.
        threading::enable_affinity_configuration();

        // Guest memory first, everything else hangs off it.
        let memory = Memory::new()?;
        memory.initialize()?;
        self.memory = Some(Arc::clone(&memory));

        // Shared export resolver used to attach and query HLE exports.
        let export_resolver = Arc::new(ExportResolver::new());
        self.export_resolver = Some(Arc::clone(&export_resolver));

        // Debugger before the CPU so translation can hook into it.
        let debugger = if self.config.debug.enabled {
            let debugger = Arc::new(Debugger::new());
            debugger.start_session();
            Some(debugger)
        } else {
            None
        };
        self.debugger = debugger.clone();

        let processor = Arc::new(Processor::new(
            Arc::clone(&memory),
            Arc::clone(&export_resolver),
            debugger.clone(),
        ));
        processor.setup(Backend::new(self.config.cpu.code_cache_size)?)?;
        self.processor = Some(Arc::clone(&processor));

        // Audio is optional, but a supplied factory must deliver.
        if let Some(factory) = audio_system_factory {
            let audio_system = factory(&processor).ok_or(SetupError::AudioNotImplemented)?;
            self.audio_system = Some(audio_system);
        }

        let graphics_system =
            graphics_system_factory().ok_or(SetupError::GraphicsNotImplemented)?;
        self.graphics_system = Some(graphics_system);

        let mut input_system = InputSystem::new(&window);
        if let Some(factory) = input_driver_factory {
            for driver in factory(&window) {
                input_system.add_driver(driver);
            }
        }
        input_system.setup()?;
        self.input_system = Some(input_system);

        // The virtual filesystem the kernel serves files out of.
        let file_system = Arc::new(VirtualFileSystem::new());
        self.file_system = Some(Arc::clone(&file_system));

        // Shared kernel state.
        let kernel_state = KernelState::new(
            Arc::clone(&memory),
            Arc::clone(&processor),
            Arc::clone(&file_system),
            Arc::clone(&clock),
        );
        self.kernel_state = Some(Arc::clone(&kernel_state));

        // Hand the core components to the systems that draw on them.
        if let Some(graphics_system) = self.graphics_system.as_mut() {
            graphics_system.setup(&processor, &kernel_state, &window)?;
        }
        if let Some(audio_system) = self.audio_system.as_mut() {
            audio_system.setup(&kernel_state)?;
        }

        // Baseline HLE kernel modules.
        kernel_state.load_kernel_module::<XboxkrnlModule>();
        kernel_state.load_kernel_module::<XamModule>();

        // Fallback fault routing goes in last, once there is a whole
        // machine for it to act on.
        self.exception_registration = Some(install_exception_handler(
            debugger,
            processor,
            kernel_state,
            Arc::clone(&window),
        ));

        // Round-trip through the display loop so bring-up is complete
        // from its point of view before any title runs.
        window.loop_().post_synchronous(|| {
            tracing::debug!("Display loop ready");
        });

        Ok(())
    }

    /// Launch a title from a host path, dispatching on container type.
    pub fn launch_path(&self, path: &Path) -> Result<(), LaunchError> {
        match launch::classify(path) {
            LaunchTarget::StfsContainer => self.launch_stfs_container(path),
            LaunchTarget::NakedExecutable => self.launch_xex_file(path),
            LaunchTarget::DiscImage => self.launch_disc_image(path),
        }
    }

    /// Launch a bare executable from a host directory.
    ///
    /// The parent directory becomes the game device, so a title at
    /// `/host/dir/foo.xex` runs as `game:\foo.xex` and finds its data
    /// files alongside itself.
    ///
    /// # Panics
    ///
    /// Panics if `setup` has not completed.
    pub fn launch_xex_file(&self, path: &Path) -> Result<(), LaunchError> {
        let mount_path = "\\Device\\Harddisk0\\Partition0";

        let Some(file_name) = path.file_name() else {
            return Err(LaunchError::NoSuchFile(path.display().to_string()));
        };

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut device = HostPathDevice::new(mount_path, parent, true);
        if !device.initialize() {
            tracing::error!("Unable to scan host path {}", parent.display());
            return Err(LaunchError::NoSuchFile(path.display().to_string()));
        }

        let file_system = self.file_system_ref();
        if !file_system.register_device(Box::new(device)) {
            tracing::error!("Unable to register host path device");
            return Err(LaunchError::UnableToRegister(mount_path.to_string()));
        }

        file_system.register_symbolic_link("game:", mount_path);
        file_system.register_symbolic_link("d:", mount_path);

        let guest_path = format!("game:\\{}", file_name.to_string_lossy());
        self.complete_launch(path, &guest_path)
    }

    /// Launch a title from a disc image.
    ///
    /// # Panics
    ///
    /// Panics if `setup` has not completed.
    pub fn launch_disc_image(&self, path: &Path) -> Result<(), LaunchError> {
        let mount_path = "\\Device\\Cdrom0";

        let mut device = DiscImageDevice::new(mount_path, path);
        if !device.initialize() {
            self.fatal_launch_dialog("Unable to mount disc image; file not found or corrupt.");
            return Err(LaunchError::NoSuchFile(path.display().to_string()));
        }

        let file_system = self.file_system_ref();
        if !file_system.register_device(Box::new(device)) {
            self.fatal_launch_dialog("Unable to register disc image.");
            return Err(LaunchError::UnableToRegister(mount_path.to_string()));
        }

        file_system.register_symbolic_link("game:", mount_path);
        file_system.register_symbolic_link("d:", mount_path);

        self.complete_launch(path, "game:\\default.xex")
    }

    /// Launch a title from a packaged STFS container.
    ///
    /// # Panics
    ///
    /// Panics if `setup` has not completed.
    pub fn launch_stfs_container(&self, path: &Path) -> Result<(), LaunchError> {
        let mount_path = "\\Device\\Cdrom0";

        let mut device = StfsContainerDevice::new(mount_path, path);
        if !device.initialize() {
            self.fatal_launch_dialog("Unable to mount STFS container; file not found or corrupt.");
            return Err(LaunchError::NoSuchFile(path.display().to_string()));
        }

        let file_system = self.file_system_ref();
        if !file_system.register_device(Box::new(device)) {
            self.fatal_launch_dialog("Unable to register STFS container.");
            return Err(LaunchError::UnableToRegister(mount_path.to_string()));
        }

        file_system.register_symbolic_link("game:", mount_path);
        file_system.register_symbolic_link("d:", mount_path);

        self.complete_launch(path, "game:\\default.xex")
    }

    /// Run the module handoff chain starting at `module_path`.
    ///
    /// xam can queue a follow-up module between launches; each queued
    /// path is consumed before the next launch so the chain always
    /// advances.
    fn complete_launch(&self, path: &Path, module_path: &str) -> Result<(), LaunchError> {
        let kernel_state = self.kernel_state_ref();
        let xam_module = kernel_state
            .get_kernel_module::<XamModule>(xam::MODULE_NAME)
            .expect("xam is loaded during setup");
        let xboxkrnl_module = kernel_state
            .get_kernel_module::<XboxkrnlModule>(xboxkrnl::MODULE_NAME)
            .expect("xboxkrnl is loaded during setup");

        tracing::info!("Launching {} as {}", path.display(), module_path);

        launch::run_module_chain(
            module_path,
            |module| xboxkrnl_module.launch_module(module),
            || std::mem::take(&mut xam_module.loader_data().launch_path),
        )
    }

    /// Blocking failure dialog, shown before the error propagates.
    fn fatal_launch_dialog(&self, message: &str) {
        let window = Arc::clone(self.window_ref());
        let text = message.to_string();
        self.window_ref().loop_().post_synchronous(move || {
            window.show_message_box("Launch failed", &text);
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn display_window(&self) -> Option<&Arc<Window>> {
        self.display_window.as_ref()
    }

    pub fn clock(&self) -> Option<&Arc<GuestClock>> {
        self.clock.as_ref()
    }

    pub fn memory(&self) -> Option<&Arc<Memory>> {
        self.memory.as_ref()
    }

    pub fn export_resolver(&self) -> Option<&Arc<ExportResolver>> {
        self.export_resolver.as_ref()
    }

    pub fn debugger(&self) -> Option<&Arc<Debugger>> {
        self.debugger.as_ref()
    }

    pub fn processor(&self) -> Option<&Arc<Processor>> {
        self.processor.as_ref()
    }

    pub fn audio_system(&self) -> Option<&dyn AudioSystem> {
        self.audio_system.as_deref()
    }

    pub fn graphics_system(&self) -> Option<&dyn GraphicsSystem> {
        self.graphics_system.as_deref()
    }

    pub fn input_system(&self) -> Option<&InputSystem> {
        self.input_system.as_ref()
    }

    pub fn file_system(&self) -> Option<&Arc<VirtualFileSystem>> {
        self.file_system.as_ref()
    }

    pub fn kernel_state(&self) -> Option<&Arc<KernelState>> {
        self.kernel_state.as_ref()
    }

    fn window_ref(&self) -> &Arc<Window> {
        self.display_window
            .as_ref()
            .expect("emulator setup has not run")
    }

    fn file_system_ref(&self) -> &Arc<VirtualFileSystem> {
        self.file_system
            .as_ref()
            .expect("emulator setup has not run")
    }

    fn kernel_state_ref(&self) -> &Arc<KernelState> {
        self.kernel_state
            .as_ref()
            .expect("emulator setup has not run")
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        // Teardown mirrors bring-up in reverse.

        // Stop the debugger first so nothing pokes a dying machine.
        if let Some(debugger) = &self.debugger {
            debugger.stop_session();
        }

        // Graphics and audio stop their workers before being dropped.
        if let Some(graphics_system) = self.graphics_system.as_mut() {
            graphics_system.shutdown();
        }
        if let Some(audio_system) = self.audio_system.as_mut() {
            audio_system.shutdown();
        }

        // The fault handler must not observe a half-dismantled machine.
        self.exception_registration = None;

        // The remaining fields drop in declaration order, kernel state
        // first and guest memory last.
    }
}

fn install_exception_handler(
    debugger: Option<Arc<Debugger>>,
    processor: Arc<Processor>,
    kernel_state: Arc<KernelState>,
    window: Arc<Window>,
) -> HandlerRegistration {
    exception::install_handler(move |ex| {
        route_guest_fault(ex, debugger.as_deref(), &processor, &kernel_state, &window)
    })
}

/// Last-chance routing for faults nothing upstream claimed.
///
/// Returns `true` when the fault was consumed and the thread may keep
/// running.
fn route_guest_fault(
    exception: &Exception,
    debugger: Option<&Debugger>,
    processor: &Processor,
    kernel_state: &KernelState,
    window: &Arc<Window>,
) -> bool {
    let internal_attached = debugger.is_some_and(|d| d.is_attached());

    if !internal_attached && is_host_debugger_attached() {
        // Another debugger owns this process; let it see the fault.
        return false;
    }
    if let Some(debugger) = debugger {
        if debugger.is_attached() {
            // The attached client decides; it may continue past its
            // own breakpoints.
            return debugger.on_unhandled_exception(exception);
        }
    }

    // Only faults inside the code cache belong to guest code.
    let in_guest_code = processor
        .backend()
        .is_some_and(|backend| backend.code_cache().contains(exception.pc()));
    if !in_guest_code {
        return false;
    }

    // Guest code crashed. Freeze the machine where it stands.
    let _global_lock = critical_region::acquire();

    let current = GuestThread::current();
    suspend_guest_threads_for_freeze(kernel_state, current.as_ref());

    tracing::error!(
        "Guest crash at pc 0x{:016x}, fault address 0x{:016x}",
        exception.pc(),
        exception.fault_address()
    );

    // Tell the user, synchronously, from the display loop.
    let dialog_window = Arc::clone(window);
    window.loop_().post_synchronous(move || {
        dialog_window.show_message_box(
            "Uh-oh!",
            "The guest has crashed.\n\nThe machine is frozen for inspection.",
        );
    });

    if let Some(current) = current {
        // We are a guest thread; freeze ourselves too and stay down.
        debug_assert!(current.can_debugger_suspend());
        current.suspend_and_wait();
        unreachable!("a guest thread frozen at a crash site was resumed");
    }

    // A fault in guest code from a thread the kernel never registered
    // cannot be frozen in place. Decline and let the host abort.
    tracing::error!("Guest fault on an unregistered thread");
    false
}

/// Suspend every guest thread that consents to debugger suspension,
/// except the faulting thread itself. Returns the frozen handles.
pub fn suspend_guest_threads_for_freeze(
    kernel_state: &KernelState,
    faulting: Option<&Arc<GuestThread>>,
) -> Vec<Handle> {
    let faulting_handle = faulting.map(|thread| thread.handle());

    let mut frozen = Vec::new();
    for thread in kernel_state.guest_threads() {
        if !thread.can_debugger_suspend() {
            // Host service threads keep running.
            continue;
        }
        if Some(thread.handle()) == faulting_handle {
            continue;
        }
        thread.suspend();
        frozen.push(thread.handle());
    }
    frozen
}

#[cfg(test)]
mod tests {
    use super::*;
    use ox_core::exception::ExceptionCode;

    fn make_machine() -> (Arc<Processor>, Arc<KernelState>, Arc<Window>) {
        let memory = Memory::new().unwrap();
        memory.initialize().unwrap();
        let export_resolver = Arc::new(ExportResolver::new());
        let processor = Arc::new(Processor::new(
            Arc::clone(&memory),
            export_resolver,
            None,
        ));
        processor.setup(Backend::new(0x10_0000).unwrap()).unwrap();

        let file_system = Arc::new(VirtualFileSystem::new());
        let clock = Arc::new(GuestClock::new(1.0));
        let kernel_state = KernelState::new(memory, Arc::clone(&processor), file_system, clock);
        let window = Window::new("fault test");

        (processor, kernel_state, window)
    }

    fn guest_pc(processor: &Processor) -> u64 {
        processor.backend().unwrap().code_cache().base_address()
    }

    #[test]
    fn test_fault_outside_cache_is_declined() {
        let (processor, kernel_state, window) = make_machine();
        let thread = kernel_state.create_guest_thread("worker", true);

        let ex = Exception::new(ExceptionCode::AccessViolation, 0x10, 0);
        let handled = route_guest_fault(&ex, None, &processor, &kernel_state, &window);

        assert!(!handled);
        assert!(!thread.is_suspended());
        assert!(window.shown_message_boxes().is_empty());
    }

    #[test]
    fn test_attached_debugger_gets_the_verdict() {
        let (processor, kernel_state, window) = make_machine();
        let thread = kernel_state.create_guest_thread("worker", true);

        let debugger = Debugger::new();
        debugger.start_session();
        debugger.set_attached(true);

        let pc = guest_pc(&processor);
        debugger.add_breakpoint(pc);

        let hit = Exception::new(ExceptionCode::IllegalInstruction, pc, 0);
        assert!(route_guest_fault(
            &hit,
            Some(&debugger),
            &processor,
            &kernel_state,
            &window
        ));

        // A fault the client declines is not ours either; no freeze.
        let miss = Exception::new(ExceptionCode::AccessViolation, pc + 4, 0);
        assert!(!route_guest_fault(
            &miss,
            Some(&debugger),
            &processor,
            &kernel_state,
            &window
        ));
        assert!(!thread.is_suspended());
        assert!(window.shown_message_boxes().is_empty());
    }

    #[test]
    fn test_guest_crash_freezes_machine() {
        let (processor, kernel_state, window) = make_machine();
        let suspendable = kernel_state.create_guest_thread("worker", true);
        let host_backed = kernel_state.create_guest_thread("audio pump", false);

        let ex = Exception::new(ExceptionCode::AccessViolation, guest_pc(&processor), 0xDEAD_0000);
        // This test thread is not a registered guest thread, so the
        // routing declines after freezing everything else.
        let handled = route_guest_fault(&ex, None, &processor, &kernel_state, &window);

        assert!(!handled);
        assert!(suspendable.is_suspended());
        assert!(!host_backed.is_suspended());

        let dialogs = window.shown_message_boxes();
        assert_eq!(dialogs.len(), 1);
        assert_eq!(dialogs[0].title, "Uh-oh!");
    }

    #[test]
    fn test_freeze_sweep_skips_faulting_thread() {
        let (_processor, kernel_state, _window) = make_machine();
        let faulting = kernel_state.create_guest_thread("faulting", true);
        let other = kernel_state.create_guest_thread("other", true);
        let host_backed = kernel_state.create_guest_thread("pump", false);

        let frozen = suspend_guest_threads_for_freeze(&kernel_state, Some(&faulting));

        assert_eq!(frozen, vec![other.handle()]);
        assert!(other.is_suspended());
        assert!(!faulting.is_suspended());
        assert!(!host_backed.is_suspended());
    }

    #[test]
    fn test_launch_path_classifies_missing_xex() {
        let mut emulator = Emulator::new(Config::default(), String::new());
        let window = Window::new("launch test");
        let graphics: GraphicsSystemFactory = Box::new(|| {
            Some(Box::new(ox_gpu::NullGraphicsSystem::new()) as Box<dyn GraphicsSystem>)
        });
        emulator.setup(window, None, graphics, None).unwrap();

        // The parent directory does not exist, so the host path device
        // refuses to mount and no dialog is involved.
        let result = emulator.launch_path(Path::new("/nonexistent-dir/title.xex"));
        assert!(matches!(result, Err(LaunchError::NoSuchFile(_))));
        assert!(emulator
            .display_window()
            .unwrap()
            .shown_message_boxes()
            .is_empty());
    }
}
