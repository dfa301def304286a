//! Host-debugger detection

/// Whether a host debugger (gdb, lldb, Visual Studio) is attached to this
/// process. Guest fault routing defers to it when so.
#[cfg(target_os = "linux")]
pub fn is_host_debugger_attached() -> bool {
    // A tracer shows up as a nonzero TracerPid in the process status.
    match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => status.lines().any(|line| {
            line.strip_prefix("TracerPid:")
                .map(|pid| pid.trim().parse::<u32>().is_ok_and(|pid| pid != 0))
                .unwrap_or(false)
        }),
        Err(_) => false,
    }
}

#[cfg(windows)]
pub fn is_host_debugger_attached() -> bool {
    unsafe { windows_sys::Win32::System::Diagnostics::Debug::IsDebuggerPresent() != 0 }
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn is_host_debugger_attached() -> bool {
    false
}
