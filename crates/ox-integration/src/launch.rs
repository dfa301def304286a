//! Launch target classification and the module handoff chain.

use std::path::Path;

use ox_core::error::LaunchError;

/// What kind of container a host path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchTarget {
    /// Packaged content with the executable inside.
    StfsContainer,
    /// A bare executable sitting in a host directory.
    NakedExecutable,
    /// A disc image holding the full game filesystem.
    DiscImage,
}

/// Guess the container type from the file extension.
///
/// Containers ship without an extension, so no extension means STFS.
/// Anything that is not a known executable suffix is assumed to be a
/// disc image.
pub fn classify(path: &Path) -> LaunchTarget {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        None => LaunchTarget::StfsContainer,
        Some("xex") | Some("elf") => LaunchTarget::NakedExecutable,
        Some(_) => LaunchTarget::DiscImage,
    }
}

/// Drive the module handoff chain starting at `first_module`.
///
/// After each launch the loader data is consulted for a follow-up
/// module; consuming it must clear it so the chain always advances.
/// Results of intermediate launches are discarded, only the final
/// module decides success.
pub fn run_module_chain<L, N>(
    first_module: &str,
    mut launch: L,
    mut take_next_module: N,
) -> Result<(), LaunchError>
where
    L: FnMut(&str) -> i32,
    N: FnMut() -> String,
{
    let mut module_path = first_module.to_string();
    let mut result = 0;

    while !module_path.is_empty() {
        tracing::info!("Launching module {}", module_path);
        result = launch(&module_path);
        module_path = take_next_module();
    }

    if result == 0 {
        Ok(())
    } else {
        Err(LaunchError::ModuleLaunchFailed(result))
    }
}
