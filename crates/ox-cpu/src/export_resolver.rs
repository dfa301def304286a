//! Kernel export resolution
//!
//! Guest executables import kernel routines by (module, ordinal). The
//! resolver holds the per-module export tables the kernel modules
//! register at load time.

use std::collections::HashMap;

use parking_lot::RwLock;

/// What an export points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A callable kernel routine
    Function,
    /// A kernel-provided variable
    Variable,
}

/// A single kernel export
#[derive(Debug, Clone, Copy)]
pub struct Export {
    /// Ordinal the guest imports by
    pub ordinal: u32,
    /// Export name for diagnostics
    pub name: &'static str,
    /// Function or variable
    pub kind: ExportKind,
}

impl Export {
    pub const fn function(ordinal: u32, name: &'static str) -> Self {
        Self {
            ordinal,
            name,
            kind: ExportKind::Function,
        }
    }

    pub const fn variable(ordinal: u32, name: &'static str) -> Self {
        Self {
            ordinal,
            name,
            kind: ExportKind::Variable,
        }
    }
}

/// Export tables keyed by module name (case-insensitive, guests are not
/// consistent about casing).
#[derive(Default)]
pub struct ExportResolver {
    tables: RwLock<HashMap<String, Vec<Export>>>,
}

impl ExportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) the export table for `module`.
    pub fn register_exports(&self, module: &str, exports: Vec<Export>) {
        let mut tables = self.tables.write();
        let table = tables.entry(module.to_ascii_lowercase()).or_default();
        let added = exports.len();
        table.extend(exports);
        tracing::debug!("Registered {} exports for {}", added, module);
    }

    /// Look up an export by module and ordinal.
    pub fn resolve(&self, module: &str, ordinal: u32) -> Option<Export> {
        self.tables
            .read()
            .get(&module.to_ascii_lowercase())?
            .iter()
            .find(|export| export.ordinal == ordinal)
            .copied()
    }

    /// Number of exports registered for `module`.
    pub fn export_count(&self, module: &str) -> usize {
        self.tables
            .read()
            .get(&module.to_ascii_lowercase())
            .map_or(0, Vec::len)
    }

    /// Number of modules with a registered table.
    pub fn module_count(&self) -> usize {
        self.tables.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let resolver = ExportResolver::new();
        resolver.register_exports(
            "xboxkrnl.exe",
            vec![
                Export::function(0x0001, "DbgPrint"),
                Export::variable(0x0002, "KeDebugMonitorData"),
            ],
        );

        let export = resolver.resolve("xboxkrnl.exe", 0x0001).unwrap();
        assert_eq!(export.name, "DbgPrint");
        assert_eq!(export.kind, ExportKind::Function);

        assert!(resolver.resolve("xboxkrnl.exe", 0x9999).is_none());
        assert!(resolver.resolve("xam.xex", 0x0001).is_none());
    }

    #[test]
    fn test_module_name_case_insensitive() {
        let resolver = ExportResolver::new();
        resolver.register_exports("XboxKrnl.exe", vec![Export::function(7, "KeBugCheck")]);

        assert!(resolver.resolve("xboxkrnl.exe", 7).is_some());
        assert_eq!(resolver.export_count("XBOXKRNL.EXE"), 1);
        assert_eq!(resolver.module_count(), 1);
    }
}
