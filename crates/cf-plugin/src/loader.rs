//! Dynamic plugin library lifecycle
//!
//! The loadable-plugin ABI itself is a single entry symbol returning a
//! `PluginSpec`; everything past that symbol is the plugin crate's business.
//! What matters here is lifetime: a library must stay mapped for as long as
//! behaviors created from it may run, so handles are parked in
//! `PluginLibraries` and unloaded together when it drops.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use log::{debug, info};

use cf_core::{Error, Result};

use crate::registry::PluginSpec;

/// Symbol every plugin library exports.
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"clipforge_plugin_entry";

/// Entry point: builds the spec the registry consumes.
pub type PluginEntryFn = fn() -> PluginSpec;

/// Keeps loaded plugin libraries mapped until destruction.
///
/// Drop this only after the registry holding the behaviors is gone.
#[derive(Default)]
pub struct PluginLibraries {
    libs: Vec<(PathBuf, Library)>,
}

impl PluginLibraries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a plugin library and resolve its entry into a `PluginSpec`.
    pub fn load(&mut self, path: &Path) -> Result<PluginSpec> {
        let lib = unsafe { Library::new(path) }
            .map_err(|e| Error::InvalidOperation(format!("{}: {e}", path.display())))?;

        let spec = unsafe {
            let entry: Symbol<PluginEntryFn> = lib
                .get(PLUGIN_ENTRY_SYMBOL)
                .map_err(|e| Error::InvalidOperation(format!("{}: {e}", path.display())))?;
            entry()
        };

        debug!("loaded plugin library {}", path.display());
        self.libs.push((path.to_path_buf(), lib));
        Ok(spec)
    }

    pub fn len(&self) -> usize {
        self.libs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libs.is_empty()
    }
}

impl Drop for PluginLibraries {
    fn drop(&mut self) {
        for (path, _) in &self.libs {
            info!("unloading plugin library {}", path.display());
        }
        // Library handles unload as they drop.
        self.libs.clear();
    }
}
