/*
 *  plugin/loader.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Dynamic plugin loader
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info};
use libloading::{Library, Symbol};

use crate::error::{PluginError, Result};
use super::adapter::{Capability, ModuleGuard};
use super::ffi::{PluginDescriptor, PluginRegisterFn, ProfileKind, REGISTER_SYMBOL};

/// Plugin metadata extracted from the descriptor
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    /// Module name (e.g., "Clock")
    pub name: String,

    /// Module version (e.g., "1.0.0")
    pub version: String,

    /// Capability profile the module implements
    pub profile: ProfileKind,

    /// File the module was loaded from
    pub path: PathBuf,
}

/// A loaded module with its library and descriptor
pub struct LoadedPlugin {
    /// The loaded shared library; every capability handed out holds a clone
    library: Arc<Library>,

    /// Only valid while `library` is loaded
    descriptor: &'static PluginDescriptor,

    metadata: PluginMetadata,
}

impl LoadedPlugin {
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// The module's capability profile, keeping the library loaded
    pub fn capability(&self) -> Capability {
        let guard: ModuleGuard = self.library.clone();
        Capability::from_descriptor(self.descriptor, Some(guard))
    }
}

/// Plugin loader - loads a module from an explicit path
pub struct PluginLoader;

impl PluginLoader {
    /// Load a plugin from a specific path
    ///
    /// This performs the following steps:
    /// 1. Load the shared library
    /// 2. Get the registration function symbol
    /// 3. Call the registration function to get the descriptor
    /// 4. Extract plugin metadata
    pub fn load_plugin<P: AsRef<Path>>(path: P) -> Result<LoadedPlugin> {
        let path = path.as_ref();
        info!("Loading plugin from: {}", path.display());

        if !path.exists() {
            return Err(PluginError::Load(format!("no such file: {}", path.display())));
        }

        // SAFETY: loading runs the module's initializers; only load trusted files.
        let library = unsafe { Library::new(path) }?;

        let descriptor_ptr = {
            // SAFETY: the symbol is declared with PluginRegisterFn's signature.
            let register_fn: Symbol<PluginRegisterFn> = unsafe { library.get(REGISTER_SYMBOL) }?;
            register_fn()
        };

        if descriptor_ptr.is_null() {
            return Err(PluginError::Load("plugin registration returned a null descriptor".to_string()));
        }

        // SAFETY: the descriptor is a static inside the module; the Arc below
        // keeps the module mapped for as long as it is reachable.
        let descriptor: &'static PluginDescriptor = unsafe { &*descriptor_ptr };

        let metadata = PluginMetadata {
            name: descriptor.name(),
            version: descriptor.version(),
            profile: descriptor.profile.kind(),
            path: path.to_path_buf(),
        };

        debug!("Plugin descriptor at {:p}", descriptor_ptr);
        info!("Loaded plugin: {} v{} ({} profile)", metadata.name, metadata.version, metadata.profile);

        Ok(LoadedPlugin {
            library: Arc::new(library),
            descriptor,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let err = PluginLoader::load_plugin("/nonexistent/libstatelink_nothing.so").err().unwrap();
        assert!(matches!(err, PluginError::Load(_)));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_not_a_library() {
        let path = std::env::temp_dir().join(format!("statelink-not-a-plugin-{}.so", std::process::id()));
        std::fs::write(&path, b"definitely not ELF").unwrap();

        let result = PluginLoader::load_plugin(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(PluginError::Load(_))));
    }
}
