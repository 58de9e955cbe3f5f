/*
 *  plugin/loader.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Plugin loader - finds prop type modules and binds their symbols
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

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use libloading::Library;

use crate::error::KioskError;
use super::ffi::{PropVTable, RawVTable, KIOSK_PROP_ABI_VERSION};

/// Colon-separated directories searched after the working directory
pub const PLUGIN_PATH_ENV: &str = "PROP_PLUGIN_PATH";

/// A module whose seven symbols all resolved
pub struct LoadedPlugin {
    vtable: PropVTable,

    /// Where it came from, for diagnostics
    path: PathBuf,

    /// Must outlive every call through `vtable`. `None` for tables
    /// compiled into the host.
    #[allow(dead_code)]
    library: Option<Library>,
}

impl LoadedPlugin {
    /// Wrap a vtable that lives in this process
    pub fn from_vtable(vtable: PropVTable, label: impl Into<PathBuf>) -> Self {
        Self {
            vtable,
            path: label.into(),
            library: None,
        }
    }

    pub fn vtable(&self) -> &PropVTable {
        &self.vtable
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resolves logical type names (`text`) to modules (`./libtext.so`)
#[derive(Debug, Clone, Default)]
pub struct PluginLoader {
    search_path: Vec<PathBuf>,
}

impl PluginLoader {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Search path from `$PROP_PLUGIN_PATH`
    pub fn from_env() -> Self {
        let value = std::env::var(PLUGIN_PATH_ENV).unwrap_or_default();
        Self::new(Self::parse_search_path(&value))
    }

    /// Split a colon-separated path list, dropping empty entries
    pub fn parse_search_path(value: &str) -> Vec<PathBuf> {
        value
            .split(':')
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Platform module filename, e.g. `libprop_text.so` for `prop_text`
    pub fn plugin_filename(name: &str) -> String {
        format!("{}{}{}", DLL_PREFIX, name, DLL_SUFFIX)
    }

    /// Every path tried for `name`, in order: working directory first,
    /// then the search path.
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let filename = Self::plugin_filename(name);

        std::iter::once(Path::new(".").join(&filename))
            .chain(self.search_path.iter().map(|dir| dir.join(&filename)))
            .collect()
    }

    /// Find and open the module for `name`.
    ///
    /// The first candidate that opens wins. Candidates that exist but will
    /// not open are logged and skipped; a module that opens but lacks a
    /// required symbol is rejected outright.
    pub fn open(&self, name: &str) -> Result<LoadedPlugin, KioskError> {
        let candidates = self.candidates(name);

        for candidate in &candidates {
            if !candidate.exists() {
                continue;
            }

            let library = match unsafe { Library::new(candidate) } {
                Ok(library) => library,
                Err(e) => {
                    warn!("Failed to open {}: {}", candidate.display(), e);
                    continue;
                }
            };

            return Self::bind(library, candidate);
        }

        debug!("Plugin '{}' not found in {:?}", name, candidates);
        Err(KioskError::PluginNotFound {
            name: name.to_string(),
            tried: candidates,
        })
    }

    /// Open a module at an exact path
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<LoadedPlugin, KioskError> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|e| {
            warn!("Failed to open {}: {}", path.display(), e);
            KioskError::PluginNotFound {
                name: path.display().to_string(),
                tried: vec![path.to_path_buf()],
            }
        })?;

        Self::bind(library, path)
    }

    fn bind(library: Library, path: &Path) -> Result<LoadedPlugin, KioskError> {
        let raw = unsafe { RawVTable::resolve(&library) };
        let vtable = Self::validate(raw, path)?;

        info!("Opened plugin {}", path.display());

        Ok(LoadedPlugin {
            vtable,
            path: path.to_path_buf(),
            library: Some(library),
        })
    }

    /// Accept a resolved table only when all seven slots are present and
    /// the optional ABI probe, if exported, matches this host.
    pub fn validate(raw: RawVTable, path: &Path) -> Result<PropVTable, KioskError> {
        let vtable = raw.complete().map_err(|missing| {
            warn!("{} is missing {}", path.display(), missing.join(", "));
            KioskError::PluginIncomplete {
                path: path.to_path_buf(),
                missing,
            }
        })?;

        if let Some(abi_version) = vtable.abi_version {
            let found = abi_version();
            if found != KIOSK_PROP_ABI_VERSION {
                warn!("{} speaks ABI {} (host {})", path.display(), found, KIOSK_PROP_ABI_VERSION);
                return Err(KioskError::PluginAbiMismatch {
                    path: path.to_path_buf(),
                    found,
                    expected: KIOSK_PROP_ABI_VERSION,
                });
            }
        }

        Ok(vtable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_path() {
        let dirs = PluginLoader::parse_search_path("/opt/kiosk/props::/usr/lib/kioskd: ");
        assert_eq!(dirs, vec![PathBuf::from("/opt/kiosk/props"), PathBuf::from("/usr/lib/kioskd")]);
        assert!(PluginLoader::parse_search_path("").is_empty());
    }

    #[test]
    fn test_plugin_filename() {
        let name = PluginLoader::plugin_filename("prop_text");

        #[cfg(target_os = "linux")]
        assert_eq!(name, "libprop_text.so");

        assert!(name.contains("prop_text"));
    }

    #[test]
    fn test_candidates_working_directory_first() {
        let loader = PluginLoader::new(vec![PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]);
        let file = PluginLoader::plugin_filename("prop_text");

        assert_eq!(
            loader.candidates("prop_text"),
            vec![
                Path::new(".").join(&file),
                Path::new("/opt/a").join(&file),
                Path::new("/opt/b").join(&file),
            ]
        );
    }

    #[test]
    fn test_missing_plugin_reports_candidates() {
        let loader = PluginLoader::new(vec![PathBuf::from("/nonexistent/kioskd")]);

        match loader.open("prop_does_not_exist") {
            Err(KioskError::PluginNotFound { name, tried }) => {
                assert_eq!(name, "prop_does_not_exist");
                assert_eq!(tried.len(), 2);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("loaded a plugin that does not exist"),
        }
    }

    #[test]
    fn test_open_path_on_non_library_fails() {
        let path = std::env::temp_dir().join(format!("kioskd-not-a-plugin-{}.so", std::process::id()));
        std::fs::write(&path, b"not an ELF file").unwrap();

        let result = PluginLoader::open_path(&path);
        assert!(matches!(result, Err(KioskError::PluginNotFound { .. })));

        let _ = std::fs::remove_file(&path);
    }
}
