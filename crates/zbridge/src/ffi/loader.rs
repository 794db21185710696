//! Locating and opening the native messaging library
//!
//! Explicit search paths (from configuration) are tried before the platform
//! defaults. When nothing matches on disk, the bare file names are handed to
//! the system loader so `LD_LIBRARY_PATH` and friends still apply.

use libloading::Library;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Library loading errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// No candidate file for the library exists
    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    /// A required entry point is missing
    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// The file exists but the system loader rejected it
    #[error("Failed to load library: {0}")]
    LoadFailed(String),
}

/// Resolves a short library name such as `zmq` to a loaded [`Library`]
#[derive(Debug, Clone)]
pub struct LibraryLoader {
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// A loader over the platform default directories
    pub fn new() -> Self {
        Self {
            search_paths: Self::default_search_paths(),
        }
    }

    /// A loader trying `paths`, in order, before the platform defaults
    pub fn with_search_paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut search_paths: Vec<PathBuf> = paths.into_iter().collect();
        search_paths.extend(Self::default_search_paths());
        Self { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/usr/lib"));
            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib/x86_64-linux-gnu"));
                paths.push(PathBuf::from("/usr/lib/aarch64-linux-gnu"));
                paths.push(PathBuf::from("/usr/lib64"));
            }
            paths.push(PathBuf::from("/lib"));
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/opt/homebrew/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/usr/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        paths
    }

    /// File names the library may be installed under, most specific first
    ///
    /// Runtime packages often ship only the versioned soname, so those are
    /// tried after the development symlink.
    pub fn candidate_names(name: &str) -> Vec<String> {
        if cfg!(target_os = "windows") {
            vec![format!("{name}.dll"), format!("lib{name}.dll")]
        } else if cfg!(target_os = "macos") {
            vec![
                format!("lib{name}.dylib"),
                format!("lib{name}.5.dylib"),
                format!("lib{name}.so"),
            ]
        } else {
            vec![
                format!("lib{name}.so"),
                format!("lib{name}.so.5"),
                format!("lib{name}.so.3"),
                format!("lib{name}.so.1"),
            ]
        }
    }

    /// First existing file for `name` in the search paths
    ///
    /// A name that already is a path to an existing file resolves to itself.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.components().count() > 1 && direct.exists() {
            return Some(direct.to_path_buf());
        }

        let candidates = Self::candidate_names(name);
        self.search_paths
            .iter()
            .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
            .find(|path| path.exists())
    }

    /// Open the library
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialisers inside this process. The
    /// caller must trust the library found under `name`.
    pub unsafe fn open(&self, name: &str) -> Result<Library, LoadError> {
        if let Some(path) = self.resolve(name) {
            tracing::debug!(path = %path.display(), "opening native library");
            return Library::new(&path).map_err(|e| LoadError::LoadFailed(e.to_string()));
        }

        // Defer to the system loader's own search order
        for file in Self::candidate_names(name) {
            if let Ok(library) = Library::new(&file) {
                tracing::debug!(%file, "opened native library via system search");
                return Ok(library);
            }
        }
        Err(LoadError::LibraryNotFound(name.to_string()))
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths_come_first() {
        let loader = LibraryLoader::with_search_paths([PathBuf::from("/opt/zmq/lib")]);
        assert_eq!(loader.search_paths()[0], PathBuf::from("/opt/zmq/lib"));
        assert!(loader.search_paths().len() >= 1);
    }

    #[test]
    fn test_candidate_names_include_bare_name() {
        let names = LibraryLoader::candidate_names("zmq");
        assert!(names.iter().any(|name| name.contains("zmq")));
        #[cfg(target_os = "linux")]
        assert_eq!(names[0], "libzmq.so");
    }

    #[test]
    fn test_resolve_finds_file_in_search_path() {
        let dir = std::env::temp_dir().join(format!("zbridge-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join(&LibraryLoader::candidate_names("fakezmq")[1]);
        std::fs::write(&file, b"").unwrap();

        let loader = LibraryLoader::with_search_paths([dir.clone()]);
        assert_eq!(loader.resolve("fakezmq"), Some(file.clone()));
        assert_eq!(loader.resolve(file.to_str().unwrap()), Some(file));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_library_reports_name() {
        let loader = LibraryLoader::with_search_paths(Vec::new());
        let err = unsafe { loader.open("definitely-not-a-real-library") }.unwrap_err();
        assert_eq!(
            err,
            LoadError::LibraryNotFound("definitely-not-a-real-library".to_string())
        );
    }
}
