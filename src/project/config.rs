//! Session configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default directory holding the compiled script assemblies.
pub const DEFAULT_ASSEMBLIES_DIR: &str = "Library/ScriptAssemblies/";

/// Where a [`crate::project::Session`] reads modules from and writes them to.
///
/// # Examples
///
/// ```rust
/// use dotpatch::project::SessionConfig;
///
/// let config = SessionConfig::new("Build/Scripts")
///     .with_copy_to("Build/Patched")
///     .with_extensions(".bin", ".sym");
/// assert_eq!(config.module_path("Game"), std::path::Path::new("Build/Scripts/Game.bin"));
/// assert_eq!(config.symbols_path("Game"), std::path::Path::new("Build/Scripts/Game.sym"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the module images
    pub assemblies_dir: PathBuf,
    /// Secondary directory receiving a copy of every written module
    pub copy_to: Option<PathBuf>,
    /// Module image extension, including the dot
    pub module_extension: String,
    /// Symbol companion extension, including the dot
    pub symbol_extension: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::new(DEFAULT_ASSEMBLIES_DIR)
    }
}

impl SessionConfig {
    /// Reads modules from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SessionConfig {
            assemblies_dir: dir.into(),
            copy_to: None,
            module_extension: ".dll".to_string(),
            symbol_extension: ".pdb".to_string(),
        }
    }

    /// Mirrors written modules into `dir`.
    #[must_use]
    pub fn with_copy_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.copy_to = Some(dir.into());
        self
    }

    /// Overrides the module and symbol file extensions.
    #[must_use]
    pub fn with_extensions(mut self, module: &str, symbols: &str) -> Self {
        self.module_extension = normalize_extension(module);
        self.symbol_extension = normalize_extension(symbols);
        self
    }

    /// Strips the module extension from `name` if present.
    #[must_use]
    pub fn module_name<'a>(&self, name: &'a str) -> &'a str {
        name.strip_suffix(self.module_extension.as_str())
            .unwrap_or(name)
    }

    /// Path of the module image for `name`.
    #[must_use]
    pub fn module_path(&self, name: &str) -> PathBuf {
        self.assemblies_dir
            .join(format!("{}{}", name, self.module_extension))
    }

    /// Path of the symbol companion for `name`.
    #[must_use]
    pub fn symbols_path(&self, name: &str) -> PathBuf {
        self.assemblies_dir
            .join(format!("{}{}", name, self.symbol_extension))
    }

    /// Temporary path a module image is written to before replacing the original.
    #[must_use]
    pub fn temp_module_path(&self, name: &str) -> PathBuf {
        self.assemblies_dir
            .join(format!("{}.tmp{}", name, self.module_extension))
    }

    /// Temporary path of the symbol companion.
    #[must_use]
    pub fn temp_symbols_path(&self, name: &str) -> PathBuf {
        self.assemblies_dir
            .join(format!("{}.tmp{}", name, self.symbol_extension))
    }

    /// Copy destination for a written file, if mirroring is configured.
    #[must_use]
    pub fn copy_destination(&self, written: &Path) -> Option<PathBuf> {
        let dir = self.copy_to.as_ref()?;
        Some(dir.join(written.file_name()?))
    }

    /// Returns true if `path` names a module image (not a temporary one).
    #[must_use]
    pub fn is_module_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                name.ends_with(self.module_extension.as_str())
                    && !name.ends_with(&format!(".tmp{}", self.module_extension))
            })
    }
}

fn normalize_extension(extension: &str) -> String {
    if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{}", extension)
    }
}
