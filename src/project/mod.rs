//! Module registry with an explicit open/close lifecycle.
//!
//! A [`Session`] owns every module loaded for one rewrite run, keyed by assembly name. It is
//! passed by reference to the selector and the rewriter; nothing is global, so tests build a
//! fresh session each.
//!
//! # Lifecycle
//!
//! 1. [`Session::open`] with a [`SessionConfig`]
//! 2. [`Session::load`] (or [`Session::insert`] for in-memory modules); at most one instance
//!    per name
//! 3. mutate modules through [`Session::get_mut`]; mutations mark them dirty
//! 4. [`Session::close`] consumes the session and writes every dirty module back
//!
//! # Write-back
//!
//! Closing runs in phases so a failure never corrupts an original file:
//!
//! - every dirty module is written to `<name>.tmp<ext>` (and `<name>.tmp<symext>`)
//! - all modules are dropped, releasing their file mappings
//! - temporary files are renamed over the originals
//! - written files are mirrored into the copy-to directory, if configured
//!
//! Each module is handled independently; see [`CloseReport`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotpatch::project::{Session, SessionConfig};
//!
//! let mut session = Session::open(SessionConfig::new("Library/ScriptAssemblies"));
//! session.load("Assembly-CSharp")?;
//! // ... select and rewrite ...
//! let report = session.close();
//! println!("{} modules written", report.success_count());
//! # Ok::<(), dotpatch::Error>(())
//! ```

mod config;
mod loader;
mod result;

pub use config::{SessionConfig, DEFAULT_ASSEMBLIES_DIR};
pub use result::CloseReport;

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fs,
    path::PathBuf,
};

use tracing::{debug, info, warn};

use crate::{
    metadata::{
        module::{Module, TypeId},
        signatures::TypeRef,
    },
    Error, Result,
};

/// Upper bound on base-type chain walks.
const MAX_INHERITANCE_DEPTH: usize = 256;

/// A module held by a session.
#[derive(Debug)]
pub struct LoadedModule {
    /// The module
    pub module: Module,
    /// Image path the module is written back to
    pub path: PathBuf,
    /// Whether a symbol companion was loaded
    pub has_symbols: bool,
}

/// Registry of the modules of one rewrite run.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    modules: BTreeMap<String, LoadedModule>,
}

impl Session {
    /// Opens an empty session.
    #[must_use]
    pub fn open(config: SessionConfig) -> Self {
        Session {
            config,
            modules: BTreeMap::new(),
        }
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Loads a module by assembly name, with or without the module extension.
    ///
    /// Returns the already loaded instance if there is one.
    ///
    /// # Errors
    /// Returns [`Error::ModuleNotFound`] if no image exists and the image's decoding error
    /// if it is damaged.
    pub fn load(&mut self, name: &str) -> Result<&mut Module> {
        let name = self.config.module_name(name).to_string();
        if !self.modules.contains_key(&name) {
            let path = self.config.module_path(&name);
            if !path.is_file() {
                return Err(Error::ModuleNotFound(path.display().to_string()));
            }
            let (module, has_symbols) =
                loader::read_module(&path, &self.config.symbols_path(&name))?;
            info!(module = %name, symbols = has_symbols, "module loaded");
            self.modules.insert(
                name.clone(),
                LoadedModule {
                    module,
                    path,
                    has_symbols,
                },
            );
        }
        self.get_mut(&name)
            .ok_or(Error::ModuleNotLoaded(name))
    }

    /// Loads every module image in the assemblies directory.
    ///
    /// Returns the names of the modules held afterwards.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the directory cannot be read, and the first decoding
    /// error of an image.
    pub fn load_all(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.assemblies_dir)? {
            let path = entry?.path();
            if !self.config.is_module_file(&path) {
                continue;
            }
            if let Some(stem) = path.file_name().and_then(|name| name.to_str()) {
                names.push(self.config.module_name(stem).to_string());
            }
        }
        names.sort();
        for name in &names {
            self.load(name)?;
        }
        Ok(self.module_names())
    }

    /// Adds an in-memory module, replacing any module of the same name.
    pub fn insert(&mut self, module: Module) -> &mut Module {
        let name = module.name.clone();
        let path = self.config.module_path(&name);
        let loaded = self.modules.entry(name).or_insert(LoadedModule {
            module: Module::new(""),
            path,
            has_symbols: false,
        });
        loaded.module = module;
        loaded.has_symbols = loaded.module.methods().any(|(_, method)| method.debug.is_some());
        &mut loaded.module
    }

    /// Returns true if a module of this name is held.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(self.config.module_name(name))
    }

    /// A held module.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules
            .get(self.config.module_name(name))
            .map(|loaded| &loaded.module)
    }

    /// A held module, mutable.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Module> {
        let name = self.config.module_name(name).to_string();
        self.modules.get_mut(&name).map(|loaded| &mut loaded.module)
    }

    /// A held module together with its file bookkeeping.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&LoadedModule> {
        self.modules.get(self.config.module_name(name))
    }

    /// Names of the held modules in order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Drops a module without writing it. Returns it for inspection.
    pub fn unload(&mut self, name: &str) -> Option<Module> {
        let name = self.config.module_name(name).to_string();
        self.modules.remove(&name).map(|loaded| {
            debug!(module = %name, "module unloaded");
            loaded.module
        })
    }

    /// Finds a type by canonical id in any held module.
    #[must_use]
    pub fn find_type(&self, id: &str) -> Option<(&str, TypeId)> {
        self.modules
            .iter()
            .find_map(|(name, loaded)| loaded.module.find_type(id).map(|ty| (name.as_str(), ty)))
    }

    /// Resolves a type reference seen from module `from`.
    #[must_use]
    pub fn resolve(&self, from: &str, reference: &TypeRef) -> Option<(&Module, TypeId)> {
        let scope = reference.scope.as_deref().unwrap_or(from);
        let module = self.get(scope)?;
        module.find_type(&reference.id).map(|ty| (module, ty))
    }

    /// Returns true if `ty` in module `module` is `base_id` or derives from it.
    ///
    /// The base chain is followed across held modules; a base type defined in a module that
    /// is not held ends the walk after comparing its id.
    #[must_use]
    pub fn is_subclass_of(&self, module: &str, ty: TypeId, base_id: &str) -> bool {
        let mut current = self.get(module).map(|found| (found, ty));
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let Some((owner, ty)) = current else {
                return false;
            };
            let Some(def) = owner.type_def(ty) else {
                return false;
            };
            if def.id == base_id {
                return true;
            }
            let Some(base) = def.extends.as_ref().and_then(|extends| extends.type_ref()) else {
                return false;
            };
            if base.id == base_id {
                return true;
            }
            current = self.resolve(&owner.name, base);
        }
        false
    }

    /// The names of `root` and every assembly it references, transitively.
    ///
    /// Referenced modules that are not held yet are loaded when their image exists in the
    /// assemblies directory; missing ones are still reported but not followed.
    pub fn dependency_closure(&mut self, root: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([self.config.module_name(root).to_string()]);
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let refs = match self.load(&name) {
                Ok(module) => module.assembly_refs().to_vec(),
                Err(error) => {
                    debug!(module = %name, %error, "dependency not followed");
                    continue;
                }
            };
            queue.extend(refs);
        }
        seen
    }

    /// Writes every dirty module back and disposes the session.
    #[must_use]
    pub fn close(self) -> CloseReport {
        let Session { config, modules } = self;
        let mut report = CloseReport::default();

        let mut staged = Vec::new();
        for (name, loaded) in &modules {
            if !loaded.module.is_dirty() {
                continue;
            }
            let temp_image = config.temp_module_path(name);
            let temp_symbols = config.temp_symbols_path(name);
            match loader::write_temp(
                &loaded.module,
                &temp_image,
                &temp_symbols,
                loaded.has_symbols,
            ) {
                Ok(with_symbols) => {
                    debug!(module = %name, path = %temp_image.display(), "module staged");
                    staged.push((name.clone(), loaded.path.clone(), temp_image, with_symbols));
                }
                Err(error) => {
                    warn!(module = %name, %error, "module write failed");
                    report.failed.push((name.clone(), error));
                }
            }
        }

        drop(modules);

        for (name, path, temp_image, with_symbols) in staged {
            if let Err(source) = fs::rename(&temp_image, &path) {
                let _ = fs::remove_file(&temp_image);
                report.failed.push((name.clone(), Error::WriteFailed { module: name, source }));
                continue;
            }
            let mut files = vec![path.clone()];
            if with_symbols {
                let symbols = config.symbols_path(&name);
                match fs::rename(config.temp_symbols_path(&name), &symbols) {
                    Ok(()) => files.push(symbols),
                    Err(error) => warn!(module = %name, %error, "symbol companion not replaced"),
                }
            }
            info!(module = %name, path = %path.display(), "module written");

            if let Some(dir) = &config.copy_to {
                if let Err(error) = fs::create_dir_all(dir) {
                    warn!(module = %name, %error, "copy-to directory unavailable");
                } else {
                    for file in &files {
                        let Some(destination) = config.copy_destination(file) else {
                            continue;
                        };
                        match fs::copy(file, &destination) {
                            Ok(_) => {
                                info!(path = %destination.display(), "module copied");
                                report.copied.push(destination);
                            }
                            Err(error) => {
                                warn!(path = %destination.display(), %error, "copy failed");
                            }
                        }
                    }
                }
            }
            report.written.push((name, path));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        image::encode_module,
        module::TypeAttributes,
        signatures::TypeSignature,
    };

    fn module_with_base(name: &str, base: Option<TypeRef>) -> Module {
        let mut module = Module::new(name);
        module.add_type(
            "Game",
            &format!("{}Type", name),
            TypeAttributes::PUBLIC,
            base.map(TypeSignature::Class),
        );
        module
    }

    #[test]
    fn one_instance_per_name() {
        let mut session = Session::open(SessionConfig::new("unused"));
        session.insert(Module::new("Game"));
        session.get_mut("Game.dll").unwrap().mark_dirty();
        session.insert(Module::new("Game"));
        assert_eq!(session.module_names(), vec!["Game".to_string()]);
        assert!(!session.get("Game").unwrap().is_dirty());
        assert!(session.unload("Game").is_some());
        assert!(!session.contains("Game"));
    }

    #[test]
    fn subclass_across_modules() {
        let mut session = Session::open(SessionConfig::new("unused"));
        session.insert(module_with_base(
            "Engine",
            Some(TypeRef::external("UnityEngine", "UnityEngine.MonoBehaviour")),
        ));
        session.insert(module_with_base(
            "Game",
            Some(TypeRef::external("Engine", "Game.EngineType")),
        ));

        let (name, ty) = session.find_type("Game.GameType").unwrap();
        let name = name.to_string();
        assert!(session.is_subclass_of(&name, ty, "UnityEngine.MonoBehaviour"));
        assert!(session.is_subclass_of(&name, ty, "Game.EngineType"));
        assert!(session.is_subclass_of(&name, ty, "Game.GameType"));
        assert!(!session.is_subclass_of(&name, ty, "System.Exception"));
    }

    #[test]
    fn missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(SessionConfig::new(dir.path()));
        assert!(matches!(session.load("Nope"), Err(Error::ModuleNotFound(_))));
    }

    #[test]
    fn closure_follows_loadable_references() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = Module::new("Runtime");
        runtime.add_assembly_ref("Core");
        runtime.add_assembly_ref("mscorlib");
        fs::write(dir.path().join("Runtime.dll"), encode_module(&runtime).unwrap()).unwrap();
        fs::write(
            dir.path().join("Core.dll"),
            encode_module(&Module::new("Core")).unwrap(),
        )
        .unwrap();

        let mut session = Session::open(SessionConfig::new(dir.path()));
        let closure = session.dependency_closure("Runtime.dll");
        let expected: BTreeSet<String> = ["Core", "Runtime", "mscorlib"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(closure, expected);
        assert_eq!(session.module_names(), vec!["Core".to_string(), "Runtime".to_string()]);
    }
}
