//! Configuration for the hot-fix injector.
//!
//! Names every collaborator the rewritten code talks to: the runtime assembly holding the
//! dispatch hook and the argument-pack family, the marker attribute that selects members, and
//! the framework base type whose instance constructors are never intercepted. All names are
//! canonical type ids (see [`crate::metadata::identity`]).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Configuration for selection and rewriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotfixConfig {
    /// Assembly that defines the dispatch hook and receives the argument packs.
    pub runtime_assembly: String,

    /// Marker attribute type id (default: `Hotfix.HotfixAttribute`).
    pub marker_attribute: String,

    /// Named boolean field of the marker that forbids interception (default: `Forbidden`).
    pub forbidden_field: String,

    /// Framework base type; instance constructors of its subclasses are skipped.
    pub framework_base_type: String,

    /// Type declaring the dispatch hook.
    pub hook_type: String,

    /// Name of the dispatch hook, `static bool Hook<TIn, TOut>(long, TIn, out TOut)`.
    pub hook_method: String,

    /// Namespace of the synthesized argument packs.
    pub pack_namespace: String,

    /// Base name of the argument packs; arity `N > 0` is suffixed with `` `N``.
    pub pack_base_name: String,

    /// Interface every argument pack implements.
    pub pack_interface: String,

    /// Generic list type holding a pack's typed index accessors.
    pub accessor_list_type: String,

    /// Generic accessor type declaring the `DelGetter` / `DelSetter` delegates.
    pub accessor_type: String,

    /// Type exposing the per-element channel conversions.
    pub channel_type: String,

    /// Generic channel method reading one element, `void Pull<T>(IntPtr, int, out T)`.
    pub channel_pull: String,

    /// Generic channel method writing one element, `void Push<T>(IntPtr, T)`.
    pub channel_push: String,

    /// Scan custom attributes for the marker.
    pub attribute_scan: bool,

    /// Work-set directives, in the grammar understood by [`crate::hotfix::Directive`].
    pub directives: Vec<String>,
}

impl Default for HotfixConfig {
    fn default() -> Self {
        Self {
            runtime_assembly: "HotfixRuntime".to_string(),
            marker_attribute: "Hotfix.HotfixAttribute".to_string(),
            forbidden_field: "Forbidden".to_string(),
            framework_base_type: "UnityEngine.Object".to_string(),
            hook_type: "Hotfix.HotfixCaller".to_string(),
            hook_method: "CallHotfix".to_string(),
            pack_namespace: "Hotfix".to_string(),
            pack_base_name: "ArgPack".to_string(),
            pack_interface: "Hotfix.IArgPack".to_string(),
            accessor_list_type: "Hotfix.ArgPackIndexAccessorList`1".to_string(),
            accessor_type: "Hotfix.ArgPackIndexAccessor`1".to_string(),
            channel_type: "Hotfix.ValueChannel".to_string(),
            channel_pull: "Pull".to_string(),
            channel_push: "Push".to_string(),
            attribute_scan: true,
            directives: Vec::new(),
        }
    }
}

impl HotfixConfig {
    /// Creates a configuration with default names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns [`crate::Error::Serialization`] for invalid JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read and
    /// [`crate::Error::Serialization`] for invalid JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Sets the runtime assembly.
    #[must_use]
    pub fn with_runtime_assembly(mut self, name: impl Into<String>) -> Self {
        self.runtime_assembly = name.into();
        self
    }

    /// Sets the marker attribute and its forbidden field.
    #[must_use]
    pub fn with_marker(
        mut self,
        attribute: impl Into<String>,
        forbidden_field: impl Into<String>,
    ) -> Self {
        self.marker_attribute = attribute.into();
        self.forbidden_field = forbidden_field.into();
        self
    }

    /// Sets the framework base type.
    #[must_use]
    pub fn with_framework_base_type(mut self, id: impl Into<String>) -> Self {
        self.framework_base_type = id.into();
        self
    }

    /// Sets the dispatch hook.
    #[must_use]
    pub fn with_hook(
        mut self,
        hook_type: impl Into<String>,
        hook_method: impl Into<String>,
    ) -> Self {
        self.hook_type = hook_type.into();
        self.hook_method = hook_method.into();
        self
    }

    /// Enables or disables the marker attribute scan.
    #[must_use]
    pub fn with_attribute_scan(mut self, enabled: bool) -> Self {
        self.attribute_scan = enabled;
        self
    }

    /// Appends a directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Canonical id of the argument pack of `arity`.
    #[must_use]
    pub fn pack_type_id(&self, arity: usize) -> String {
        let name = self.pack_name(arity);
        if self.pack_namespace.is_empty() {
            name
        } else {
            format!("{}.{}", self.pack_namespace, name)
        }
    }

    /// Simple name of the argument pack of `arity`.
    #[must_use]
    pub fn pack_name(&self, arity: usize) -> String {
        if arity == 0 {
            self.pack_base_name.clone()
        } else {
            format!("{}`{}", self.pack_base_name, arity)
        }
    }

    /// Returns the arity if `id` names an argument pack.
    #[must_use]
    pub fn pack_arity(&self, id: &str) -> Option<usize> {
        let base = self.pack_type_id(0);
        let rest = id.strip_prefix(base.as_str())?;
        if rest.is_empty() {
            return Some(0);
        }
        rest.strip_prefix('`')?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_naming() {
        let config = HotfixConfig::default();
        assert_eq!(config.pack_type_id(0), "Hotfix.ArgPack");
        assert_eq!(config.pack_type_id(3), "Hotfix.ArgPack`3");
        assert_eq!(config.pack_arity("Hotfix.ArgPack`3"), Some(3));
        assert_eq!(config.pack_arity("Hotfix.ArgPack"), Some(0));
        assert_eq!(config.pack_arity("Hotfix.ArgPackIndexAccessor`1"), None);
        assert_eq!(config.pack_arity("Game.Player"), None);
    }

    #[test]
    fn json_keeps_defaults_for_missing_keys() {
        let config = HotfixConfig::from_json(
            r#"{ "runtime_assembly": "CapsLua", "directives": ["type Game.Player"] }"#,
        )
        .unwrap();
        assert_eq!(config.runtime_assembly, "CapsLua");
        assert_eq!(config.directives, vec!["type Game.Player".to_string()]);
        assert_eq!(config.hook_method, HotfixConfig::default().hook_method);

        assert!(HotfixConfig::from_json("{ nope").is_err());
    }

    #[test]
    fn builder() {
        let config = HotfixConfig::new()
            .with_runtime_assembly("Runtime")
            .with_marker("Game.PatchableAttribute", "Never")
            .with_attribute_scan(false)
            .with_directive("--type Game.Internal");
        assert_eq!(config.runtime_assembly, "Runtime");
        assert_eq!(config.forbidden_field, "Never");
        assert!(!config.attribute_scan);
        assert_eq!(config.directives.len(), 1);
    }
}
