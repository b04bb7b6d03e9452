//! Work-set selection.
//!
//! Resolves the configured directives and the marker attribute into the set of methods the
//! [`crate::hotfix::Rewriter`] should intercept.
//!
//! # Directives
//!
//! ```text
//! type Game.Player                              every method of the type
//! member func Game.Math Twice(System.Int32)     one method, by canonical signature
//! member prop Game.Player Health                both accessors of a property
//! member func static Game.Math *                every method of the type
//! member func Game.Math **                      every method, non-public ones included
//! member func Game.Math ^Tw.*                   methods whose signature matches the regex
//! --type Game.Internal                          exclusions, applied last
//! --member func Game.Math Twice(System.Int32)
//! ```
//!
//! Nested types may be written with `/` or `+`. The optional `static`/`instance` qualifier in
//! member directives is accepted and ignored. Blank lines and lines starting with `#` or `//`
//! are skipped.
//!
//! # Order
//!
//! Inclusion runs the marker attribute scan first, then exact members in directive order,
//! then whole types, then regex members. Every candidate passes a filter unless it was
//! *forced*: it must be public, must have a body, and must not be the instance constructor
//! of a type derived from the framework base type. Exclusions run afterwards and are never
//! filtered.
//!
//! Modules the runtime assembly depends on (the runtime included) are never selected.

use std::collections::BTreeMap;

use regex::Regex;
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::{
    hotfix::HotfixConfig,
    metadata::{
        customattributes::{marker_state, CustomAttribute, MarkerState},
        identity::normalize_type_id,
        module::{MethodId, Module, TypeId},
    },
    project::Session,
    Error, Result,
};

/// Member kind of a `member` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MemberKind {
    /// A property; the pattern is the property name
    Prop,
    /// A method
    Func,
    /// A constructor
    Ctor,
}

/// What a `member` directive matches inside its type.
#[derive(Debug, Clone)]
pub enum MemberPattern {
    /// `*` (filtered) or `**` (forced)
    All {
        /// Bypass the filter
        forced: bool,
    },
    /// `^...`, matched against canonical method signatures
    Regex(Regex),
    /// A canonical method signature or a property name
    Signature(String),
}

impl MemberPattern {
    fn parse(pattern: &str) -> Result<Self> {
        match pattern {
            "*" => Ok(MemberPattern::All { forced: false }),
            "**" => Ok(MemberPattern::All { forced: true }),
            regex if regex.starts_with('^') => Regex::new(regex)
                .map(MemberPattern::Regex)
                .map_err(|error| Error::InvalidDirective(format!("{regex}: {error}"))),
            signature => Ok(MemberPattern::Signature(signature.to_string())),
        }
    }
}

/// One parsed directive line.
#[derive(Debug, Clone)]
pub enum Directive {
    /// `type <id>`
    Type(String),
    /// `member <kind> [static|instance] <id> <pattern>`
    Member {
        /// Member kind
        kind: MemberKind,
        /// Declaring type id
        type_id: String,
        /// Member pattern
        pattern: MemberPattern,
    },
    /// `--type <id>`
    ExcludeType(String),
    /// `--member <kind> [static|instance] <id> <pattern>`
    ExcludeMember {
        /// Member kind
        kind: MemberKind,
        /// Declaring type id
        type_id: String,
        /// Member pattern
        pattern: MemberPattern,
    },
}

impl Directive {
    /// Parses one directive line. Blank lines and comments yield `None`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDirective`] for an unknown keyword, a missing operand, an
    /// unknown member kind or an invalid regex.
    pub fn parse(line: &str) -> Result<Option<Directive>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            return Ok(None);
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let invalid = || Error::InvalidDirective(line.to_string());
        match parts[0] {
            "type" | "--type" => {
                if parts.len() != 2 {
                    return Err(invalid());
                }
                let id = normalize_type_id(parts[1]);
                Ok(Some(if parts[0] == "type" {
                    Directive::Type(id)
                } else {
                    Directive::ExcludeType(id)
                }))
            }
            "member" | "--member" => {
                let (type_index, pattern_index) = match parts.get(2) {
                    Some(&("static" | "instance")) if parts.len() >= 5 => (3, 4),
                    _ if parts.len() >= 4 => (2, 3),
                    _ => return Err(invalid()),
                };
                let kind: MemberKind = parts[1].parse().map_err(|_| invalid())?;
                let type_id = normalize_type_id(parts[type_index]);
                let pattern = MemberPattern::parse(&parts[pattern_index..].join(" "))?;
                Ok(Some(if parts[0] == "member" {
                    Directive::Member { kind, type_id, pattern }
                } else {
                    Directive::ExcludeMember { kind, type_id, pattern }
                }))
            }
            _ => Err(invalid()),
        }
    }

    /// Returns true for `--type` and `--member` directives.
    #[must_use]
    pub fn is_exclusion(&self) -> bool {
        matches!(self, Directive::ExcludeType(_) | Directive::ExcludeMember { .. })
    }
}

/// Selected methods, grouped by assembly and declaring type id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkSet {
    entries: BTreeMap<String, BTreeMap<String, Vec<MethodId>>>,
}

impl WorkSet {
    /// Creates an empty work set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method. Returns false if it was already present.
    pub fn insert(&mut self, assembly: &str, type_id: &str, method: MethodId) -> bool {
        let methods = self
            .entries
            .entry(assembly.to_string())
            .or_default()
            .entry(type_id.to_string())
            .or_default();
        if methods.contains(&method) {
            return false;
        }
        methods.push(method);
        true
    }

    /// Drops every method of a type. Returns the number removed.
    pub fn remove_type(&mut self, assembly: &str, type_id: &str) -> usize {
        let Some(types) = self.entries.get_mut(assembly) else {
            return 0;
        };
        let removed = types.remove(type_id).map_or(0, |methods| methods.len());
        if types.is_empty() {
            self.entries.remove(assembly);
        }
        removed
    }

    /// Drops one method. Returns true if it was present.
    pub fn remove_method(&mut self, assembly: &str, type_id: &str, method: MethodId) -> bool {
        let Some(types) = self.entries.get_mut(assembly) else {
            return false;
        };
        let Some(methods) = types.get_mut(type_id) else {
            return false;
        };
        let before = methods.len();
        methods.retain(|candidate| *candidate != method);
        let removed = methods.len() != before;
        if methods.is_empty() {
            types.remove(type_id);
        }
        if types.is_empty() {
            self.entries.remove(assembly);
        }
        removed
    }

    /// Returns true if `method` of `assembly` is selected.
    #[must_use]
    pub fn contains(&self, assembly: &str, method: MethodId) -> bool {
        self.entries
            .get(assembly)
            .is_some_and(|types| types.values().any(|methods| methods.contains(&method)))
    }

    /// Selected methods of one type, in insertion order.
    #[must_use]
    pub fn methods_of(&self, assembly: &str, type_id: &str) -> &[MethodId] {
        self.entries
            .get(assembly)
            .and_then(|types| types.get(type_id))
            .map_or(&[], Vec::as_slice)
    }

    /// Assemblies with at least one selected method.
    pub fn assemblies(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Number of selected methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(assembly, type id, method)` for every selected method.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, MethodId)> + '_ {
        self.entries.iter().flat_map(|(assembly, types)| {
            types.iter().flat_map(move |(type_id, methods)| {
                methods
                    .iter()
                    .map(move |method| (assembly.as_str(), type_id.as_str(), *method))
            })
        })
    }
}

/// Parses every configured directive, logging and skipping invalid ones.
fn parse_directives(config: &HotfixConfig) -> Vec<Directive> {
    config
        .directives
        .iter()
        .filter_map(|line| match Directive::parse(line) {
            Ok(directive) => directive,
            Err(error) => {
                warn!(directive = %line, %error, "invalid directive ignored");
                None
            }
        })
        .collect()
}

/// Resolves the work set of `config` over the modules held by `session`.
///
/// The runtime assembly and its references are loaded into the session on the way, so they
/// can be recognized and left out.
pub fn select(session: &mut Session, config: &HotfixConfig) -> WorkSet {
    let excluded = session.dependency_closure(&config.runtime_assembly);
    let session: &Session = session;
    let candidates: Vec<&Module> = session
        .module_names()
        .iter()
        .filter(|name| !excluded.contains(name.as_str()))
        .filter_map(|name| session.get(name))
        .collect();
    debug!(
        candidates = candidates.len(),
        excluded = excluded.len(),
        "work-set candidates"
    );

    let directives = parse_directives(config);
    let mut selection = Selection {
        session,
        config,
        candidates,
        set: WorkSet::new(),
    };

    if config.attribute_scan {
        for module in selection.candidates.clone() {
            for ty in module.top_level_types() {
                selection.scan_markers(module, *ty);
            }
        }
    }
    for directive in &directives {
        if let Directive::Member {
            kind,
            type_id,
            pattern: MemberPattern::Signature(signature),
        } = directive
        {
            selection.include_member(*kind, type_id, signature);
        }
    }
    for directive in &directives {
        match directive {
            Directive::Type(type_id) => selection.include_type(type_id, false),
            Directive::Member {
                type_id,
                pattern: MemberPattern::All { forced },
                ..
            } => selection.include_type(type_id, *forced),
            _ => {}
        }
    }
    for directive in &directives {
        if let Directive::Member {
            type_id,
            pattern: MemberPattern::Regex(regex),
            ..
        } = directive
        {
            selection.include_matching(type_id, regex);
        }
    }

    if config.attribute_scan {
        for module in selection.candidates.clone() {
            for ty in module.top_level_types() {
                selection.exclude_forbidden(module, *ty);
            }
        }
    }
    for directive in &directives {
        match directive {
            Directive::ExcludeType(type_id)
            | Directive::ExcludeMember {
                type_id,
                pattern: MemberPattern::All { .. },
                ..
            } => selection.exclude_type(type_id),
            Directive::ExcludeMember {
                kind,
                type_id,
                pattern: MemberPattern::Signature(signature),
            } => selection.exclude_member(*kind, type_id, signature),
            _ => {}
        }
    }
    for directive in &directives {
        if let Directive::ExcludeMember {
            type_id,
            pattern: MemberPattern::Regex(regex),
            ..
        } = directive
        {
            selection.exclude_matching(type_id, regex);
        }
    }

    let set = selection.set;
    info!(
        methods = set.len(),
        directives = directives.len(),
        "work set selected"
    );
    set
}

struct Selection<'a> {
    session: &'a Session,
    config: &'a HotfixConfig,
    candidates: Vec<&'a Module>,
    set: WorkSet,
}

impl<'a> Selection<'a> {
    fn marker(&self, attributes: &[CustomAttribute]) -> MarkerState {
        marker_state(attributes, &self.config.marker_attribute, &self.config.forbidden_field)
    }

    /// Every candidate type with this id.
    fn types_named(&self, type_id: &str) -> Vec<(&'a Module, TypeId)> {
        let found: Vec<_> = self
            .candidates
            .iter()
            .filter_map(|module| module.find_type(type_id).map(|ty| (*module, ty)))
            .collect();
        if found.is_empty() {
            debug!(type_id, "directive target not found");
        }
        found
    }

    fn add_work(&mut self, module: &Module, ty: TypeId, method: MethodId, forced: bool) {
        let (Some(def), Some(owner)) = (module.method(method), module.type_def(ty)) else {
            return;
        };
        if !forced && !def.is_public() {
            return;
        }
        if !def.has_body() {
            return;
        }
        if def.name == ".ctor"
            && !def.is_static()
            && self
                .session
                .is_subclass_of(&module.name, ty, &self.config.framework_base_type)
        {
            return;
        }
        if self.set.insert(&module.name, &owner.id, method) {
            debug!(
                assembly = %module.name,
                type_id = %owner.id,
                method = %def.name,
                forced,
                "method selected"
            );
        }
    }

    fn add_all(&mut self, module: &Module, ty: TypeId, forced: bool) {
        for method in module.methods_of(ty) {
            self.add_work(module, ty, *method, forced);
        }
    }

    fn scan_markers(&mut self, module: &'a Module, ty: TypeId) {
        let Some(def) = module.type_def(ty) else {
            return;
        };
        if self.marker(&def.custom_attributes) == MarkerState::Included {
            for method in &def.methods {
                let forced = module
                    .method(*method)
                    .is_some_and(|m| self.marker(&m.custom_attributes) == MarkerState::Included);
                self.add_work(module, ty, *method, forced);
            }
        }
        for property in &def.properties {
            if self.marker(&property.custom_attributes) == MarkerState::Included {
                for accessor in property.accessors() {
                    self.add_work(module, ty, accessor, true);
                }
            }
        }
        for method in &def.methods {
            let included = module
                .method(*method)
                .is_some_and(|m| self.marker(&m.custom_attributes) == MarkerState::Included);
            if included {
                self.add_work(module, ty, *method, true);
            }
        }
        for nested in &def.nested {
            self.scan_markers(module, *nested);
        }
    }

    fn include_member(&mut self, kind: MemberKind, type_id: &str, signature: &str) {
        for (module, ty) in self.types_named(type_id) {
            let methods = member_methods(module, ty, kind, signature);
            if methods.is_empty() {
                debug!(type_id, %kind, signature, "directive member not found");
            }
            for method in methods {
                self.add_work(module, ty, method, true);
            }
        }
    }

    fn include_type(&mut self, type_id: &str, forced: bool) {
        for (module, ty) in self.types_named(type_id) {
            self.add_all(module, ty, forced);
        }
    }

    fn include_matching(&mut self, type_id: &str, regex: &Regex) {
        for (module, ty) in self.types_named(type_id) {
            for method in matching_methods(module, ty, regex) {
                self.add_work(module, ty, method, true);
            }
        }
    }

    fn exclude_forbidden(&mut self, module: &'a Module, ty: TypeId) {
        let Some(def) = module.type_def(ty) else {
            return;
        };
        if self.marker(&def.custom_attributes) == MarkerState::Forbidden {
            self.set.remove_type(&module.name, &def.id);
        } else {
            for property in &def.properties {
                if self.marker(&property.custom_attributes) == MarkerState::Forbidden {
                    for accessor in property.accessors() {
                        self.set.remove_method(&module.name, &def.id, accessor);
                    }
                }
            }
            for method in &def.methods {
                let forbidden = module
                    .method(*method)
                    .is_some_and(|m| self.marker(&m.custom_attributes) == MarkerState::Forbidden);
                if forbidden {
                    self.set.remove_method(&module.name, &def.id, *method);
                }
            }
        }
        for nested in &def.nested {
            self.exclude_forbidden(module, *nested);
        }
    }

    fn exclude_type(&mut self, type_id: &str) {
        for (module, ty) in self.types_named(type_id) {
            if let Some(def) = module.type_def(ty) {
                let removed = self.set.remove_type(&module.name, &def.id);
                debug!(assembly = %module.name, type_id, removed, "type excluded");
            }
        }
    }

    fn exclude_member(&mut self, kind: MemberKind, type_id: &str, signature: &str) {
        for (module, ty) in self.types_named(type_id) {
            let Some(def) = module.type_def(ty) else {
                continue;
            };
            for method in member_methods(module, ty, kind, signature) {
                self.set.remove_method(&module.name, &def.id, method);
            }
        }
    }

    fn exclude_matching(&mut self, type_id: &str, regex: &Regex) {
        for (module, ty) in self.types_named(type_id) {
            let Some(def) = module.type_def(ty) else {
                continue;
            };
            for method in matching_methods(module, ty, regex) {
                self.set.remove_method(&module.name, &def.id, method);
            }
        }
    }
}

/// Methods named by an exact member pattern: both accessors for a property, otherwise the
/// method with this canonical signature.
fn member_methods(module: &Module, ty: TypeId, kind: MemberKind, signature: &str) -> Vec<MethodId> {
    match kind {
        MemberKind::Prop => module
            .find_property(ty, signature)
            .map(|property| property.accessors())
            .unwrap_or_default(),
        MemberKind::Func | MemberKind::Ctor => module
            .find_method_by_signature(ty, signature)
            .into_iter()
            .collect(),
    }
}

fn matching_methods(module: &Module, ty: TypeId, regex: &Regex) -> Vec<MethodId> {
    module
        .methods_of(ty)
        .iter()
        .copied()
        .filter(|method| {
            module
                .method_signature(*method)
                .is_some_and(|signature| regex.is_match(&signature))
        })
        .collect()
}
