//! Hot-fix interception.
//!
//! Rewrites selected methods so each one first offers its arguments to an external dispatch
//! hook and, when the hook declines, runs its original code and offers the results again:
//!
//! ```text
//! if (Hook(head, new ArgPack<..>(args..), out var result)) { write back result; return; }
//! original body, every `ret` branching to the post call
//! if (Hook(tail, new ArgPack<..>(ret, args..), out var result)) { write back result; }
//! return;
//! ```
//!
//! # Components
//!
//! - [`HotfixConfig`] names the runtime collaborators and carries the directives
//! - [`select`] resolves directives and marker attributes into a [`WorkSet`]
//! - [`PackSynthesizer`] creates the argument-pack type of each arity in the runtime assembly
//! - [`TokenHasher`] assigns the 64-bit call-site tokens
//! - [`Rewriter`] splices the hook calls into a method body
//! - [`run`] chains them over a [`crate::project::Session`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotpatch::prelude::*;
//!
//! let mut session = Session::open(SessionConfig::new("Library/ScriptAssemblies/"));
//! session.load("Assembly-CSharp")?;
//!
//! let config = HotfixConfig::from_file("hotfix.json")?;
//! let mut tokens = TokenHasher::new();
//! tokens.load_file("tokens.json")?;
//!
//! let mut rewriter = Rewriter::with_tokens(config, tokens);
//! let report = run(&mut session, &mut rewriter);
//! println!("{} methods intercepted", report.injected.len());
//!
//! rewriter.tokens().save_file("tokens.json")?;
//! session.close().into_result()?;
//! # Ok::<(), dotpatch::Error>(())
//! ```

mod config;
mod hash;
pub mod pack;
mod rewriter;
mod selector;

pub use config::HotfixConfig;
pub use hash::{base_hash, DesignatedTokens, TokenHasher};
pub use pack::PackSynthesizer;
pub use rewriter::{
    elide_branches_to_next, legalize_branches, ArgumentLayout, Injection, Rewriter, RETURN_SLOT,
};
pub use selector::{select, Directive, MemberKind, MemberPattern, WorkSet};

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::{
    metadata::module::{MethodId, Module},
    project::Session,
    Error,
};

/// A selected method the rewriter rejected.
#[derive(Debug)]
pub struct FailedRewrite {
    /// Assembly of the method
    pub assembly: String,
    /// Declaring type id
    pub type_id: String,
    /// The method
    pub method: MethodId,
    /// Why it was not rewritten
    pub error: Error,
}

/// Outcome of [`run`].
#[derive(Debug, Default)]
pub struct HotfixReport {
    /// Methods rewritten, in work-set order
    pub injected: Vec<Injection>,
    /// Selected methods that could not be rewritten
    pub failed: Vec<FailedRewrite>,
    /// Assemblies left alone because they already carry the injection marker
    pub skipped: Vec<String>,
}

impl HotfixReport {
    /// Returns true if every selected method was rewritten.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Assemblies that received at least one interception.
    #[must_use]
    pub fn touched_assemblies(&self) -> BTreeSet<&str> {
        self.injected.iter().map(|injection| injection.module.as_str()).collect()
    }
}

/// Selects the work set of the rewriter's configuration and rewrites every method in it.
///
/// Assemblies that already carry the injection marker are skipped as a whole. A method that
/// fails to rewrite is recorded and the run continues. Every assembly that received an
/// interception is marked injected; nothing is written until the session is closed.
pub fn run(session: &mut Session, rewriter: &mut Rewriter) -> HotfixReport {
    let config = rewriter.config().clone();
    let set = select(session, &config);
    let mut report = HotfixReport::default();

    for (assembly, type_id, method) in set.iter() {
        if report.skipped.iter().any(|skipped| skipped == assembly) {
            continue;
        }
        if session.get(assembly).is_some_and(Module::is_injected) {
            warn!(assembly, "assembly already injected, skipped");
            report.skipped.push(assembly.to_string());
            continue;
        }
        match rewriter.rewrite(session, assembly, method) {
            Ok(injection) => report.injected.push(injection),
            Err(error) => {
                warn!(assembly, type_id, method = method.index(), %error, "method not rewritten");
                report.failed.push(FailedRewrite {
                    assembly: assembly.to_string(),
                    type_id: type_id.to_string(),
                    method,
                    error,
                });
            }
        }
    }

    let touched: Vec<String> = report
        .touched_assemblies()
        .into_iter()
        .map(str::to_string)
        .collect();
    for assembly in &touched {
        if let Some(module) = session.get_mut(assembly) {
            module.mark_injected();
        }
    }

    info!(
        injected = report.injected.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "hot-fix run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{hotfix_session, GAME};

    #[test]
    fn run_marks_and_skips_injected_assemblies() {
        let mut session = hotfix_session();
        let mut rewriter = Rewriter::new(HotfixConfig::default());

        let report = run(&mut session, &mut rewriter);
        assert_eq!(report.injected.len(), 3);
        assert!(report.is_complete_success());
        assert_eq!(report.touched_assemblies().into_iter().collect::<Vec<_>>(), vec![GAME]);

        let game = session.get(GAME).unwrap();
        assert!(game.is_injected());
        assert!(game.is_dirty());
        let runtime = session.get(&rewriter.config().runtime_assembly).unwrap();
        assert!(runtime.find_type("Hotfix.ArgPack`1").is_some());
        assert!(!runtime.is_injected());

        let again = run(&mut session, &mut rewriter);
        assert!(again.injected.is_empty());
        assert_eq!(again.skipped, vec![GAME.to_string()]);
        assert!(!again.is_complete_success());
    }

    #[test]
    fn failures_are_collected() {
        let mut session = hotfix_session();
        let config = HotfixConfig::default();
        session.unload(&config.runtime_assembly).unwrap();

        let mut rewriter = Rewriter::new(config);
        let report = run(&mut session, &mut rewriter);
        assert!(report.injected.is_empty());
        assert_eq!(report.failed.len(), 3);
        assert!(report
            .failed
            .iter()
            .all(|failed| matches!(failed.error, Error::ModuleNotFound(_))));
        assert!(!session.get(GAME).unwrap().is_injected());
    }
}
