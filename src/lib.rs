// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotpatch
//!
//! Hot-fix interception for .NET CIL assemblies. `dotpatch` rewrites selected method bodies
//! so that every call first offers its arguments to an external dispatch hook, and offers the
//! results again before returning. A patch loaded at runtime can then replace any intercepted
//! method without rebuilding the game or application.
//!
//! ## Features
//!
//! - **🧬 Argument packs** - generic value-type packs of every arity, synthesized on demand
//! - **🔑 Stable call-site tokens** - 64-bit tokens with deterministic, persistable collision
//!   handling
//! - **✂️ Body splicing** - pre/post hook calls, return redirection, branch legalization and
//!   debug-record repair
//! - **🎯 Work-set selection** - directives and marker attributes, with exclusion lists
//! - **💾 Safe write-back** - temp-file-then-rename sessions with optional copy-to mirroring
//! - **🧪 Verification** - an interpreter that runs rewritten bodies against the originals
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotpatch::prelude::*;
//!
//! let mut session = Session::open(SessionConfig::default());
//! session.load_all()?;
//!
//! let config = HotfixConfig::default().with_directive("type Game.Player");
//! let mut rewriter = Rewriter::new(config);
//! let report = run(&mut session, &mut rewriter);
//! for injection in &report.injected {
//!     println!("{} -> {}", injection.identity, injection.head_token);
//! }
//!
//! let closed = session.close();
//! println!("{} modules written", closed.success_count());
//! # Ok::<(), dotpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - the in-memory module model: types, methods, bodies, debug records and
//!   the on-disk image codec
//! - [`assembly`] - opcodes, the instruction model and the body emitter
//! - [`project`] - the [`project::Session`] registry with its load / close lifecycle
//! - [`hotfix`] - selection, pack synthesis, token hashing and rewriting
//! - [`emulation`] - the verification interpreter
//!
//! ## Logging
//!
//! Events are emitted through [`tracing`]; install any subscriber to see them. The crate
//! never installs one itself.
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo install cargo-fuzz
//! cargo +nightly fuzz run image --release
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```
#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use dotpatch::prelude::*;
///
/// let mut session = Session::open(SessionConfig::new("Library/ScriptAssemblies/"));
/// let module = session.load("Assembly-CSharp")?;
/// println!("{} types", module.types().count());
/// # Ok::<(), dotpatch::Error>(())
/// ```
pub mod prelude;

/// CIL instructions based on ECMA-335
///
/// - [`assembly::OpCode`] - the opcode table with stack behaviour and flow type
/// - [`assembly::Instruction`] / [`assembly::Operand`] - one instruction of a body
/// - [`assembly::Emitter`] - appends or inserts instruction sequences into a body
pub mod assembly;

/// The module model
///
/// A [`metadata::module::Module`] holds the types, methods, fields and properties of one
/// assembly. Method bodies are arenas of instructions with referrer indices
/// ([`metadata::method::MethodBody`]), so inserting and removing instructions keeps branch
/// targets, exception regions and debug records consistent.
///
/// # Examples
///
/// ```rust
/// use dotpatch::metadata::module::{Module, TypeAttributes};
///
/// let mut module = Module::new("Game");
/// let player = module.add_type("Game", "Player", TypeAttributes::PUBLIC, None);
/// assert_eq!(module.find_type("Game.Player"), Some(player));
/// ```
pub mod metadata;

/// Session lifecycle: load modules, mutate them, write them back atomically
pub mod project;

/// Hot-fix interception: work-set selection, argument packs, call-site tokens, rewriting
pub mod hotfix;

/// Interpreter for checking rewritten bodies
pub mod emulation;

/// `dotpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotpatch` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use dotpatch::{project::{Session, SessionConfig}, Error};
///
/// let mut session = Session::open(SessionConfig::default());
/// match session.load("Assembly-CSharp") {
///     Ok(module) => println!("{} methods", module.methods().count()),
///     Err(Error::ModuleNotFound(path)) => println!("no image at {}", path),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Low-level byte parsing with ECMA-335 compressed integers.
pub use file::{parser::Parser, File};
