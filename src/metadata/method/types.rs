//! Method and parameter attribute flags.
//!
//! # Key Types
//! - [`MethodAttributes`]: access, static/virtual and naming flags of a method (§II.23.1.10)
//! - [`ParamAttributes`]: `in`/`out`/optional markers of a parameter (§II.23.1.13)
//! - [`MethodAccess`]: decoded member access level

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Bitmask for access level extraction
pub const METHOD_ACCESS_MASK: u16 = 0x0007;

bitflags! {
    /// Method attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MethodAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method may not be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check name encoding
        const RTSPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
    }
}

/// Decoded member access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodAccess {
    /// Member not referenceable
    CompilerControlled,
    /// `private`
    Private,
    /// `private protected`
    FamAndAssem,
    /// `internal`
    Assembly,
    /// `protected`
    Family,
    /// `protected internal`
    FamOrAssem,
    /// `public`
    Public,
}

impl MethodAttributes {
    /// Decodes the access level bits.
    #[must_use]
    pub fn access(&self) -> MethodAccess {
        match self.bits() & METHOD_ACCESS_MASK {
            0x1 => MethodAccess::Private,
            0x2 => MethodAccess::FamAndAssem,
            0x3 => MethodAccess::Assembly,
            0x4 => MethodAccess::Family,
            0x5 => MethodAccess::FamOrAssem,
            0x6 => MethodAccess::Public,
            _ => MethodAccess::CompilerControlled,
        }
    }
}

bitflags! {
    /// Parameter attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ParamAttributes: u16 {
        /// Param is \[In\]
        const IN = 0x0001;
        /// Param is \[out\]
        const OUT = 0x0002;
        /// Param is optional
        const OPTIONAL = 0x0010;
        /// Param has default value
        const HAS_DEFAULT = 0x1000;
    }
}
