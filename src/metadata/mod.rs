//! The binary module model.
//!
//! # Key Components
//!
//! - [`module`] - [`module::Module`] with its type and method arenas and lookups
//! - [`method`] - method definitions and the editable [`method::MethodBody`]
//! - [`signatures`] - type and member reference signatures
//! - [`identity`] - canonical type-id and method-signature strings
//! - [`customattributes`] - attributes and the marker capability query
//! - [`debuginfo`], [`sequencepoints`] - debug records and their instruction anchors
//! - [`image`] - the on-disk codec for modules and their symbol companions
//! - [`token`] - metadata tokens

pub mod customattributes;
pub mod debuginfo;
pub mod identity;
pub mod image;
pub mod method;
pub mod module;
pub mod sequencepoints;
pub mod signatures;
pub mod token;
