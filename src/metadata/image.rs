//! Module image and debug-symbol companion codec.
//!
//! # Module image
//!
//! ```text
//! magic    "DPMI"
//! version  u16
//! reserved u16
//! digest   [u8; 20]   SHA-1 of the payload
//! length   u32
//! payload  bincode-encoded Module
//! ```
//!
//! The digest guards against truncated or partially written files. After decoding, the
//! instruction referrer index of every body is rebuilt and the module starts clean.
//!
//! # Symbol companion
//!
//! ```text
//! magic    "DPDB"
//! version  u16
//! count    u32
//! count × {
//!     method token        u32
//!     sequence points     compressed length + blob
//!     scope count         compressed uint
//!     scope × { start, end (compressed offset + 1, 0 = end of method),
//!               parent (compressed index + 1, 0 = none),
//!               variable count, variable × { slot u16, name (compressed length + UTF-8) } }
//! }
//! ```
//!
//! A missing companion is not an error: the module simply has no debug information.

use sha1::{Digest, Sha1};

use crate::{
    file::{
        io::{write_compressed_uint, write_le},
        parser::Parser,
    },
    metadata::{
        debuginfo::{InstructionOffset, LocalScope, LocalVariableName, MethodDebugInfo},
        module::Module,
        sequencepoints::{encode_sequence_points, parse_sequence_points},
        token::Token,
    },
    Result,
};

const IMAGE_MAGIC: &[u8; 4] = b"DPMI";
const SYMBOLS_MAGIC: &[u8; 4] = b"DPDB";
const FORMAT_VERSION: u16 = 1;

/// Encodes a module into an image.
///
/// # Errors
/// Returns [`crate::Error::Serialization`] if the payload cannot be encoded.
pub fn encode_module(module: &Module) -> Result<Vec<u8>> {
    let payload = bincode::serialize(module)?;
    let Ok(length) = u32::try_from(payload.len()) else {
        return Err(malformed_error!("Module payload of {} bytes is too large", payload.len()));
    };

    let mut image = Vec::with_capacity(payload.len() + 32);
    image.extend_from_slice(IMAGE_MAGIC);
    write_le(&mut image, FORMAT_VERSION);
    write_le(&mut image, 0u16);
    image.extend_from_slice(&Sha1::digest(&payload));
    write_le(&mut image, length);
    image.extend_from_slice(&payload);
    Ok(image)
}

/// Decodes a module image.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a bad magic, version or digest,
/// [`crate::Error::OutOfBounds`] for a truncated image and [`crate::Error::Serialization`] if
/// the payload does not decode.
pub fn decode_module(data: &[u8]) -> Result<Module> {
    let mut parser = Parser::new(data);
    if parser.read_bytes(4)? != IMAGE_MAGIC {
        return Err(malformed_error!("Not a module image - bad magic"));
    }
    let version = parser.read_le::<u16>()?;
    if version != FORMAT_VERSION {
        return Err(malformed_error!("Unsupported module image version {}", version));
    }
    parser.advance_by(2)?;
    let digest = parser.read_bytes(20)?;
    let length = parser.read_le::<u32>()? as usize;
    let payload = parser.read_bytes(length)?;

    if Sha1::digest(payload).as_slice() != digest {
        return Err(malformed_error!("Module image digest mismatch"));
    }

    let mut module: Module = bincode::deserialize(payload)?;
    module.reindex_bodies();
    module.clear_dirty();
    Ok(module)
}

fn write_offset(buffer: &mut Vec<u8>, offset: InstructionOffset) -> Result<()> {
    match offset {
        InstructionOffset::Offset(value) => write_compressed_uint(buffer, value + 1),
        InstructionOffset::EndOfMethod => write_compressed_uint(buffer, 0),
    }
}

fn read_offset(parser: &mut Parser<'_>) -> Result<InstructionOffset> {
    Ok(match parser.read_compressed_uint()? {
        0 => InstructionOffset::EndOfMethod,
        value => InstructionOffset::Offset(value - 1),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn write_len(buffer: &mut Vec<u8>, len: usize) -> Result<()> {
    write_compressed_uint(buffer, len as u32)
}

/// Encodes the debug information of every method into a symbol companion.
///
/// Returns `None` if no method carries debug information.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a record cannot be encoded.
pub fn encode_symbols(module: &Module) -> Result<Option<Vec<u8>>> {
    let records: Vec<_> = module
        .methods()
        .filter_map(|(_, method)| method.debug.as_ref().map(|debug| (method.token, debug)))
        .collect();
    if records.is_empty() {
        return Ok(None);
    }

    let mut out = Vec::new();
    out.extend_from_slice(SYMBOLS_MAGIC);
    write_le(&mut out, FORMAT_VERSION);
    #[allow(clippy::cast_possible_truncation)]
    write_le(&mut out, records.len() as u32);

    for (token, debug) in records {
        write_le(&mut out, token.value());

        let mut points = debug.sequence_points.clone();
        points.sort_by_key(|point| point.il_offset);
        let blob = encode_sequence_points(&points)?;
        write_len(&mut out, blob.len())?;
        out.extend_from_slice(&blob);

        write_len(&mut out, debug.scopes.len())?;
        for scope in &debug.scopes {
            write_offset(&mut out, scope.start)?;
            write_offset(&mut out, scope.end)?;
            write_len(&mut out, scope.parent.map_or(0, |parent| parent + 1))?;
            write_len(&mut out, scope.variables.len())?;
            for variable in &scope.variables {
                write_le(&mut out, variable.index);
                write_len(&mut out, variable.name.len())?;
                out.extend_from_slice(variable.name.as_bytes());
            }
        }
    }
    Ok(Some(out))
}

/// Decodes a symbol companion and attaches the records to the matching methods.
///
/// Records for tokens the module does not define are skipped. Returns the number of
/// methods that received debug information.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a bad magic or version and
/// [`crate::Error::OutOfBounds`] for truncated data.
pub fn decode_symbols(module: &mut Module, data: &[u8]) -> Result<usize> {
    let mut parser = Parser::new(data);
    if parser.read_bytes(4)? != SYMBOLS_MAGIC {
        return Err(malformed_error!("Not a symbol companion - bad magic"));
    }
    let version = parser.read_le::<u16>()?;
    if version != FORMAT_VERSION {
        return Err(malformed_error!("Unsupported symbol companion version {}", version));
    }

    let tokens: std::collections::HashMap<Token, _> = module
        .methods()
        .map(|(id, method)| (method.token, id))
        .collect();

    let count = parser.read_le::<u32>()?;
    let mut attached = 0;
    for _ in 0..count {
        let token = Token::new(parser.read_le::<u32>()?);
        let blob_len = parser.read_compressed_uint()? as usize;
        let points = parse_sequence_points(parser.read_bytes(blob_len)?)?;

        let scope_count = parser.read_compressed_uint()?;
        let mut scopes = Vec::new();
        for _ in 0..scope_count {
            let start = read_offset(&mut parser)?;
            let end = read_offset(&mut parser)?;
            let parent = match parser.read_compressed_uint()? {
                0 => None,
                value => Some(value as usize - 1),
            };
            let variable_count = parser.read_compressed_uint()?;
            let mut variables = Vec::new();
            for _ in 0..variable_count {
                let index = parser.read_le::<u16>()?;
                let name_len = parser.read_compressed_uint()? as usize;
                let name = String::from_utf8_lossy(parser.read_bytes(name_len)?).into_owned();
                variables.push(LocalVariableName { index, name });
            }
            scopes.push(LocalScope {
                start,
                end,
                parent,
                variables,
            });
        }

        if let Some(method) = tokens.get(&token).and_then(|id| module.method_mut(*id)) {
            method.debug = Some(MethodDebugInfo {
                sequence_points: points.0,
                scopes,
            });
            attached += 1;
        }
    }
    Ok(attached)
}
