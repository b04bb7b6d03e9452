//! Reading and writing module files.

use std::{fs, io, path::Path};

use tracing::{debug, warn};

use crate::{
    file::File,
    metadata::{
        image::{decode_module, decode_symbols, encode_module, encode_symbols},
        module::Module,
    },
    Error, Result,
};

/// Reads a module image and, if present, its symbol companion.
///
/// Returns the module and whether symbols were attached. A missing or unreadable companion
/// only costs the debug information.
pub(crate) fn read_module(image: &Path, symbols: &Path) -> Result<(Module, bool)> {
    let mut module = {
        let file = File::from_file(image)?;
        decode_module(file.data())?
    };

    if !symbols.exists() {
        debug!(module = %module.name, "no symbol companion");
        return Ok((module, false));
    }
    let attached =
        File::from_file(symbols).and_then(|file| decode_symbols(&mut module, file.data()));
    match attached {
        Ok(count) => {
            debug!(module = %module.name, methods = count, "symbols attached");
            Ok((module, true))
        }
        Err(error) => {
            warn!(module = %module.name, %error, "ignoring unreadable symbol companion");
            Ok((module, false))
        }
    }
}

/// Writes a module image (and symbols, when requested and available) to temporary paths.
///
/// Returns whether a symbol companion was written. On error, partially written files are
/// removed.
pub(crate) fn write_temp(
    module: &Module,
    image: &Path,
    symbols: &Path,
    with_symbols: bool,
) -> Result<bool> {
    let result = write_files(module, image, symbols, with_symbols);
    if result.is_err() {
        let _ = fs::remove_file(image);
        let _ = fs::remove_file(symbols);
    }
    result
}

fn write_files(module: &Module, image: &Path, symbols: &Path, with_symbols: bool) -> Result<bool> {
    let bytes = encode_module(module)?;
    fs::write(image, bytes).map_err(|source| write_failed(module, source))?;

    if !with_symbols {
        return Ok(false);
    }
    match encode_symbols(module)? {
        Some(bytes) => {
            fs::write(symbols, bytes).map_err(|source| write_failed(module, source))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub(crate) fn write_failed(module: &Module, source: io::Error) -> Error {
    Error::WriteFailed {
        module: module.name.clone(),
        source,
    }
}
