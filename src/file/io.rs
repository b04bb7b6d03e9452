//! Low-level byte order helpers shared by the image reader and writer.
//!
//! [`CilIO`] abstracts over the primitive integer types that appear in module images and
//! debug-symbol companions. The free functions read and write those primitives in
//! little-endian order and implement the ECMA-335 II.23.2 compressed integer encoding
//! used by sequence point blobs.

use crate::Result;

/// Trait for primitive types that can be read from and written to a byte buffer.
pub trait CilIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]> + AsRef<[u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $n:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $n];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order from a data buffer at a
/// specific offset, advancing the offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes remaining.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset
        .checked_add(type_len)
        .ok_or_else(|| out_of_bounds_error!())?;
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Appends `value` in little-endian order to `buffer`.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Appends an ECMA-335 compressed unsigned integer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` exceeds `0x1FFF_FFFF`, the largest value
/// the encoding can represent.
pub fn write_compressed_uint(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    if value < 0x80 {
        buffer.push(value as u8);
    } else if value < 0x4000 {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    } else if value < 0x2000_0000 {
        buffer.push(0xC0 | (value >> 24) as u8);
        buffer.push((value >> 16) as u8);
        buffer.push((value >> 8) as u8);
        buffer.push(value as u8);
    } else {
        return Err(malformed_error!("Value too large for compressed uint - {}", value));
    }
    Ok(())
}

/// Appends a compressed signed integer, the inverse of
/// [`crate::file::parser::Parser::read_compressed_int`].
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the magnitude cannot be represented.
pub fn write_compressed_int(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    #[allow(clippy::cast_sign_loss)]
    let unsigned = if value >= 0 {
        (value as u32) << 1
    } else {
        ((-(i64::from(value)) - 1) as u32) << 1 | 1
    };
    write_compressed_uint(buffer, unsigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::parser::Parser;

    #[test]
    fn read_le_at_advances() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF];
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x0201);
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 0x0403);
        assert_eq!(offset, 4);
        assert!(read_le_at::<u32>(&data, &mut offset).is_err());
        assert_eq!(offset, 4);
    }

    #[test]
    fn compressed_uint_boundaries() {
        for value in [0u32, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            let mut buffer = Vec::new();
            write_compressed_uint(&mut buffer, value).unwrap();
            let mut parser = Parser::new(&buffer);
            assert_eq!(parser.read_compressed_uint().unwrap(), value);
            assert!(!parser.has_more_data());
        }

        let mut buffer = Vec::new();
        assert!(write_compressed_uint(&mut buffer, 0x2000_0000).is_err());
    }

    #[test]
    fn compressed_int_signs() {
        let mut buffer = Vec::new();
        write_compressed_int(&mut buffer, 10).unwrap();
        write_compressed_int(&mut buffer, -5).unwrap();
        assert_eq!(buffer, vec![20, 9]);
    }
}
