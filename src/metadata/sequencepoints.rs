//! Sequence point blobs mapping IL offsets to source locations.
//!
//! The debug-symbol companion stores each method's sequence points in a delta-compressed
//! layout modelled on PortablePDB: the first record carries absolute values, every following
//! record carries deltas against its predecessor. Spans store the line delta unsigned and the
//! column delta unsigned for single-line spans, signed otherwise. [`parse_sequence_points`]
//! reads that layout and [`encode_sequence_points`] produces it again after a rewrite has
//! moved the offsets.
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::metadata::sequencepoints::{
//!     encode_sequence_points, parse_sequence_points, SequencePoint,
//! };
//!
//! let points = vec![SequencePoint::new(0, 10, 2, 10, 7), SequencePoint::new(6, 11, 3, 11, 5)];
//! let blob = encode_sequence_points(&points)?;
//! assert_eq!(parse_sequence_points(&blob)?.0, points);
//! # Ok::<(), dotpatch::Error>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    file::{
        io::{write_compressed_int, write_compressed_uint},
        parser::Parser,
    },
    Result,
};

/// Line number marking a hidden sequence point.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// Represents a single sequence point mapping IL offset to source code location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePoint {
    /// Offset in the method's IL stream.
    pub il_offset: u32,
    /// Starting line in the source file.
    pub start_line: u32,
    /// Starting column in the source file.
    pub start_col: u16,
    /// Ending line in the source file.
    pub end_line: u32,
    /// Ending column in the source file.
    pub end_col: u16,
    /// True if this is a hidden sequence point (start_line == 0xFEEFEE).
    pub is_hidden: bool,
}

impl SequencePoint {
    /// Creates a visible sequence point.
    #[must_use]
    pub fn new(
        il_offset: u32,
        start_line: u32,
        start_col: u16,
        end_line: u32,
        end_col: u16,
    ) -> Self {
        SequencePoint {
            il_offset,
            start_line,
            start_col,
            end_line,
            end_col,
            is_hidden: start_line == HIDDEN_LINE,
        }
    }

    /// Creates a hidden sequence point at `il_offset`.
    #[must_use]
    pub fn hidden(il_offset: u32) -> Self {
        SequencePoint::new(il_offset, HIDDEN_LINE, 0, HIDDEN_LINE, 0)
    }
}

/// Collection of sequence points for a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequencePoints(pub Vec<SequencePoint>);

impl SequencePoints {
    /// Returns the sequence point for a given IL offset, if any.
    #[must_use]
    pub fn find_by_il_offset(&self, il_offset: u32) -> Option<&SequencePoint> {
        self.0.iter().find(|sp| sp.il_offset == il_offset)
    }
}

/// Parses a sequence points blob into a [`SequencePoints`] collection.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated blobs and [`crate::Error::Malformed`]
/// for invalid compressed integers.
pub fn parse_sequence_points(blob: &[u8]) -> Result<SequencePoints> {
    let mut parser = Parser::new(blob);
    let mut points = Vec::new();
    let mut il_offset = 0u32;
    let mut start_line = 0u32;
    let mut start_col = 0u16;
    let mut first = true;

    while parser.has_more_data() {
        let il_offset_delta = parser.read_compressed_uint()?;
        il_offset = if first {
            il_offset_delta
        } else {
            il_offset.wrapping_add(il_offset_delta)
        };

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        if first {
            start_line = parser.read_compressed_uint()?;
            start_col = parser.read_compressed_uint()? as u16;
        } else {
            start_line = start_line.wrapping_add(parser.read_compressed_int()? as u32);
            start_col = start_col.wrapping_add(parser.read_compressed_int()? as u16);
        }

        let line_span = parser.read_compressed_uint()?;
        let end_line = start_line.wrapping_add(line_span);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let end_col = if line_span == 0 {
            start_col.wrapping_add(parser.read_compressed_uint()? as u16)
        } else {
            start_col.wrapping_add(parser.read_compressed_int()? as u16)
        };

        points.push(SequencePoint {
            il_offset,
            start_line,
            start_col,
            end_line,
            end_col,
            is_hidden: start_line == HIDDEN_LINE,
        });
        first = false;
    }
    Ok(SequencePoints(points))
}

/// Encodes sequence points into the delta-compressed blob layout.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the offsets are not ascending, a span ends before it
/// starts, or a value exceeds the compressed integer range.
pub fn encode_sequence_points(points: &[SequencePoint]) -> Result<Vec<u8>> {
    let mut blob = Vec::with_capacity(points.len() * 5);
    let mut previous: Option<&SequencePoint> = None;

    for point in points {
        let end_line_delta = point.end_line.checked_sub(point.start_line);
        let end_col_delta = point.end_col.checked_sub(point.start_col);
        if end_line_delta.is_none() || (end_line_delta == Some(0) && end_col_delta.is_none()) {
            return Err(malformed_error!(
                "Sequence point at IL_{:04X} ends before it starts",
                point.il_offset
            ));
        }
        let end_line_delta = end_line_delta.unwrap_or_default();

        match previous {
            None => {
                write_compressed_uint(&mut blob, point.il_offset)?;
                write_compressed_uint(&mut blob, point.start_line)?;
                write_compressed_uint(&mut blob, u32::from(point.start_col))?;
            }
            Some(prev) => {
                let Some(offset_delta) = point.il_offset.checked_sub(prev.il_offset) else {
                    return Err(malformed_error!(
                        "Sequence point offsets are not ascending - IL_{:04X} after IL_{:04X}",
                        point.il_offset,
                        prev.il_offset
                    ));
                };
                write_compressed_uint(&mut blob, offset_delta)?;

                #[allow(clippy::cast_possible_wrap)]
                let line_delta = point.start_line.wrapping_sub(prev.start_line) as i32;
                write_compressed_int(&mut blob, line_delta)?;
                write_compressed_int(
                    &mut blob,
                    i32::from(point.start_col) - i32::from(prev.start_col),
                )?;
            }
        }

        write_compressed_uint(&mut blob, end_line_delta)?;
        match end_col_delta {
            Some(delta) if end_line_delta == 0 => {
                write_compressed_uint(&mut blob, u32::from(delta))?;
            }
            _ => write_compressed_int(
                &mut blob,
                i32::from(point.end_col) - i32::from(point.start_col),
            )?,
        }
        previous = Some(point);
    }

    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_blob() {
        let result = parse_sequence_points(&[]).unwrap();
        assert!(result.0.is_empty());
    }

    #[test]
    fn parse_multiple_points_with_deltas() {
        let blob: &[u8] = &[1, 10, 2, 0, 5, 4, 2, 2, 0, 2];
        let result = parse_sequence_points(blob).unwrap();
        assert_eq!(result.0.len(), 2);
        assert_eq!(result.0[0], SequencePoint::new(1, 10, 2, 10, 7));
        assert_eq!(result.0[1], SequencePoint::new(5, 11, 3, 11, 5));
        assert!(result.find_by_il_offset(5).is_some());
        assert!(result.find_by_il_offset(2).is_none());
    }

    #[test]
    fn encode_matches_known_blob() {
        let points = vec![
            SequencePoint::new(1, 10, 2, 10, 7),
            SequencePoint::new(5, 11, 3, 11, 5),
        ];
        let blob = encode_sequence_points(&points).unwrap();
        assert_eq!(blob, vec![1, 10, 2, 0, 5, 4, 2, 2, 0, 2]);
    }

    #[test]
    fn hidden_points_survive_encoding() {
        let points = vec![
            SequencePoint::new(0, 42, 9, 42, 20),
            SequencePoint::hidden(12),
            SequencePoint::new(30, 40, 5, 41, 6),
        ];
        let blob = encode_sequence_points(&points).unwrap();
        let parsed = parse_sequence_points(&blob).unwrap();
        assert_eq!(parsed.0, points);
        assert!(parsed.0[1].is_hidden);
    }

    #[test]
    fn multi_line_span_may_end_left_of_start() {
        let points = vec![SequencePoint::new(0, 7, 30, 9, 4)];
        let parsed = parse_sequence_points(&encode_sequence_points(&points).unwrap()).unwrap();
        assert_eq!(parsed.0, points);
    }

    #[test]
    fn encode_rejects_descending_offsets() {
        let points = vec![
            SequencePoint::new(8, 1, 1, 1, 2),
            SequencePoint::new(4, 2, 1, 2, 2),
        ];
        assert!(matches!(
            encode_sequence_points(&points),
            Err(crate::Error::Malformed { .. })
        ));
    }
}
