//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Negotiate About Window Size ([RFC1073](https://tools.ietf.org/html/rfc1073))
//!

use crate::result::{CodecError, CodecResult, SubnegotiationErrorKind};
use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, BufMut};

/// Terminal dimensions in character cells.
///
/// On the wire the NAWS payload is four bytes: columns then rows, each a big-endian `u16`.
/// A zero in either field means the client does not know that dimension.
///
/// # Example
/// ```
/// use tnbridge_telnetcodec::WindowSize;
///
/// let size = WindowSize::new(80, 24);
/// assert_eq!(size.cols, 80);
/// assert_eq!(size.rows, 24);
/// assert_eq!(size.to_string(), "80x24");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowSize {
    /// The number of columns (characters) in the terminal window
    pub cols: u16,
    /// The number of rows (lines) in the terminal window
    pub rows: u16,
}

impl WindowSize {
    /// Creates a new `WindowSize` with the specified columns and rows.
    pub fn new(cols: u16, rows: u16) -> Self {
        WindowSize { cols, rows }
    }

    /// Returns the encoded length of this `WindowSize` in bytes, before IAC escaping.
    pub fn len(&self) -> usize {
        4
    }

    /// Returns `true` when neither dimension is known.
    pub fn is_empty(&self) -> bool {
        self.cols == 0 && self.rows == 0
    }

    /// Replaces unknown (zero) dimensions with those of `fallback`.
    ///
    /// ```
    /// use tnbridge_telnetcodec::WindowSize;
    ///
    /// let size = WindowSize::new(132, 0).or(WindowSize::default());
    /// assert_eq!(size, WindowSize::new(132, 24));
    /// ```
    pub fn or(self, fallback: WindowSize) -> WindowSize {
        WindowSize {
            cols: if self.cols == 0 { fallback.cols } else { self.cols },
            rows: if self.rows == 0 { fallback.rows } else { self.rows },
        }
    }

    /// Encodes this `WindowSize` into a byte buffer using big-endian format.
    pub fn encode<T: BufMut>(&self, dst: &mut T) -> CodecResult<usize> {
        Ok(self.write(&mut dst.writer())?)
    }

    /// Writes this `WindowSize` to a writer, escaping any `0xFF` byte as the protocol requires.
    pub fn write<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut raw = Vec::with_capacity(4);
        raw.write_u16::<BigEndian>(self.cols)?;
        raw.write_u16::<BigEndian>(self.rows)?;
        let mut written = 0;
        for byte in raw {
            if byte == crate::consts::IAC {
                writer.write_all(&[crate::consts::IAC, crate::consts::IAC])?;
                written += 2;
            } else {
                writer.write_all(&[byte])?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Decodes a `WindowSize` from an already IAC-unescaped NAWS payload.
    ///
    /// # Errors
    /// Returns `CodecError::SubnegotiationError` when the payload is not exactly four bytes.
    pub fn decode<T: Buf>(src: &mut T) -> CodecResult<WindowSize> {
        // NAWS format: WIDTH-HIGH WIDTH-LOW HEIGHT-HIGH HEIGHT-LOW
        match src.remaining() {
            4 => Ok(WindowSize {
                cols: src.get_u16(),
                rows: src.get_u16(),
            }),
            n if n < 4 => Err(CodecError::SubnegotiationError {
                option: Some(crate::consts::option::NAWS),
                reason: SubnegotiationErrorKind::InsufficientData {
                    required: 4,
                    available: n,
                },
            }),
            n => Err(CodecError::SubnegotiationError {
                option: Some(crate::consts::option::NAWS),
                reason: SubnegotiationErrorKind::UnexpectedData {
                    expected: 4,
                    received: n,
                },
            }),
        }
    }
}

impl Default for WindowSize {
    /// The traditional 80x24 terminal, used when the client never reports a size.
    fn default() -> Self {
        WindowSize { cols: 80, rows: 24 }
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn decode_standard_size() {
        let mut buf = BytesMut::from(&[0x00, 0x50, 0x00, 0x18][..]);
        assert_eq!(WindowSize::decode(&mut buf).unwrap(), WindowSize::new(80, 24));
    }

    #[test]
    fn decode_short_payload_fails() {
        let mut buf = BytesMut::from(&[0x00, 0x50, 0x00][..]);
        let err = WindowSize::decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            CodecError::SubnegotiationError {
                reason: SubnegotiationErrorKind::InsufficientData { available: 3, .. },
                ..
            }
        ));
    }

    #[test]
    fn decode_long_payload_fails() {
        let mut buf = BytesMut::from(&[0x00, 0x50, 0x00, 0x18, 0x00][..]);
        assert!(WindowSize::decode(&mut buf).is_err());
    }

    #[test]
    fn write_escapes_iac() {
        let mut out = Vec::new();
        let written = WindowSize::new(0x00FF, 0x0018).write(&mut out).unwrap();
        assert_eq!(written, 5);
        assert_eq!(out, vec![0x00, 0xFF, 0xFF, 0x00, 0x18]);
    }

    #[test]
    fn zero_dimensions_fall_back() {
        let size = WindowSize::new(0, 0);
        assert!(size.is_empty());
        assert_eq!(size.or(WindowSize::new(100, 40)), WindowSize::new(100, 40));
    }
}
