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

use crate::TelnetOption;
use crate::args::naws::WindowSize;
use crate::result::CodecResult;
use bytes::{BufMut, BytesMut};
use std::fmt::Formatter;

pub mod naws;

///
/// Telnet Subnegotiation Argument
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetArgument {
    /// A subnegotiation for the window size, in characters.
    NAWSWindowSize(WindowSize),
    /// A subnegotiation for an option without a dedicated parser. The payload is unescaped.
    Unknown(TelnetOption, BytesMut),
}

impl TelnetArgument {
    /// Returns the payload length of this `TelnetArgument` before IAC escaping.
    pub fn len(&self) -> usize {
        match self {
            TelnetArgument::NAWSWindowSize(inner) => inner.len(),
            TelnetArgument::Unknown(_option, inner) => inner.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes this `TelnetArgument` to a `BufMut` buffer, escaping IAC bytes.
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use tnbridge_telnetcodec::{TelnetArgument, WindowSize};
    ///
    /// let arg = TelnetArgument::NAWSWindowSize(WindowSize::new(80, 24));
    /// let mut buffer = BytesMut::new();
    /// let written = arg.encode(&mut buffer)?;
    /// assert_eq!(written, 4);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn encode<T: BufMut>(&self, dst: &mut T) -> CodecResult<usize> {
        Ok(self.write(&mut dst.writer())?)
    }

    /// Writes this `TelnetArgument` to a `std::io::Write` writer, escaping IAC bytes.
    pub fn write<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        match self {
            TelnetArgument::NAWSWindowSize(inner) => inner.write(writer),
            TelnetArgument::Unknown(_option, payload) => {
                let mut written = 0;
                for &byte in payload.iter() {
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
        }
    }

    /// Returns the unescaped payload bytes.
    pub fn to_payload(&self) -> BytesMut {
        match self {
            TelnetArgument::NAWSWindowSize(inner) => {
                let mut payload = BytesMut::with_capacity(4);
                payload.put_u16(inner.cols);
                payload.put_u16(inner.rows);
                payload
            }
            TelnetArgument::Unknown(_option, payload) => payload.clone(),
        }
    }

    /// Returns the `TelnetOption` associated with this argument.
    pub fn option(&self) -> TelnetOption {
        match self {
            TelnetArgument::NAWSWindowSize(_) => TelnetOption::NAWS,
            TelnetArgument::Unknown(option, _) => *option,
        }
    }
}

impl std::fmt::Display for TelnetArgument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetArgument::NAWSWindowSize(v) => write!(f, "NAWS({v})"),
            TelnetArgument::Unknown(o, v) => write!(f, "{o}-{v:?}"),
        }
    }
}
