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

//! # tnbridge Telnet Protocol Codec
//!
//! Server side Telnet (RFC 854) codec used by the bridge to turn a client's byte stream into
//! clean application bytes plus terminal size reports, and to escape program output on the
//! way back.
//!
//! ## Overview
//!
//! - **Data transmission**: application bytes with IAC (Interpret As Command) escaping
//! - **Control commands**: Break, Interrupt Process, Are You There, etc.
//! - **Option negotiation**: DO, DONT, WILL, WONT handled with the RFC 1143 Q-method
//! - **Subnegotiation**: NAWS (RFC 1073) window size reports
//!
//! ## Core Components
//!
//! ### [`TelnetCodec`]
//!
//! Implements [`Encoder`](tokio_util::codec::Encoder) and [`Decoder`](tokio_util::codec::Decoder)
//! from `tokio_util::codec`. The decoder is an explicit state machine; replies to the peer's
//! negotiation requests are queued in the codec and drained with
//! [`TelnetCodec::flush_responses`].
//!
//! ### [`TelnetFrame`] and [`TelnetEvent`]
//!
//! `TelnetFrame` is what goes on the wire; `TelnetEvent` is what the decoder reports, with
//! negotiation collapsed into [`TelnetEvent::OptionStatus`].
//!
//! ### [`WindowSize`]
//!
//! Terminal dimensions carried by NAWS.
//!
//! ## Negotiation Policy
//!
//! The bridge performs `ECHO`, `SUPPRESS-GO-AHEAD` and `BINARY`, and lets the client perform
//! `BINARY`, `SUPPRESS-GO-AHEAD` and `NAWS`. Every other option is refused. See
//! [`consts::option::SUPPORT`].
//!
//! ## Malformed Input
//!
//! A single client must never be able to desynchronize the server, so the decoder never
//! returns a protocol error. Unknown commands, truncated or oversized subnegotiations are
//! logged with `tracing`, counted, and dropped.
//!
//! ## Example
//!
//! ```
//! use bytes::BytesMut;
//! use tnbridge_telnetcodec::{TelnetCodec, TelnetEvent, WindowSize, TelnetArgument};
//! use tokio_util::codec::Decoder;
//!
//! let mut codec = TelnetCodec::new();
//! let mut wire = BytesMut::from(&b"hi\xFF\xFA\x1F\x00\x64\x00\x28\xFF\xF0"[..]);
//! let mut events = Vec::new();
//! while let Some(event) = codec.decode(&mut wire).unwrap() {
//!     events.push(event);
//! }
//! assert_eq!(events[0], TelnetEvent::Data(b'h'));
//! assert_eq!(
//!     events[2],
//!     TelnetEvent::Subnegotiate(TelnetArgument::NAWSWindowSize(WindowSize::new(100, 40)))
//! );
//! ```

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

mod args;
mod codec;
pub mod consts;
mod event;
mod frame;
mod options;
mod result;

pub use self::args::{TelnetArgument, naws, naws::WindowSize};
pub use self::codec::TelnetCodec;
pub use self::event::TelnetEvent;
pub use self::frame::TelnetFrame;
pub use self::options::{TelnetOption, TelnetOptions, TelnetSide};
pub use self::result::{CodecError, CodecResult, SubnegotiationErrorKind};

#[cfg(test)]
mod tests {
    use super::{TelnetCodec, TelnetEvent, TelnetFrame, TelnetOption, consts};
    use crate::options::TelnetSide;
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    #[test]
    fn telnet_decode() {
        let mut codec = TelnetCodec::new();
        let mut input_buffer = BytesMut::from("Line\r\n");
        let expected_output = vec![
            TelnetEvent::Data(b'L'),
            TelnetEvent::Data(b'i'),
            TelnetEvent::Data(b'n'),
            TelnetEvent::Data(b'e'),
            TelnetEvent::Data(b'\r'),
            TelnetEvent::Data(b'\n'),
        ];
        let mut actual_output = Vec::new();
        while let Some(event) = codec.decode(&mut input_buffer).unwrap() {
            actual_output.push(event)
        }
        assert_eq!(expected_output, actual_output, "telnet_decode didn't match");
    }

    #[test]
    fn telnet_encode() {
        let mut codec = TelnetCodec::new();
        let input_frames = vec![
            TelnetFrame::Data(b'o'),
            TelnetFrame::Data(b'k'),
            TelnetFrame::Data(consts::IAC),
            TelnetFrame::Will(TelnetOption::Echo),
        ];
        let mut output = BytesMut::new();
        for frame in input_frames {
            codec.encode(frame, &mut output).unwrap();
        }
        assert_eq!(
            &output[..],
            &[
                b'o',
                b'k',
                consts::IAC,
                consts::IAC,
                consts::IAC,
                consts::WILL,
                consts::option::ECHO
            ]
        );
    }

    #[test]
    fn telnet_negotiation_event() {
        let mut codec = TelnetCodec::new();
        let mut input = BytesMut::from(&[consts::IAC, consts::WILL, consts::option::NAWS][..]);
        assert_eq!(
            codec.decode(&mut input).unwrap(),
            Some(TelnetEvent::OptionStatus(
                TelnetOption::NAWS,
                TelnetSide::Remote,
                true
            ))
        );
    }
}
