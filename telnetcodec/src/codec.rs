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

use super::{CodecError, TelnetEvent, TelnetFrame, TelnetOption, consts};
use crate::args::TelnetArgument;
use crate::args::naws::WindowSize;
use crate::options::{TelnetOptions, TelnetSide};
use crate::result::{CodecResult, SubnegotiationErrorKind};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

/// Options the bridge offers to perform as soon as a client connects.
const OFFER_LOCAL: [TelnetOption; 3] = [
    TelnetOption::Echo,
    TelnetOption::SuppressGoAhead,
    TelnetOption::TransmitBinary,
];

/// Options the bridge asks the client to perform as soon as it connects.
const REQUEST_REMOTE: [TelnetOption; 3] = [
    TelnetOption::TransmitBinary,
    TelnetOption::SuppressGoAhead,
    TelnetOption::NAWS,
];

/// A codec for the server side of a Telnet connection.
///
/// Decoding strips every protocol sequence out of the byte stream and yields the remaining
/// application bytes one [`TelnetEvent::Data`] at a time, interleaved with command,
/// negotiation and subnegotiation events. Option negotiation is answered automatically using
/// the fixed policy in [`consts::option::SUPPORT`]; the answers are queued inside the codec
/// and must be written out by whoever owns the socket (see [`TelnetCodec::flush_responses`]).
///
/// Malformed input never fails the decoder. It is logged, counted in
/// [`TelnetCodec::protocol_errors`], and the decoder resynchronizes.
pub struct TelnetCodec {
    decoder_buffer: BytesMut,
    decoder_state: DecoderState,
    options: TelnetOptions,
    responses: BytesMut,
    window_size: Option<WindowSize>,
    protocol_errors: u64,
}

impl TelnetCodec {
    /// Creates a new instance of `TelnetCodec`.
    ///
    /// # Example
    /// ```
    /// use tnbridge_telnetcodec::TelnetCodec;
    ///
    /// let codec = TelnetCodec::new();
    /// assert!(codec.window_size().is_none());
    /// ```
    pub fn new() -> TelnetCodec {
        TelnetCodec::default()
    }

    /// Checks if we support the given option locally
    pub fn is_supported_local(&self, option: TelnetOption) -> bool {
        self.options.is_supported_local(option)
    }

    /// Checks if we support the given option remotely
    pub fn is_supported_remote(&self, option: TelnetOption) -> bool {
        self.options.is_supported_remote(option)
    }

    /// Checks if a specific Telnet option is enabled locally.
    pub fn is_enabled_local(&self, option: TelnetOption) -> bool {
        self.options.local_enabled(option)
    }

    /// Checks if a specific Telnet option is enabled on the remote side.
    pub fn is_enabled_remote(&self, option: TelnetOption) -> bool {
        self.options.remote_enabled(option)
    }

    /// Returns `true` while an answer for `option` is still outstanding.
    pub fn is_negotiating(&self, option: TelnetOption) -> bool {
        self.options.is_pending(option)
    }

    /// Request to enable a Telnet option locally (we will send WILL).
    ///
    /// Returns the frame to send, or `None` when no negotiation is needed.
    pub fn enable_local(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.options.enable_local(option)
    }

    /// Request to disable a Telnet option locally (we will send WONT).
    pub fn disable_local(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.options.disable_local(option)
    }

    /// Request the remote side enable a Telnet option (we will send DO).
    pub fn enable_remote(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.options.enable_remote(option)
    }

    /// Request the remote side disable a Telnet option (we will send DONT).
    pub fn disable_remote(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.options.disable_remote(option)
    }

    /// Queues the bridge's opening offers: `WILL ECHO`, `WILL SGA`, `WILL BINARY`,
    /// `DO BINARY`, `DO SGA` and `DO NAWS`.
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use tnbridge_telnetcodec::TelnetCodec;
    ///
    /// let mut codec = TelnetCodec::new();
    /// codec.begin_negotiation();
    /// let mut out = BytesMut::new();
    /// codec.flush_responses(&mut out).unwrap();
    /// assert_eq!(out.len(), 18);
    /// ```
    pub fn begin_negotiation(&mut self) {
        for option in OFFER_LOCAL {
            if let Some(frame) = self.options.enable_local(option) {
                self.queue_frame(&frame);
            }
        }
        for option in REQUEST_REMOTE {
            if let Some(frame) = self.options.enable_remote(option) {
                self.queue_frame(&frame);
            }
        }
    }

    /// Returns `true` while any option the bridge asked for is still unanswered.
    pub fn negotiation_pending(&self) -> bool {
        OFFER_LOCAL
            .iter()
            .chain(REQUEST_REMOTE.iter())
            .any(|option| self.options.is_pending(*option))
    }

    /// Most recent window size reported by the client, if it ever sent one.
    pub fn window_size(&self) -> Option<WindowSize> {
        self.window_size
    }

    /// Number of malformed sequences dropped so far.
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    /// Check if there are negotiation replies waiting to be written.
    pub fn has_pending_responses(&self) -> bool {
        !self.responses.is_empty()
    }

    /// Moves all queued negotiation replies into `dst`.
    pub fn flush_responses(&mut self, dst: &mut BytesMut) -> CodecResult<()> {
        dst.reserve(self.responses.len());
        dst.put(self.responses.split());
        Ok(())
    }

    /// Appends `data` to `dst`, doubling every IAC byte.
    pub fn escape_into(data: &[u8], dst: &mut BytesMut) {
        dst.reserve(data.len() + data.len() / 16);
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|b| *b == consts::IAC) {
            dst.put_slice(&rest[..=pos]);
            dst.put_u8(consts::IAC);
            rest = &rest[pos + 1..];
        }
        dst.put_slice(rest);
    }

    fn queue_frame(&mut self, frame: &TelnetFrame) {
        trace!(%frame, "Queueing negotiation reply");
        put_frame(frame, &mut self.responses);
    }

    fn protocol_error(&mut self, error: CodecError) {
        self.protocol_errors += 1;
        warn!(%error, "Dropping malformed telnet sequence");
    }

    /// Runs a received negotiation through the Q-method and reports a change of state.
    fn negotiate(&mut self, frame: TelnetFrame) -> CodecResult<Option<TelnetEvent>> {
        let (option, side) = match frame {
            TelnetFrame::Do(option) | TelnetFrame::Dont(option) => (option, TelnetSide::Local),
            TelnetFrame::Will(option) | TelnetFrame::Wont(option) => (option, TelnetSide::Remote),
            _ => return Ok(None),
        };
        let enabled = |options: &TelnetOptions| match side {
            TelnetSide::Local => options.local_enabled(option),
            TelnetSide::Remote => options.remote_enabled(option),
        };
        let was_enabled = enabled(&self.options);
        debug!(%frame, "Received negotiation");
        if let Some(reply) = self.options.handle_received(frame)? {
            self.queue_frame(&reply);
        }
        let is_enabled = enabled(&self.options);
        if was_enabled != is_enabled {
            return Ok(Some(TelnetEvent::OptionStatus(option, side, is_enabled)));
        }
        Ok(None)
    }

    fn finish_subnegotiation(&mut self, option: u8) -> Option<TelnetEvent> {
        let mut payload = self.decoder_buffer.split();
        let option = TelnetOption::from_u8(option);
        match option {
            TelnetOption::NAWS => match WindowSize::decode(&mut payload) {
                Ok(size) => {
                    debug!(%size, "Client reported window size");
                    self.window_size = Some(size);
                    Some(TelnetEvent::Subnegotiate(TelnetArgument::NAWSWindowSize(
                        size,
                    )))
                }
                Err(error) => {
                    self.protocol_error(error);
                    None
                }
            },
            _ => Some(TelnetEvent::Subnegotiate(TelnetArgument::Unknown(
                option, payload,
            ))),
        }
    }

    fn push_subnegotiation_byte(&mut self, option: u8, byte: u8) {
        if self.decoder_buffer.len() >= consts::MAX_SUBNEGOTIATION_LEN {
            self.decoder_buffer.clear();
            self.decoder_state = DecoderState::SubnegotiateDiscard;
            self.protocol_error(CodecError::SubnegotiationError {
                option: Some(option),
                reason: SubnegotiationErrorKind::PayloadTooLong {
                    limit: consts::MAX_SUBNEGOTIATION_LEN,
                },
            });
        } else {
            self.decoder_state = DecoderState::SubnegotiateArgument(option);
            self.decoder_buffer.put_u8(byte);
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        TelnetCodec {
            decoder_buffer: BytesMut::new(),
            decoder_state: DecoderState::NormalData,
            options: TelnetOptions::default(),
            responses: BytesMut::new(),
            window_size: None,
            protocol_errors: 0,
        }
    }
}

impl std::fmt::Debug for TelnetCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnetCodec")
            .field("decoder_state", &self.decoder_state)
            .field("window_size", &self.window_size)
            .field("pending_responses", &self.responses.len())
            .field("protocol_errors", &self.protocol_errors)
            .finish()
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = CodecError;

    /// Decodes the next event from `src`, one byte at a time.
    ///
    /// Returns `Ok(None)` once `src` is exhausted; a partially received sequence is kept in
    /// the decoder state and completed by a later call. Negotiations that do not change an
    /// option's state produce no event, only a queued reply.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetEvent>, Self::Error> {
        while src.remaining() > 0 {
            let byte = src.get_u8();
            match (self.decoder_state, byte) {
                (DecoderState::NormalData | DecoderState::CarriageReturn, consts::IAC) => {
                    self.decoder_state = DecoderState::InterpretAsCommand;
                }
                (DecoderState::NormalData | DecoderState::CarriageReturn, consts::CR) => {
                    self.decoder_state = DecoderState::CarriageReturn;
                    return Ok(Some(TelnetEvent::Data(byte)));
                }
                (DecoderState::CarriageReturn, consts::NUL)
                    if !self.options.remote_enabled(TelnetOption::TransmitBinary) =>
                {
                    // CR NUL is a bare carriage return on a NVT.
                    self.decoder_state = DecoderState::NormalData;
                }
                (DecoderState::NormalData | DecoderState::CarriageReturn, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Data(byte)));
                }
                (DecoderState::InterpretAsCommand, consts::IAC) => {
                    self.decoder_state = DecoderState::NormalData;
                    return Ok(Some(TelnetEvent::Data(consts::IAC)));
                }
                (DecoderState::InterpretAsCommand, consts::DO) => {
                    self.decoder_state = DecoderState::NegotiateDo;
                }
                (DecoderState::InterpretAsCommand, consts::DONT) => {
                    self.decoder_state = DecoderState::NegotiateDont;
                }
                (DecoderState::InterpretAsCommand, consts::WILL) => {
                    self.decoder_state = DecoderState::NegotiateWill;
                }
                (DecoderState::InterpretAsCommand, consts::WONT) => {
                    self.decoder_state = DecoderState::NegotiateWont;
                }
                (DecoderState::InterpretAsCommand, consts::SB) => {
                    self.decoder_state = DecoderState::Subnegotiate;
                }
                (DecoderState::InterpretAsCommand, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    if let Some(event) = TelnetEvent::from_command(byte) {
                        return Ok(Some(event));
                    }
                    self.protocol_error(CodecError::UnknownCommand(byte));
                    return Ok(Some(TelnetEvent::NoOperation));
                }
                (DecoderState::NegotiateDo, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    if let Some(event) = self.negotiate(TelnetFrame::Do(byte.into()))? {
                        return Ok(Some(event));
                    }
                }
                (DecoderState::NegotiateDont, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    if let Some(event) = self.negotiate(TelnetFrame::Dont(byte.into()))? {
                        return Ok(Some(event));
                    }
                }
                (DecoderState::NegotiateWill, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    if let Some(event) = self.negotiate(TelnetFrame::Will(byte.into()))? {
                        return Ok(Some(event));
                    }
                }
                (DecoderState::NegotiateWont, _) => {
                    self.decoder_state = DecoderState::NormalData;
                    if let Some(event) = self.negotiate(TelnetFrame::Wont(byte.into()))? {
                        return Ok(Some(event));
                    }
                }
                (DecoderState::Subnegotiate, _) => {
                    self.decoder_buffer.clear();
                    self.decoder_state = DecoderState::SubnegotiateArgument(byte);
                }
                (DecoderState::SubnegotiateArgument(option), consts::IAC) => {
                    self.decoder_state = DecoderState::SubnegotiateArgumentIAC(option);
                }
                (DecoderState::SubnegotiateArgument(option), _) => {
                    self.push_subnegotiation_byte(option, byte);
                }
                (DecoderState::SubnegotiateArgumentIAC(option), consts::IAC) => {
                    self.push_subnegotiation_byte(option, consts::IAC);
                }
                (DecoderState::SubnegotiateArgumentIAC(option), consts::SE) => {
                    self.decoder_state = DecoderState::NormalData;
                    if let Some(event) = self.finish_subnegotiation(option) {
                        return Ok(Some(event));
                    }
                }
                (DecoderState::SubnegotiateArgumentIAC(option), _) => {
                    self.decoder_state = DecoderState::NormalData;
                    self.decoder_buffer.clear();
                    self.protocol_error(CodecError::SubnegotiationError {
                        option: Some(option),
                        reason: SubnegotiationErrorKind::InvalidCommand { command: byte },
                    });
                    return Ok(Some(TelnetEvent::NoOperation));
                }
                (DecoderState::SubnegotiateDiscard, consts::IAC) => {
                    self.decoder_state = DecoderState::SubnegotiateDiscardIAC;
                }
                (DecoderState::SubnegotiateDiscard, _) => {}
                (DecoderState::SubnegotiateDiscardIAC, consts::SE) => {
                    self.decoder_state = DecoderState::NormalData;
                }
                (DecoderState::SubnegotiateDiscardIAC, _) => {
                    self.decoder_state = DecoderState::SubnegotiateDiscard;
                }
            }
        }
        Ok(None)
    }
}

/// Writes the wire form of `frame` into `dst`.
fn put_frame(frame: &TelnetFrame, dst: &mut BytesMut) {
    let command = |dst: &mut BytesMut, cmd: u8| {
        dst.reserve(2);
        dst.put_u8(consts::IAC);
        dst.put_u8(cmd);
    };
    let negotiation = |dst: &mut BytesMut, verb: u8, option: TelnetOption| {
        dst.reserve(3);
        dst.put_u8(consts::IAC);
        dst.put_u8(verb);
        dst.put_u8(option.into());
    };
    match frame {
        TelnetFrame::Data(ch) => {
            dst.reserve(2);
            if *ch == consts::IAC {
                dst.put_u8(consts::IAC);
            }
            dst.put_u8(*ch);
        }
        TelnetFrame::NoOperation => command(dst, consts::NOP),
        TelnetFrame::DataMark => command(dst, consts::DM),
        TelnetFrame::Break => command(dst, consts::BRK),
        TelnetFrame::InterruptProcess => command(dst, consts::IP),
        TelnetFrame::AbortOutput => command(dst, consts::AO),
        TelnetFrame::AreYouThere => command(dst, consts::AYT),
        TelnetFrame::EraseCharacter => command(dst, consts::EC),
        TelnetFrame::EraseLine => command(dst, consts::EL),
        TelnetFrame::GoAhead => command(dst, consts::GA),
        TelnetFrame::EndOfRecord => command(dst, consts::EOR),
        TelnetFrame::Do(option) => negotiation(dst, consts::DO, *option),
        TelnetFrame::Dont(option) => negotiation(dst, consts::DONT, *option),
        TelnetFrame::Will(option) => negotiation(dst, consts::WILL, *option),
        TelnetFrame::Wont(option) => negotiation(dst, consts::WONT, *option),
        TelnetFrame::Subnegotiate(argument) => {
            dst.reserve(5 + argument.len());
            dst.put_u8(consts::IAC);
            dst.put_u8(consts::SB);
            dst.put_u8(argument.option().to_u8());
            TelnetCodec::escape_into(&argument.to_payload(), dst);
            dst.put_u8(consts::IAC);
            dst.put_u8(consts::SE);
        }
    }
}

impl Encoder<u8> for TelnetCodec {
    type Error = CodecError;

    /// Encodes a single data byte, escaping IAC.
    fn encode(&mut self, item: u8, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_frame(&TelnetFrame::Data(item), dst);
        Ok(())
    }
}

impl Encoder<&[u8]> for TelnetCodec {
    type Error = CodecError;

    /// Encodes a run of application bytes, escaping every IAC.
    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        TelnetCodec::escape_into(item, dst);
        Ok(())
    }
}

impl Encoder<&str> for TelnetCodec {
    type Error = CodecError;

    /// Encodes the UTF-8 bytes of a string verbatim (no line ending is added).
    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        TelnetCodec::escape_into(item.as_bytes(), dst);
        Ok(())
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = CodecError;

    /// Encodes a `TelnetFrame` into its wire representation.
    ///
    /// Data bytes equal to IAC are doubled, commands are written as `IAC <cmd>`,
    /// negotiations as `IAC <verb> <option>` and subnegotiations as
    /// `IAC SB <option> <escaped payload> IAC SE`.
    fn encode(&mut self, item: TelnetFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_frame(&item, dst);
        Ok(())
    }
}

impl Encoder<TelnetEvent> for TelnetCodec {
    type Error = CodecError;

    /// Encodes a `TelnetEvent` into a byte buffer for transmission over the Telnet protocol.
    ///
    /// Note: `OptionStatus` events are informational only and cannot be encoded.
    fn encode(&mut self, item: TelnetEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = match item {
            TelnetEvent::Data(byte) => TelnetFrame::Data(byte),
            TelnetEvent::NoOperation => TelnetFrame::NoOperation,
            TelnetEvent::DataMark => TelnetFrame::DataMark,
            TelnetEvent::Break => TelnetFrame::Break,
            TelnetEvent::InterruptProcess => TelnetFrame::InterruptProcess,
            TelnetEvent::AbortOutput => TelnetFrame::AbortOutput,
            TelnetEvent::AreYouThere => TelnetFrame::AreYouThere,
            TelnetEvent::EraseCharacter => TelnetFrame::EraseCharacter,
            TelnetEvent::EraseLine => TelnetFrame::EraseLine,
            TelnetEvent::GoAhead => TelnetFrame::GoAhead,
            TelnetEvent::EndOfRecord => TelnetFrame::EndOfRecord,
            TelnetEvent::Subnegotiate(arg) => TelnetFrame::Subnegotiate(arg),
            TelnetEvent::OptionStatus(option, side, enabled) => {
                warn!(%option, %side, enabled, "Attempted to encode informational OptionStatus event");
                return Ok(());
            }
        };
        put_frame(&frame, dst);
        Ok(())
    }
}

/// Decoder position within the Telnet byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderState {
    /// Normal Data
    NormalData,
    /// Last data byte was CR; a following NUL is dropped
    CarriageReturn,
    /// Received IAC, Next byte is Command
    InterpretAsCommand,
    /// Received DO Command, Next Byte is the option
    NegotiateDo,
    /// Received DONT Command, Next Byte is the option
    NegotiateDont,
    /// Received WILL Command, Next Byte is the option
    NegotiateWill,
    /// Received WONT Command, Next Byte is the option
    NegotiateWont,
    /// Received Subnegotiate Command, Next Byte is the option
    Subnegotiate,
    /// Received Subnegotiate Option, Next Bytes are arguments
    SubnegotiateArgument(u8),
    /// Received IAC during Subnegotiation, Next Byte is command
    SubnegotiateArgumentIAC(u8),
    /// Oversized subnegotiation, skipping to IAC SE
    SubnegotiateDiscard,
    /// Received IAC while skipping an oversized subnegotiation
    SubnegotiateDiscardIAC,
}
