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

use crate::{CodecError, CodecResult, TelnetFrame, consts};
use std::fmt::Formatter;

///
/// [Telnet Terminal Options](https://www.iana.org/assignments/telnet-options/telnet-options.xhtml)
///
/// Only the options a terminal client commonly offers are named; everything else decodes as
/// [`TelnetOption::Unknown`] and is refused during negotiation.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetOption {
    /// [`consts::option::BINARY`] Telnet Binary Transmission [RFC856](https://tools.ietf.org/html/rfc856)
    TransmitBinary,
    /// [`consts::option::ECHO`] Telnet Echo Option [RFC857](https://tools.ietf.org/html/rfc857)
    Echo,
    /// [`consts::option::SGA`] Suppress Go ahead [RFC858](https://tools.ietf.org/html/rfc858)
    SuppressGoAhead,
    /// [`consts::option::STATUS`] Telnet Status Option [RFC859](http://www.iana.org/go/rfc859)
    Status,
    /// [`consts::option::TM`] Telnet Timing Mark Option [RFC860](http://www.iana.org/go/rfc860)
    TimingMark,
    /// [`consts::option::TTYPE`] Terminal Type [RFC1091](http://www.iana.org/go/rfc1091)
    TTYPE,
    /// [`consts::option::EOR`] End of Record [RFC885](http://www.iana.org/go/rfc885)
    EOR,
    /// [`consts::option::NAWS`] Negotiate About Window Size [RFC1073](http://www.iana.org/go/rfc1073)
    NAWS,
    /// [`consts::option::TSPEED`] Terminal Speed [RFC1079](http://www.iana.org/go/rfc1079)
    TSPEED,
    /// [`consts::option::LFLOW`] Remote Flow Control [RFC1372](http://www.iana.org/go/rfc1372)
    LFLOW,
    /// [`consts::option::LINEMODE`] Linemode [RFC1184](http://www.iana.org/go/rfc1184)
    Linemode,
    /// [`consts::option::XDISPLOC`] X Display Location [RFC1096](http://www.iana.org/go/rfc1096)
    XDISPLOC,
    /// [`consts::option::OLD_ENVIRONMENT`] Environment Option [RFC1408](http://www.iana.org/go/rfc1408)
    Environment,
    /// [`consts::option::NEW_ENVIRONMENT`] New Environment Option [RFC1572](http://www.iana.org/go/rfc1572)
    NewEnvironment,
    /// [`consts::option::CHARSET`] Charset [RFC2066](http://www.iana.org/go/rfc2066)
    Charset,
    /// [`consts::option::EXOPL`] Extended-Options-List [RFC861](http://www.iana.org/go/rfc861)
    EXOPL,
    /// Unknown Option
    Unknown(u8),
}

impl TelnetOption {
    /// Converts a `TelnetOption` into its option code.
    pub fn to_u8(&self) -> u8 {
        match self {
            TelnetOption::TransmitBinary => consts::option::BINARY,
            TelnetOption::Echo => consts::option::ECHO,
            TelnetOption::SuppressGoAhead => consts::option::SGA,
            TelnetOption::Status => consts::option::STATUS,
            TelnetOption::TimingMark => consts::option::TM,
            TelnetOption::TTYPE => consts::option::TTYPE,
            TelnetOption::EOR => consts::option::EOR,
            TelnetOption::NAWS => consts::option::NAWS,
            TelnetOption::TSPEED => consts::option::TSPEED,
            TelnetOption::LFLOW => consts::option::LFLOW,
            TelnetOption::Linemode => consts::option::LINEMODE,
            TelnetOption::XDISPLOC => consts::option::XDISPLOC,
            TelnetOption::Environment => consts::option::OLD_ENVIRONMENT,
            TelnetOption::NewEnvironment => consts::option::NEW_ENVIRONMENT,
            TelnetOption::Charset => consts::option::CHARSET,
            TelnetOption::EXOPL => consts::option::EXOPL,
            TelnetOption::Unknown(byte) => *byte,
        }
    }

    /// Converts an option code into a `TelnetOption`, falling back to
    /// [`TelnetOption::Unknown`] for codes without a named variant.
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            consts::option::BINARY => TelnetOption::TransmitBinary,
            consts::option::ECHO => TelnetOption::Echo,
            consts::option::SGA => TelnetOption::SuppressGoAhead,
            consts::option::STATUS => TelnetOption::Status,
            consts::option::TM => TelnetOption::TimingMark,
            consts::option::TTYPE => TelnetOption::TTYPE,
            consts::option::EOR => TelnetOption::EOR,
            consts::option::NAWS => TelnetOption::NAWS,
            consts::option::TSPEED => TelnetOption::TSPEED,
            consts::option::LFLOW => TelnetOption::LFLOW,
            consts::option::LINEMODE => TelnetOption::Linemode,
            consts::option::XDISPLOC => TelnetOption::XDISPLOC,
            consts::option::OLD_ENVIRONMENT => TelnetOption::Environment,
            consts::option::NEW_ENVIRONMENT => TelnetOption::NewEnvironment,
            consts::option::CHARSET => TelnetOption::Charset,
            consts::option::EXOPL => TelnetOption::EXOPL,
            byte => TelnetOption::Unknown(byte),
        }
    }

    /// Whether we support this option from us -> them.
    pub fn supported_local(&self) -> bool {
        consts::option::SUPPORT[self.to_u8() as usize].0
    }

    /// Whether we support this option from them -> us.
    pub fn supported_remote(&self) -> bool {
        consts::option::SUPPORT[self.to_u8() as usize].1
    }
}

impl std::fmt::Display for TelnetOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetOption::TransmitBinary => write!(f, "TransmitBinary"),
            TelnetOption::Echo => write!(f, "Echo"),
            TelnetOption::SuppressGoAhead => write!(f, "SuppressGoAhead"),
            TelnetOption::Status => write!(f, "Status"),
            TelnetOption::TimingMark => write!(f, "TimingMark"),
            TelnetOption::TTYPE => write!(f, "TTYPE"),
            TelnetOption::EOR => write!(f, "EOR"),
            TelnetOption::NAWS => write!(f, "NAWS"),
            TelnetOption::TSPEED => write!(f, "TSPEED"),
            TelnetOption::LFLOW => write!(f, "LFLOW"),
            TelnetOption::Linemode => write!(f, "Linemode"),
            TelnetOption::XDISPLOC => write!(f, "XDISPLOC"),
            TelnetOption::Environment => write!(f, "Environment"),
            TelnetOption::NewEnvironment => write!(f, "NewEnvironment"),
            TelnetOption::Charset => write!(f, "Charset"),
            TelnetOption::EXOPL => write!(f, "EXOPL"),
            TelnetOption::Unknown(option) => write!(f, "Unknown({option})"),
        }
    }
}

impl From<u8> for TelnetOption {
    fn from(byte: u8) -> Self {
        Self::from_u8(byte)
    }
}

impl From<TelnetOption> for u8 {
    fn from(option: TelnetOption) -> Self {
        option.to_u8()
    }
}

/// Per-option negotiation state for both directions of a connection.
///
/// Each of the 256 option codes carries a support entry (which side we are willing to enable,
/// taken from [`consts::option::SUPPORT`]) and a pair of [RFC1143](https://tools.ietf.org/html/rfc1143)
/// Q-method state machines, one for what *we* perform and one for what the *peer* performs.
/// The Q-method guarantees that a pair of endpoints can never enter a negotiation loop, no
/// matter how the peer misbehaves.
#[derive(Clone, Debug)]
pub struct TelnetOptions {
    config: [SupportState; 256],
    state: [OptionState; 256],
}

impl TelnetOptions {
    /// Checks if we support the given option locally
    pub fn is_supported_local(&self, option: TelnetOption) -> bool {
        self.config[option.to_u8() as usize].local
    }

    /// Checks if we support the given option remotely
    pub fn is_supported_remote(&self, option: TelnetOption) -> bool {
        self.config[option.to_u8() as usize].remote
    }

    /// Gets the local QState for an option
    pub(crate) fn local_qstate(&self, option: TelnetOption) -> QState {
        self.state[option.to_u8() as usize].local
    }

    /// Gets the remote QState for an option
    pub(crate) fn remote_qstate(&self, option: TelnetOption) -> QState {
        self.state[option.to_u8() as usize].remote
    }

    /// Returns `true` when we are currently performing `option`.
    pub fn local_enabled(&self, option: TelnetOption) -> bool {
        self.local_qstate(option) == QState::Yes
    }

    /// Returns `true` when the peer is currently performing `option`.
    pub fn remote_enabled(&self, option: TelnetOption) -> bool {
        self.remote_qstate(option) == QState::Yes
    }

    /// Returns `true` if either side of `option` is waiting for the peer to answer.
    pub fn is_pending(&self, option: TelnetOption) -> bool {
        let state = &self.state[option.to_u8() as usize];
        state.local.is_pending() || state.remote.is_pending()
    }

    /// Asks to enable `option` on our side, returning the `WILL` to transmit if one is needed.
    pub fn enable_local(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.request_will(option)
    }

    /// Asks to disable `option` on our side, returning the `WONT` to transmit if one is needed.
    pub fn disable_local(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.request_wont(option)
    }

    /// Asks the peer to enable `option`, returning the `DO` to transmit if one is needed.
    pub fn enable_remote(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.request_do(option)
    }

    /// Asks the peer to disable `option`, returning the `DONT` to transmit if one is needed.
    pub fn disable_remote(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        self.request_dont(option)
    }

    /// Handles a received negotiation frame and returns the reply to transmit, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NegotiationError`] if `frame` is not one of
    /// `Do`, `Dont`, `Will` or `Wont`.
    pub fn handle_received(&mut self, frame: TelnetFrame) -> CodecResult<Option<TelnetFrame>> {
        match frame {
            TelnetFrame::Do(option) => Ok(self.recv_do(option)),
            TelnetFrame::Dont(option) => Ok(self.recv_dont(option)),
            TelnetFrame::Will(option) => Ok(self.recv_will(option)),
            TelnetFrame::Wont(option) => Ok(self.recv_wont(option)),
            _ => Err(CodecError::NegotiationError {
                reason: "Unsupported frame type".into(),
                frame_type: Some(format!("{:?}", frame)),
            }),
        }
    }

    // #### Outgoing requests (what we initiate) ################################

    fn request_will(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let idx = option.to_u8() as usize;
        if !self.config[idx].local {
            return None;
        }
        let state = &mut self.state[idx].local;
        match *state {
            QState::No => {
                *state = QState::WantYes;
                Some(TelnetFrame::Will(option))
            }
            QState::WantNo => {
                // Queue the opposite request until the peer answers our WONT.
                *state = QState::WantNoOpposite;
                None
            }
            QState::WantYesOpposite => {
                *state = QState::WantYes;
                None
            }
            QState::Yes | QState::WantYes | QState::WantNoOpposite => None,
        }
    }

    fn request_wont(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let state = &mut self.state[option.to_u8() as usize].local;
        match *state {
            QState::Yes => {
                *state = QState::WantNo;
                Some(TelnetFrame::Wont(option))
            }
            QState::WantYes => {
                *state = QState::WantYesOpposite;
                None
            }
            QState::WantNoOpposite => {
                *state = QState::WantNo;
                None
            }
            QState::No | QState::WantNo | QState::WantYesOpposite => None,
        }
    }

    fn request_do(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let idx = option.to_u8() as usize;
        if !self.config[idx].remote {
            return None;
        }
        let state = &mut self.state[idx].remote;
        match *state {
            QState::No => {
                *state = QState::WantYes;
                Some(TelnetFrame::Do(option))
            }
            QState::WantNo => {
                *state = QState::WantNoOpposite;
                None
            }
            QState::WantYesOpposite => {
                *state = QState::WantYes;
                None
            }
            QState::Yes | QState::WantYes | QState::WantNoOpposite => None,
        }
    }

    fn request_dont(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let state = &mut self.state[option.to_u8() as usize].remote;
        match *state {
            QState::Yes => {
                *state = QState::WantNo;
                Some(TelnetFrame::Dont(option))
            }
            QState::WantYes => {
                *state = QState::WantYesOpposite;
                None
            }
            QState::WantNoOpposite => {
                *state = QState::WantNo;
                None
            }
            QState::No | QState::WantNo | QState::WantYesOpposite => None,
        }
    }

    // #### Incoming processing (peer sent us DO/DONT/WILL/WONT) ##################

    fn recv_will(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let idx = option.to_u8() as usize;
        let supported = self.config[idx].remote;
        let state = &mut self.state[idx].remote;
        match *state {
            QState::No if supported => {
                *state = QState::Yes;
                Some(TelnetFrame::Do(option))
            }
            QState::No => Some(TelnetFrame::Dont(option)),
            QState::Yes => None,
            // Peer answered our DONT with WILL. RFC1143 treats this as an error; settle on No.
            QState::WantNo => {
                *state = QState::No;
                None
            }
            QState::WantNoOpposite => {
                *state = QState::Yes;
                None
            }
            QState::WantYes => {
                *state = QState::Yes;
                None
            }
            QState::WantYesOpposite => {
                *state = QState::WantNo;
                Some(TelnetFrame::Dont(option))
            }
        }
    }

    fn recv_wont(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let state = &mut self.state[option.to_u8() as usize].remote;
        match *state {
            QState::No => None,
            QState::Yes => {
                *state = QState::No;
                Some(TelnetFrame::Dont(option))
            }
            QState::WantNo | QState::WantYes | QState::WantYesOpposite => {
                *state = QState::No;
                None
            }
            QState::WantNoOpposite => {
                *state = QState::WantYes;
                Some(TelnetFrame::Do(option))
            }
        }
    }

    fn recv_do(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let idx = option.to_u8() as usize;
        let supported = self.config[idx].local;
        let state = &mut self.state[idx].local;
        match *state {
            QState::No if supported => {
                *state = QState::Yes;
                Some(TelnetFrame::Will(option))
            }
            QState::No => Some(TelnetFrame::Wont(option)),
            QState::Yes => None,
            QState::WantNo => {
                *state = QState::No;
                None
            }
            QState::WantNoOpposite => {
                *state = QState::Yes;
                None
            }
            QState::WantYes => {
                *state = QState::Yes;
                None
            }
            QState::WantYesOpposite => {
                *state = QState::WantNo;
                Some(TelnetFrame::Wont(option))
            }
        }
    }

    fn recv_dont(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        let state = &mut self.state[option.to_u8() as usize].local;
        match *state {
            QState::No => None,
            QState::Yes => {
                *state = QState::No;
                Some(TelnetFrame::Wont(option))
            }
            QState::WantNo | QState::WantYes | QState::WantYesOpposite => {
                *state = QState::No;
                None
            }
            QState::WantNoOpposite => {
                *state = QState::WantYes;
                Some(TelnetFrame::Will(option))
            }
        }
    }
}

impl Default for TelnetOptions {
    fn default() -> Self {
        TelnetOptions {
            config: core::array::from_fn(|idx| {
                let (local, remote) = consts::option::SUPPORT[idx];
                SupportState { local, remote }
            }),
            state: core::array::from_fn(|_| OptionState::default()),
        }
    }
}

/// Which end of the connection performs an option.
///
/// Every option is negotiated twice, independently: `Local` tracks whether *we* perform it
/// (we send `WILL`/`WONT`, the peer answers `DO`/`DONT`) and `Remote` tracks whether the
/// *peer* performs it (we send `DO`/`DONT`, the peer answers `WILL`/`WONT`).
///
/// ```text
/// Local:   WILL <option>  ->  peer,  peer DO <option>    ->  us
/// Remote:  DO <option>    ->  peer,  peer WILL <option>  ->  us
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetSide {
    /// The local side of the Telnet connection (what we do)
    Local,
    /// The remote side of the Telnet connection (what the peer does)
    Remote,
}

impl std::fmt::Display for TelnetSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetSide::Local => write!(f, "Local"),
            TelnetSide::Remote => write!(f, "Remote"),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct OptionState {
    pub local: QState,
    pub remote: QState,
}

/// RFC1143 option state.
///
/// The `*Opposite` variants carry the RFC's one-entry queue: a request for the opposite
/// outcome arrived while we were still waiting for the peer to answer.
#[derive(Copy, Clone, Debug, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub(crate) enum QState {
    /// Disabled
    #[default]
    No,
    /// Sent a disable request, waiting for the answer
    WantNo,
    /// Sent a disable request, re-enable once it is answered
    WantNoOpposite,
    /// Enabled
    Yes,
    /// Sent an enable request, waiting for the answer
    WantYes,
    /// Sent an enable request, disable once it is answered
    WantYesOpposite,
}

impl QState {
    fn is_pending(&self) -> bool {
        !matches!(self, QState::No | QState::Yes)
    }
}

impl std::fmt::Display for QState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QState::No => write!(f, "No"),
            QState::WantNo => write!(f, "WantNo"),
            QState::WantNoOpposite => write!(f, "WantNoOpposite"),
            QState::Yes => write!(f, "Yes"),
            QState::WantYes => write!(f, "WantYes"),
            QState::WantYesOpposite => write!(f, "WantYesOpposite"),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct SupportState {
    /// Whether we support this option from us -> them.
    pub local: bool,
    /// Whether we support this option from them -> us.
    pub remote: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(option: TelnetOption) -> usize {
        option.to_u8() as usize
    }

    #[test]
    fn test_option_state_default() {
        let state = OptionState::default();
        assert_eq!(state.local, QState::No);
        assert_eq!(state.remote, QState::No);
    }

    #[test]
    fn test_option_code_roundtrip() {
        for byte in 0..=255u8 {
            assert_eq!(TelnetOption::from_u8(byte).to_u8(), byte);
        }
        assert_eq!(TelnetOption::from_u8(31), TelnetOption::NAWS);
        assert_eq!(TelnetOption::from_u8(200), TelnetOption::Unknown(200));
    }

    #[test]
    fn test_bridge_support_table() {
        let opts = TelnetOptions::default();
        assert!(opts.is_supported_local(TelnetOption::Echo));
        assert!(opts.is_supported_local(TelnetOption::SuppressGoAhead));
        assert!(opts.is_supported_local(TelnetOption::TransmitBinary));
        assert!(!opts.is_supported_local(TelnetOption::NAWS));
        assert!(opts.is_supported_remote(TelnetOption::NAWS));
        assert!(opts.is_supported_remote(TelnetOption::TransmitBinary));
        assert!(!opts.is_supported_remote(TelnetOption::Echo));
        assert!(!opts.is_supported_remote(TelnetOption::Linemode));
    }

    // ============================================================================
    // Local Option Tests (We send WILL, they send DO)
    // ============================================================================

    #[test]
    fn test_local_enable_from_no_to_wantyes() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::Echo;
        let frame = opts.enable_local(opt);
        assert_eq!(frame, Some(TelnetFrame::Will(opt)));
        assert_eq!(opts.state[idx(opt)].local, QState::WantYes);
        assert!(!opts.local_enabled(opt));
        assert!(opts.is_pending(opt));
    }

    #[test]
    fn test_local_enable_recv_do_completes_to_yes() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::Echo;
        opts.enable_local(opt);
        let reply = opts.handle_received(TelnetFrame::Do(opt)).unwrap();
        assert_eq!(reply, None);
        assert!(opts.local_enabled(opt));
        assert!(!opts.is_pending(opt));
    }

    #[test]
    fn test_local_enable_unsupported_is_noop() {
        let mut opts = TelnetOptions::default();
        assert_eq!(opts.enable_local(TelnetOption::NAWS), None);
        assert_eq!(opts.state[idx(TelnetOption::NAWS)].local, QState::No);
    }

    #[test]
    fn test_local_enable_idempotent_when_yes() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::SuppressGoAhead;
        opts.state[idx(opt)].local = QState::Yes;
        assert_eq!(opts.enable_local(opt), None);
        assert_eq!(opts.state[idx(opt)].local, QState::Yes);
    }

    #[test]
    fn test_local_disable_handshake() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::Echo;
        opts.state[idx(opt)].local = QState::Yes;
        assert_eq!(opts.disable_local(opt), Some(TelnetFrame::Wont(opt)));
        assert_eq!(opts.state[idx(opt)].local, QState::WantNo);
        assert_eq!(opts.handle_received(TelnetFrame::Dont(opt)).unwrap(), None);
        assert_eq!(opts.state[idx(opt)].local, QState::No);
    }

    #[test]
    fn test_recv_do_unsupported_replies_wont() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::Linemode;
        let reply = opts.handle_received(TelnetFrame::Do(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Wont(opt)));
        assert_eq!(opts.state[idx(opt)].local, QState::No);
    }

    #[test]
    fn test_recv_do_supported_replies_will() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::TransmitBinary;
        let reply = opts.handle_received(TelnetFrame::Do(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Will(opt)));
        assert!(opts.local_enabled(opt));
        // A repeated DO must not produce another reply.
        assert_eq!(opts.handle_received(TelnetFrame::Do(opt)).unwrap(), None);
    }

    #[test]
    fn test_recv_dont_when_yes_acknowledges() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::Echo;
        opts.state[idx(opt)].local = QState::Yes;
        let reply = opts.handle_received(TelnetFrame::Dont(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Wont(opt)));
        assert!(!opts.local_enabled(opt));
    }

    #[test]
    fn test_recv_dont_when_no_is_silent() {
        let mut opts = TelnetOptions::default();
        let reply = opts.handle_received(TelnetFrame::Dont(TelnetOption::Echo)).unwrap();
        assert_eq!(reply, None);
    }

    // ============================================================================
    // Remote Option Tests (We send DO, they send WILL)
    // ============================================================================

    #[test]
    fn test_remote_enable_recv_will_completes_to_yes() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::NAWS;
        assert_eq!(opts.enable_remote(opt), Some(TelnetFrame::Do(opt)));
        assert_eq!(opts.state[idx(opt)].remote, QState::WantYes);
        assert_eq!(opts.handle_received(TelnetFrame::Will(opt)).unwrap(), None);
        assert!(opts.remote_enabled(opt));
    }

    #[test]
    fn test_remote_enable_refused_by_wont() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::NAWS;
        opts.enable_remote(opt);
        assert_eq!(opts.handle_received(TelnetFrame::Wont(opt)).unwrap(), None);
        assert_eq!(opts.state[idx(opt)].remote, QState::No);
        assert!(!opts.is_pending(opt));
    }

    #[test]
    fn test_recv_will_unsupported_replies_dont() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::TTYPE;
        let reply = opts.handle_received(TelnetFrame::Will(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Dont(opt)));
        assert!(!opts.remote_enabled(opt));
    }

    #[test]
    fn test_recv_will_unknown_option_replies_dont() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::Unknown(0xC8);
        let reply = opts.handle_received(TelnetFrame::Will(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Dont(opt)));
    }

    #[test]
    fn test_recv_wont_when_yes_acknowledges() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::NAWS;
        opts.state[idx(opt)].remote = QState::Yes;
        let reply = opts.handle_received(TelnetFrame::Wont(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Dont(opt)));
        assert_eq!(opts.state[idx(opt)].remote, QState::No);
    }

    // ============================================================================
    // Collision Tests
    // ============================================================================

    #[test]
    fn test_enable_while_wantno_queues_opposite() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::TransmitBinary;
        opts.state[idx(opt)].remote = QState::Yes;
        assert_eq!(opts.disable_remote(opt), Some(TelnetFrame::Dont(opt)));
        assert_eq!(opts.enable_remote(opt), None);
        assert_eq!(opts.state[idx(opt)].remote, QState::WantNoOpposite);
        // The WONT answering our DONT triggers the queued DO.
        let reply = opts.handle_received(TelnetFrame::Wont(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Do(opt)));
        assert_eq!(opts.state[idx(opt)].remote, QState::WantYes);
    }

    #[test]
    fn test_disable_while_wantyes_queues_opposite() {
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::Echo;
        opts.enable_local(opt);
        assert_eq!(opts.disable_local(opt), None);
        assert_eq!(opts.state[idx(opt)].local, QState::WantYesOpposite);
        let reply = opts.handle_received(TelnetFrame::Do(opt)).unwrap();
        assert_eq!(reply, Some(TelnetFrame::Wont(opt)));
        assert_eq!(opts.state[idx(opt)].local, QState::WantNo);
    }

    #[test]
    fn test_negotiation_loop_is_impossible() {
        // A peer that blindly echoes every request back must settle after one exchange.
        let mut opts = TelnetOptions::default();
        let opt = TelnetOption::SuppressGoAhead;
        let request = opts.enable_local(opt).unwrap();
        assert_eq!(request, TelnetFrame::Will(opt));
        assert_eq!(opts.handle_received(TelnetFrame::Do(opt)).unwrap(), None);
        assert_eq!(opts.handle_received(TelnetFrame::Do(opt)).unwrap(), None);
        assert!(opts.local_enabled(opt));
    }

    #[test]
    fn test_handle_received_rejects_non_negotiation() {
        let mut opts = TelnetOptions::default();
        let result = opts.handle_received(TelnetFrame::NoOperation);
        assert!(matches!(result, Err(CodecError::NegotiationError { .. })));
    }
}
