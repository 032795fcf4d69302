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

//! Telnet protocol byte values ([RFC854](https://tools.ietf.org/html/rfc854))

/// Null, the filler byte following a bare carriage return.
pub const NUL: u8 = 0x00;
/// End of Text, sent to the process for an interrupt when no terminal driver translates it.
pub const ETX: u8 = 0x03;
/// End of Transmission, the canonical-mode end of input character.
pub const EOT: u8 = 0x04;
/// Line Feed
pub const LF: u8 = 0x0A;
/// Carriage Return
pub const CR: u8 = 0x0D;
/// Escape, the start of a terminal control sequence.
pub const ESC: u8 = 0x1B;

/// End of Record
pub const EOR: u8 = 0xEF;
/// Subnegotiation End
pub const SE: u8 = 0xF0;
/// No Operation
pub const NOP: u8 = 0xF1;
/// Data Mark
pub const DM: u8 = 0xF2;
/// Break
pub const BRK: u8 = 0xF3;
/// Interrupt Process
pub const IP: u8 = 0xF4;
/// Abort Output
pub const AO: u8 = 0xF5;
/// Are You There
pub const AYT: u8 = 0xF6;
/// Erase Character
pub const EC: u8 = 0xF7;
/// Erase Line
pub const EL: u8 = 0xF8;
/// Go Ahead
pub const GA: u8 = 0xF9;
/// Subnegotiation Begin
pub const SB: u8 = 0xFA;
/// WILL
pub const WILL: u8 = 0xFB;
/// WONT
pub const WONT: u8 = 0xFC;
/// DO
pub const DO: u8 = 0xFD;
/// DONT
pub const DONT: u8 = 0xFE;
/// Interpret As Command
pub const IAC: u8 = 0xFF;

/// Longest subnegotiation payload the decoder buffers before giving up on it.
pub const MAX_SUBNEGOTIATION_LEN: usize = 1024;

/// Telnet option codes
///
/// [IANA Telnet Options](https://www.iana.org/assignments/telnet-options/telnet-options.xhtml)
pub mod option {
    /// Binary Transmission [RFC856](https://tools.ietf.org/html/rfc856)
    pub const BINARY: u8 = 0;
    /// Echo [RFC857](https://tools.ietf.org/html/rfc857)
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead [RFC858](https://tools.ietf.org/html/rfc858)
    pub const SGA: u8 = 3;
    /// Status [RFC859](https://tools.ietf.org/html/rfc859)
    pub const STATUS: u8 = 5;
    /// Timing Mark [RFC860](https://tools.ietf.org/html/rfc860)
    pub const TM: u8 = 6;
    /// Terminal Type [RFC1091](https://tools.ietf.org/html/rfc1091)
    pub const TTYPE: u8 = 24;
    /// End of Record [RFC885](https://tools.ietf.org/html/rfc885)
    pub const EOR: u8 = 25;
    /// Negotiate About Window Size [RFC1073](https://tools.ietf.org/html/rfc1073)
    pub const NAWS: u8 = 31;
    /// Terminal Speed [RFC1079](https://tools.ietf.org/html/rfc1079)
    pub const TSPEED: u8 = 32;
    /// Remote Flow Control [RFC1372](https://tools.ietf.org/html/rfc1372)
    pub const LFLOW: u8 = 33;
    /// Linemode [RFC1184](https://tools.ietf.org/html/rfc1184)
    pub const LINEMODE: u8 = 34;
    /// X Display Location [RFC1096](https://tools.ietf.org/html/rfc1096)
    pub const XDISPLOC: u8 = 35;
    /// Old Environment [RFC1408](https://tools.ietf.org/html/rfc1408)
    pub const OLD_ENVIRONMENT: u8 = 36;
    /// New Environment [RFC1572](https://tools.ietf.org/html/rfc1572)
    pub const NEW_ENVIRONMENT: u8 = 39;
    /// Charset [RFC2066](https://tools.ietf.org/html/rfc2066)
    pub const CHARSET: u8 = 42;
    /// Extended Options List [RFC861](https://tools.ietf.org/html/rfc861)
    pub const EXOPL: u8 = 255;

    /// Options the bridge is prepared to negotiate, indexed by option code.
    ///
    /// `(local, remote)`: whether we will perform the option ourselves (answer DO with WILL)
    /// and whether we let the client perform it (answer WILL with DO). Everything not listed is
    /// refused.
    pub const SUPPORT: [(bool, bool); 256] = {
        let mut table = [(false, false); 256];
        table[BINARY as usize] = (true, true);
        table[ECHO as usize] = (true, false);
        table[SGA as usize] = (true, true);
        table[NAWS as usize] = (false, true);
        table
    };
}
