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

use super::TelnetOption;
use crate::args::TelnetArgument;
use crate::consts;
use crate::options::TelnetSide;

/// Decoded client input.
///
/// The bridge only acts on a handful of these: data bytes go to the program, `InterruptProcess`
/// becomes ETX, `AreYouThere` is answered in place and a NAWS report resizes the terminal.
/// Everything else is surfaced for logging and otherwise dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum TelnetEvent {
    /// Application byte, already unescaped
    Data(u8),
    /// IAC NOP, often sent as a keepalive
    NoOperation,
    /// IAC DM
    DataMark,
    /// IAC BRK
    Break,
    /// IAC IP, the client's interrupt key
    InterruptProcess,
    /// IAC AO
    AbortOutput,
    /// IAC AYT, answered without involving the program
    AreYouThere,
    /// IAC EC
    EraseCharacter,
    /// IAC EL
    EraseLine,
    /// IAC GA
    GoAhead,
    /// IAC EOR
    EndOfRecord,
    /// An option settled on `enabled` for `side` after negotiation
    OptionStatus(TelnetOption, TelnetSide, bool),
    /// Completed subnegotiation. A NAWS report arrives as [`TelnetArgument::NAWSWindowSize`].
    Subnegotiate(TelnetArgument),
}

impl TelnetEvent {
    /// Event for a single byte command following IAC, or `None` if `byte` is not one
    pub fn from_command(byte: u8) -> Option<TelnetEvent> {
        let event = match byte {
            consts::NOP => TelnetEvent::NoOperation,
            consts::DM => TelnetEvent::DataMark,
            consts::BRK => TelnetEvent::Break,
            consts::IP => TelnetEvent::InterruptProcess,
            consts::AO => TelnetEvent::AbortOutput,
            consts::AYT => TelnetEvent::AreYouThere,
            consts::EC => TelnetEvent::EraseCharacter,
            consts::EL => TelnetEvent::EraseLine,
            consts::GA => TelnetEvent::GoAhead,
            consts::EOR => TelnetEvent::EndOfRecord,
            _ => return None,
        };
        Some(event)
    }
}
