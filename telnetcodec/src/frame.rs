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
use crate::args::TelnetArgument;

///
/// A single wire-level Telnet protocol unit, as written by the encoder.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetFrame {
    /// Telnet Data Byte
    Data(u8),
    /// No Operation
    NoOperation,
    /// End of urgent Data Stream
    DataMark,
    /// Operator pressed the Break key or the Attention key.
    Break,
    /// Interrupt current process.
    InterruptProcess,
    /// Cancel output from the current process.
    AbortOutput,
    /// Request acknowledgment.
    AreYouThere,
    /// Request that the operator erase the previous character.
    EraseCharacter,
    /// Request that the operator erase the previous line.
    EraseLine,
    /// End of input for half-duplex connections.
    GoAhead,
    /// End of Record
    EndOfRecord,
    /// Ask the peer to perform an option.
    Do(TelnetOption),
    /// Ask the peer to stop performing an option.
    Dont(TelnetOption),
    /// Offer to perform an option.
    Will(TelnetOption),
    /// Refuse to perform an option.
    Wont(TelnetOption),
    /// Subnegotiation Payload
    Subnegotiate(TelnetArgument),
}

impl std::fmt::Display for TelnetFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetFrame::Data(byte) => write!(f, "Data(0x{byte:02X})"),
            TelnetFrame::NoOperation => write!(f, "NOP"),
            TelnetFrame::DataMark => write!(f, "DM"),
            TelnetFrame::Break => write!(f, "BRK"),
            TelnetFrame::InterruptProcess => write!(f, "IP"),
            TelnetFrame::AbortOutput => write!(f, "AO"),
            TelnetFrame::AreYouThere => write!(f, "AYT"),
            TelnetFrame::EraseCharacter => write!(f, "EC"),
            TelnetFrame::EraseLine => write!(f, "EL"),
            TelnetFrame::GoAhead => write!(f, "GA"),
            TelnetFrame::EndOfRecord => write!(f, "EOR"),
            TelnetFrame::Do(option) => write!(f, "DO {option}"),
            TelnetFrame::Dont(option) => write!(f, "DONT {option}"),
            TelnetFrame::Will(option) => write!(f, "WILL {option}"),
            TelnetFrame::Wont(option) => write!(f, "WONT {option}"),
            TelnetFrame::Subnegotiate(argument) => write!(f, "SB {argument}"),
        }
    }
}
