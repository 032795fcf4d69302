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

//! Property tests for telnetcodec

use bytes::BytesMut;
use proptest::prelude::*;
use tnbridge_telnetcodec::{TelnetCodec, TelnetEvent};
use tokio_util::codec::{Decoder, Encoder};

fn decode_data(codec: &mut TelnetCodec, wire: &mut BytesMut) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(event) = codec.decode(wire).expect("decoder never fails on input") {
        if let TelnetEvent::Data(byte) = event {
            out.push(byte);
        }
    }
    out
}

proptest! {
    /// Escaped output always decodes back to the original bytes, as long as no bare CR NUL
    /// pair is present (that pair is rewritten to CR on an NVT).
    #[test]
    fn escaped_data_survives_decoding(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assume!(!payload.windows(2).any(|pair| pair == [b'\r', 0]));
        let mut wire = BytesMut::new();
        TelnetCodec::new().encode(&payload[..], &mut wire).unwrap();
        let decoded = decode_data(&mut TelnetCodec::new(), &mut wire);
        prop_assert_eq!(decoded, payload);
    }

    /// Arbitrary input, including malformed sequences, never makes the decoder fail and never
    /// yields more data bytes than were received.
    #[test]
    fn arbitrary_input_is_tolerated(input in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let mut codec = TelnetCodec::new();
        let mut wire = BytesMut::from(&input[..]);
        let decoded = decode_data(&mut codec, &mut wire);
        prop_assert!(decoded.len() <= input.len());
        prop_assert!(wire.is_empty());
    }

    /// Escaping never leaves a lone IAC in the output.
    #[test]
    fn escaped_output_has_paired_iac(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut wire = BytesMut::new();
        TelnetCodec::escape_into(&payload, &mut wire);
        let iac_in = payload.iter().filter(|b| **b == 0xFF).count();
        let iac_out = wire.iter().filter(|b| **b == 0xFF).count();
        prop_assert_eq!(iac_out, iac_in * 2);
        prop_assert_eq!(wire.len(), payload.len() + iac_in);
    }
}
