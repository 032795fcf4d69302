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

//! Telnet client connection
//!
//! A [`TelnetConnection`] owns the socket while options are negotiated and the initial window
//! size is learned. It then splits into a [`ClientReader`] and a [`ClientWriter`] so that the
//! two pump directions never wait on each other.

use crate::{BridgeResult, SessionId};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tnbridge_telnetcodec::{
    TelnetArgument, TelnetCodec, TelnetEvent, TelnetOption, WindowSize, consts,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{Instant, timeout_at};
use tokio_util::codec::Decoder;
use tracing::{debug, instrument, trace};

/// Asks the client's terminal to report its size in characters
pub const SIZE_QUERY: &[u8] = b"\x1b[18t";

/// Prefix of the terminal's answer to [`SIZE_QUERY`]: `ESC [ 8 ; rows ; cols t`
const SIZE_REPORT_PREFIX: &[u8] = b"\x1b[8;";

/// Reply to `IAC AYT`
const ARE_YOU_THERE_REPLY: &[u8] = b"\r\n[tnbridge: yes]\r\n";

const READ_BUFFER_SIZE: usize = 4096;

/// Everything decoded from one read of the client socket
#[derive(Debug, Default)]
pub struct ClientInput {
    /// Application bytes destined for the program
    pub data: BytesMut,
    /// Latest window size reported in this read
    pub window_size: Option<WindowSize>,
    /// Telnet replies that must be written back to the client
    pub replies: BytesMut,
    /// Raw bytes read from the socket
    pub wire_len: usize,
}

/// Result of the opening handshake
#[derive(Debug)]
pub struct Handshake {
    /// Size reported by NAWS or the terminal size query
    pub window_size: Option<WindowSize>,
    /// Application bytes typed before the program existed
    pub early_input: BytesMut,
    /// The client closed its side before negotiation finished
    pub client_closed: bool,
}

/// Outcome of one bounded read during negotiation
enum Progress {
    Received,
    Elapsed,
    Closed,
}

/// Read side of a client connection
pub struct ClientReader {
    id: SessionId,
    half: OwnedReadHalf,
    codec: TelnetCodec,
    buffer: BytesMut,
    reported_errors: u64,
}

impl ClientReader {
    /// Read from the socket and decode everything that arrived
    ///
    /// Returns `Ok(None)` once the client has closed its side. Cancel safe.
    pub async fn read(&mut self) -> BridgeResult<Option<ClientInput>> {
        self.buffer.reserve(READ_BUFFER_SIZE);
        let wire_len = self.half.read_buf(&mut self.buffer).await?;
        if wire_len == 0 {
            return Ok(None);
        }

        let mut input = ClientInput {
            wire_len,
            ..Default::default()
        };
        while let Some(event) = self.codec.decode(&mut self.buffer)? {
            match event {
                TelnetEvent::Data(byte) => input.data.extend_from_slice(&[byte]),
                TelnetEvent::Subnegotiate(TelnetArgument::NAWSWindowSize(size)) => {
                    input.window_size = Some(size);
                }
                TelnetEvent::InterruptProcess => {
                    trace!(session = %self.id, "IAC IP forwarded as ETX");
                    input.data.extend_from_slice(&[consts::ETX]);
                }
                TelnetEvent::AreYouThere => {
                    input.replies.extend_from_slice(ARE_YOU_THERE_REPLY);
                }
                TelnetEvent::OptionStatus(option, side, enabled) => {
                    debug!(session = %self.id, %option, %side, enabled, "option negotiated");
                }
                other => trace!(session = %self.id, event = ?other, "ignoring telnet event"),
            }
        }
        self.codec.flush_responses(&mut input.replies)?;
        Ok(Some(input))
    }

    /// Malformed telnet sequences seen since the previous call
    pub fn take_protocol_errors(&mut self) -> u64 {
        let total = self.codec.protocol_errors();
        let fresh = total - self.reported_errors;
        self.reported_errors = total;
        fresh
    }

    /// The codec, for inspecting negotiated state
    pub fn codec(&self) -> &TelnetCodec {
        &self.codec
    }
}

/// Write side of a client connection
pub struct ClientWriter {
    half: OwnedWriteHalf,
    scratch: BytesMut,
}

impl ClientWriter {
    /// Write program output, doubling IAC bytes. Returns the number of bytes put on the wire.
    pub async fn write_output(&mut self, data: &[u8]) -> BridgeResult<usize> {
        self.scratch.clear();
        TelnetCodec::escape_into(data, &mut self.scratch);
        self.half.write_all(&self.scratch).await?;
        Ok(self.scratch.len())
    }

    /// Write bytes that are already telnet encoded
    pub async fn write_raw(&mut self, data: &[u8]) -> BridgeResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        self.half.write_all(data).await?;
        Ok(data.len())
    }

    /// Flush and close the write direction
    pub async fn close(&mut self) {
        if let Err(error) = self.half.shutdown().await {
            trace!(%error, "client shutdown failed");
        }
    }
}

/// A telnet client connection before it is split into its two directions
pub struct TelnetConnection {
    id: SessionId,
    peer_addr: SocketAddr,
    reader: ClientReader,
    writer: ClientWriter,
}

impl TelnetConnection {
    /// Wrap an accepted TCP stream
    #[instrument(skip(socket), fields(session = %id))]
    pub fn wrap(socket: TcpStream, id: SessionId) -> BridgeResult<Self> {
        let peer_addr = socket.peer_addr()?;
        socket.set_nodelay(true)?;
        let (read_half, write_half) = socket.into_split();
        trace!(peer = %peer_addr, "wrapped client socket");
        Ok(Self {
            id,
            peer_addr,
            reader: ClientReader {
                id,
                half: read_half,
                codec: TelnetCodec::new(),
                buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
                reported_errors: 0,
            },
            writer: ClientWriter {
                half: write_half,
                scratch: BytesMut::with_capacity(READ_BUFFER_SIZE),
            },
        })
    }

    /// Get the session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Negotiate options and learn the client's window size
    ///
    /// Offers the bridge's options and reads until the client reported NAWS, refused it, or
    /// `limit` elapsed. Without a NAWS report and with `query_size` set, the terminal is asked
    /// with [`SIZE_QUERY`] and given another `limit` to answer. Application bytes received
    /// meanwhile are kept in [`Handshake::early_input`]. A client that closes its side ends
    /// negotiation early; that is reported in [`Handshake::client_closed`], not as an error.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn negotiate(&mut self, limit: Duration, query_size: bool) -> BridgeResult<Handshake> {
        let mut offers = BytesMut::new();
        self.reader.codec.begin_negotiation();
        self.reader.codec.flush_responses(&mut offers)?;
        self.writer.write_raw(&offers).await?;

        let mut early_input = BytesMut::new();
        let mut client_closed = false;
        let deadline = Instant::now() + limit;
        while self.awaiting_naws() {
            match self.read_until(deadline, &mut early_input).await? {
                Progress::Received => {}
                Progress::Elapsed => break,
                Progress::Closed => {
                    client_closed = true;
                    break;
                }
            }
        }

        let mut window_size = self.reader.codec.window_size();
        if window_size.is_none() && query_size && !client_closed {
            self.writer.write_raw(SIZE_QUERY).await?;
            let deadline = Instant::now() + limit;
            loop {
                if let Some(size) = take_size_report(&mut early_input) {
                    window_size = Some(size);
                    break;
                }
                if let Some(size) = self.reader.codec.window_size() {
                    window_size = Some(size);
                    break;
                }
                match self.read_until(deadline, &mut early_input).await? {
                    Progress::Received => {}
                    Progress::Elapsed => break,
                    Progress::Closed => {
                        client_closed = true;
                        break;
                    }
                }
            }
        }

        debug!(
            size = ?window_size,
            pending = self.reader.codec.negotiation_pending(),
            early = early_input.len(),
            client_closed,
            "negotiation finished"
        );
        Ok(Handshake {
            window_size,
            early_input,
            client_closed,
        })
    }

    fn awaiting_naws(&self) -> bool {
        let codec = &self.reader.codec;
        codec.window_size().is_none()
            && (codec.negotiation_pending()
                || codec.is_enabled_remote(TelnetOption::NAWS))
    }

    /// One read bounded by `deadline`
    async fn read_until(&mut self, deadline: Instant, early: &mut BytesMut) -> BridgeResult<Progress> {
        match timeout_at(deadline, self.reader.read()).await {
            Err(_elapsed) => Ok(Progress::Elapsed),
            Ok(Ok(Some(input))) => {
                early.extend_from_slice(&input.data);
                self.writer.write_raw(&input.replies).await?;
                Ok(Progress::Received)
            }
            Ok(Ok(None)) => Ok(Progress::Closed),
            Ok(Err(error)) => Err(error),
        }
    }

    /// Write a line of text to the client, escaped
    pub async fn write_line(&mut self, text: &str) -> BridgeResult<()> {
        self.writer.write_output(text.as_bytes()).await?;
        Ok(())
    }

    /// Close the connection's write direction
    pub async fn close(&mut self) {
        self.writer.close().await;
    }

    /// Split into independently owned directions
    pub fn into_split(self) -> (ClientReader, ClientWriter) {
        (self.reader, self.writer)
    }
}

/// Removes the first complete `ESC [ 8 ; rows ; cols t` report from `buffer`
pub(crate) fn take_size_report(buffer: &mut BytesMut) -> Option<WindowSize> {
    let start = buffer
        .windows(SIZE_REPORT_PREFIX.len())
        .position(|window| window == SIZE_REPORT_PREFIX)?;
    let body_start = start + SIZE_REPORT_PREFIX.len();
    let body_len = buffer[body_start..].iter().position(|byte| *byte == b't')?;
    let body = std::str::from_utf8(&buffer[body_start..body_start + body_len]).ok()?;
    let (rows, cols) = body.split_once(';')?;
    let rows: u16 = rows.parse().ok()?;
    let cols: u16 = cols.parse().ok()?;

    let tail = buffer.split_off(body_start + body_len + 1);
    buffer.truncate(start);
    buffer.unsplit(tail);
    if rows == 0 || cols == 0 {
        return None;
    }
    Some(WindowSize::new(cols, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TelnetConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server, _) = listener.accept().await.unwrap();
        let connection = TelnetConnection::wrap(server, SessionId::new(1)).unwrap();
        (connection, client.await.unwrap())
    }

    #[test]
    fn size_report_is_extracted() {
        let mut buffer = BytesMut::from(&b"ab\x1b[8;40;100tcd"[..]);
        assert_eq!(take_size_report(&mut buffer), Some(WindowSize::new(100, 40)));
        assert_eq!(&buffer[..], b"abcd");
    }

    #[test]
    fn incomplete_size_report_is_kept() {
        let mut buffer = BytesMut::from(&b"\x1b[8;40;1"[..]);
        assert_eq!(take_size_report(&mut buffer), None);
        assert_eq!(&buffer[..], b"\x1b[8;40;1");

        let mut garbage = BytesMut::from(&b"\x1b[8;x;yt"[..]);
        assert_eq!(take_size_report(&mut garbage), None);
    }

    #[tokio::test]
    async fn negotiate_with_naws_client() {
        let (mut connection, mut client) = pair().await;
        let handshake = tokio::spawn(async move {
            let result = connection
                .negotiate(Duration::from_secs(2), false)
                .await
                .unwrap();
            (connection, result)
        });

        let mut offers = [0u8; 18];
        client.read_exact(&mut offers).await.unwrap();
        assert_eq!(&offers[..3], &[consts::IAC, consts::WILL, consts::option::ECHO]);

        let mut reply = Vec::new();
        for option in [consts::option::ECHO, consts::option::SGA, consts::option::BINARY] {
            reply.extend_from_slice(&[consts::IAC, consts::DO, option]);
        }
        for option in [consts::option::BINARY, consts::option::SGA, consts::option::NAWS] {
            reply.extend_from_slice(&[consts::IAC, consts::WILL, option]);
        }
        reply.extend_from_slice(b"hi");
        reply.extend_from_slice(&[
            consts::IAC,
            consts::SB,
            consts::option::NAWS,
            0,
            100,
            0,
            40,
            consts::IAC,
            consts::SE,
        ]);
        client.write_all(&reply).await.unwrap();

        let (connection, result) = handshake.await.unwrap();
        assert_eq!(result.window_size, Some(WindowSize::new(100, 40)));
        assert_eq!(&result.early_input[..], b"hi");
        let (reader, _writer) = connection.into_split();
        assert!(reader.codec().is_enabled_remote(TelnetOption::NAWS));
    }

    #[tokio::test]
    async fn negotiate_falls_back_to_size_query() {
        let (mut connection, mut client) = pair().await;
        let handshake = tokio::spawn(async move {
            connection
                .negotiate(Duration::from_millis(300), true)
                .await
                .unwrap()
        });

        // A raw client: ignores negotiation, but its terminal answers the size query.
        let mut seen = Vec::new();
        while !seen.ends_with(SIZE_QUERY) {
            let mut chunk = [0u8; 64];
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            seen.extend_from_slice(&chunk[..n]);
        }
        client.write_all(b"\x1b[8;30;90t").await.unwrap();

        let result = handshake.await.unwrap();
        assert_eq!(result.window_size, Some(WindowSize::new(90, 30)));
        assert!(result.early_input.is_empty());
    }

    #[tokio::test]
    async fn silent_client_times_out_without_size() {
        let (mut connection, _client) = pair().await;
        let started = Instant::now();
        let result = connection
            .negotiate(Duration::from_millis(100), false)
            .await
            .unwrap();
        assert_eq!(result.window_size, None);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn client_close_ends_negotiation_with_early_input() {
        let (mut connection, mut client) = pair().await;
        client.write_all(b"ls\n").await.unwrap();
        client.shutdown().await.unwrap();

        let started = Instant::now();
        let result = connection
            .negotiate(Duration::from_secs(5), true)
            .await
            .unwrap();
        assert!(result.client_closed);
        assert_eq!(&result.early_input[..], b"ls\n");
        assert_eq!(result.window_size, None);
        assert!(started.elapsed() < Duration::from_secs(5));

        // No size query is sent to a client that already closed.
        drop(connection);
        let mut seen = Vec::new();
        client.read_to_end(&mut seen).await.unwrap();
        assert!(!contains_query(&seen));
    }

    fn contains_query(bytes: &[u8]) -> bool {
        bytes.windows(SIZE_QUERY.len()).any(|window| window == SIZE_QUERY)
    }

    #[tokio::test]
    async fn reader_maps_commands_and_writer_escapes() {
        let (connection, mut client) = pair().await;
        let (mut reader, mut writer) = connection.into_split();

        client
            .write_all(&[b'a', consts::IAC, consts::IP, consts::IAC, consts::AYT, consts::IAC, consts::IAC])
            .await
            .unwrap();
        let input = reader.read().await.unwrap().unwrap();
        assert_eq!(&input.data[..], &[b'a', consts::ETX, consts::IAC]);
        assert_eq!(&input.replies[..], ARE_YOU_THERE_REPLY);
        assert_eq!(input.wire_len, 7);

        assert_eq!(writer.write_output(&[1, 0xFF, 2]).await.unwrap(), 4);
        let mut echoed = [0u8; 4];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, [1, 0xFF, 0xFF, 2]);

        drop(client);
        assert!(reader.read().await.unwrap().is_none());
    }
}
