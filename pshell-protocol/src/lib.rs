// Copyright 2024 pshell contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wire types shared by the Shell Server and the Control Client.
//!
//! A pshell message is a fixed 8 byte header followed by a text payload.
//! Datagram transports (UDP, UNIX datagram) send one message per datagram,
//! with the payload length implied by the datagram length. Stream
//! transports (TCP, local) prefix the header+payload with an explicit 4
//! byte little endian length so a reader can frame messages out of a byte
//! stream. See [`write_framed`]/[`read_framed`] for the stream framing and
//! [`encode_datagram`]/[`decode_datagram`] for the datagram framing.

use std::io::{self, Read, Write};

use anyhow::{anyhow, Context};
use byteorder::{LittleEndian, ReadBytesExt as _, WriteBytesExt as _};

/// The protocol version this crate implements. A client and server must
/// agree on this value or the session is refused.
pub const VERSION: u8 = 1;

/// The initial, conservative payload size negotiated before either side
/// asks to grow it.
pub const DEFAULT_PAYLOAD_SIZE: usize = 1024 * 4;

/// The hard ceiling on the payload size, regardless of negotiation.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 64;

/// Size in bytes of [`MsgHeader`] on the wire: 1 (type) + 1 (respNeeded) +
/// 1 (dataNeeded) + 1 (status/pad) + 4 (seqNum).
pub const HEADER_SIZE: usize = 8;

/// Delimiter used to separate keywords in a `QueryCommands2` payload.
pub const COMMAND_DELIMITER: &str = "/";

/// The identifiers a Shell Server binder accepts in place of a literal
/// hostname.
pub const ANYHOST: &str = "anyhost";
pub const ANYBCAST: &str = "anybcast";
pub const LOCALHOST: &str = "localhost";
pub const MYHOST: &str = "myhost";

/// Message types. These values are part of the wire contract: a peer
/// speaking a different mapping is incompatible even at the same
/// [`VERSION`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    QueryVersion = 1,
    QueryPayloadSize = 2,
    QueryName = 3,
    /// Requested by `help`.
    QueryCommands1 = 4,
    /// Requested for tab completion; keywords are `/`-delimited.
    QueryCommands2 = 5,
    UpdatePayloadSize = 6,
    UserCommand = 7,
    CommandComplete = 8,
    QueryBanner = 9,
    QueryTitle = 10,
    QueryPrompt = 11,
    ControlCommand = 12,
}

impl TryFrom<u8> for MsgType {
    type Error = anyhow::Error;

    fn try_from(v: u8) -> anyhow::Result<Self> {
        match v {
            1 => Ok(MsgType::QueryVersion),
            2 => Ok(MsgType::QueryPayloadSize),
            3 => Ok(MsgType::QueryName),
            4 => Ok(MsgType::QueryCommands1),
            5 => Ok(MsgType::QueryCommands2),
            6 => Ok(MsgType::UpdatePayloadSize),
            7 => Ok(MsgType::UserCommand),
            8 => Ok(MsgType::CommandComplete),
            9 => Ok(MsgType::QueryBanner),
            10 => Ok(MsgType::QueryTitle),
            11 => Ok(MsgType::QueryPrompt),
            12 => Ok(MsgType::ControlCommand),
            _ => Err(anyhow!("unknown MsgType {}", v)),
        }
    }
}

/// The result the server's dispatcher reached for a `UserCommand` or
/// `ControlCommand`. Carried back to the caller in the header's status
/// byte (the fourth header byte, unused by the original wire layout) so a
/// Control Client can match on it without parsing response text.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatchStatus {
    Success = 0,
    NotFound = 1,
    InvalidArgCount = 2,
}

impl TryFrom<u8> for DispatchStatus {
    type Error = anyhow::Error;

    fn try_from(v: u8) -> anyhow::Result<Self> {
        match v {
            0 => Ok(DispatchStatus::Success),
            1 => Ok(DispatchStatus::NotFound),
            2 => Ok(DispatchStatus::InvalidArgCount),
            _ => Err(anyhow!("unknown DispatchStatus {}", v)),
        }
    }
}

/// The fixed 8 byte message header. Field order is the wire contract; both
/// ends must match this byte layout regardless of host endianness.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MsgHeader {
    pub msg_type: MsgType,
    pub resp_needed: bool,
    pub data_needed: bool,
    /// Dispatch status for response messages; ignored on request messages.
    /// Occupies the header's fourth byte.
    pub status: DispatchStatus,
    pub seq_num: u32,
}

impl MsgHeader {
    pub fn request(msg_type: MsgType, resp_needed: bool, seq_num: u32) -> Self {
        MsgHeader {
            msg_type,
            resp_needed,
            data_needed: false,
            status: DispatchStatus::Success,
            seq_num,
        }
    }

    pub fn response(msg_type: MsgType, status: DispatchStatus, seq_num: u32) -> Self {
        MsgHeader { msg_type, resp_needed: false, data_needed: false, status, seq_num }
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.msg_type as u8)?;
        w.write_u8(self.resp_needed as u8)?;
        w.write_u8(self.data_needed as u8)?;
        w.write_u8(self.status as u8)?;
        w.write_u32::<LittleEndian>(self.seq_num)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> anyhow::Result<Self> {
        let msg_type = MsgType::try_from(r.read_u8().context("reading msg_type")?)?;
        let resp_needed = r.read_u8().context("reading resp_needed")? != 0;
        let data_needed = r.read_u8().context("reading data_needed")? != 0;
        let status = DispatchStatus::try_from(r.read_u8().context("reading status")?)?;
        let seq_num = r.read_u32::<LittleEndian>().context("reading seq_num")?;
        Ok(MsgHeader { msg_type, resp_needed, data_needed, status, seq_num })
    }
}

/// A fully decoded message: header plus its text payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireMessage {
    pub header: MsgHeader,
    pub payload: Vec<u8>,
}

/// Encode a message for a datagram transport: the payload length is left
/// implicit in the returned buffer's length, which the caller sends as a
/// single UDP/UNIX datagram.
pub fn encode_datagram(header: &MsgHeader, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(anyhow!(
            "payload of {} bytes exceeds the {} byte ceiling",
            payload.len(),
            MAX_PAYLOAD_SIZE
        ));
    }
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    header.write_to(&mut buf).context("writing header")?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode a single datagram (header + text payload, with the payload
/// boundary given by the datagram length itself).
pub fn decode_datagram(buf: &[u8]) -> anyhow::Result<WireMessage> {
    if buf.len() < HEADER_SIZE {
        return Err(anyhow!(
            "truncated frame: datagram of {} bytes is shorter than the {} byte header",
            buf.len(),
            HEADER_SIZE
        ));
    }
    let mut cursor = io::Cursor::new(&buf[..HEADER_SIZE]);
    let header = MsgHeader::read_from(&mut cursor)?;
    Ok(WireMessage { header, payload: buf[HEADER_SIZE..].to_vec() })
}

/// Write a message to a stream transport, framed with a little-endian u32
/// length prefix covering header+payload.
pub fn write_framed<W: Write>(w: &mut W, header: &MsgHeader, payload: &[u8]) -> anyhow::Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(anyhow!(
            "payload of {} bytes exceeds the {} byte ceiling",
            payload.len(),
            MAX_PAYLOAD_SIZE
        ));
    }
    let frame_len = (HEADER_SIZE + payload.len()) as u32;
    w.write_u32::<LittleEndian>(frame_len).context("writing frame length prefix")?;
    header.write_to(w).context("writing header")?;
    w.write_all(payload).context("writing payload")?;
    Ok(())
}

/// Read one framed message from a stream transport, looping on partial
/// reads until the whole frame has arrived.
pub fn read_framed<R: Read>(r: &mut R) -> anyhow::Result<WireMessage> {
    let frame_len = r.read_u32::<LittleEndian>().context("reading frame length prefix")? as usize;
    if frame_len < HEADER_SIZE {
        return Err(anyhow!(
            "truncated frame: length prefix {} is shorter than the {} byte header",
            frame_len,
            HEADER_SIZE
        ));
    }
    if frame_len > HEADER_SIZE + MAX_PAYLOAD_SIZE {
        return Err(anyhow!("frame of {} bytes exceeds the payload ceiling", frame_len));
    }

    let mut header_buf = vec![0u8; HEADER_SIZE];
    r.read_exact(&mut header_buf).context("reading header")?;
    let header = MsgHeader::read_from(&mut io::Cursor::new(header_buf))?;

    let mut payload = vec![0u8; frame_len - HEADER_SIZE];
    r.read_exact(&mut payload).context("reading payload")?;

    Ok(WireMessage { header, payload })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn datagram_round_trip() {
        let header = MsgHeader::request(MsgType::UserCommand, true, 42);
        let payload = b"echo hello world".to_vec();
        let buf = encode_datagram(&header, &payload).expect("encode to succeed");
        let decoded = decode_datagram(&buf).expect("decode to succeed");
        assert_eq!(decoded.header, header);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn framed_round_trip() {
        let header = MsgHeader::response(MsgType::CommandComplete, DispatchStatus::NotFound, 7);
        let payload = b"command not found".to_vec();

        let mut buf = Vec::new();
        write_framed(&mut buf, &header, &payload).expect("write to succeed");

        let mut cursor = io::Cursor::new(buf);
        let decoded = read_framed(&mut cursor).expect("read to succeed");
        assert_eq!(decoded.header, header);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn framed_handles_multiple_messages_back_to_back() {
        let mut buf = Vec::new();
        for i in 0..3u32 {
            let header = MsgHeader::request(MsgType::UserCommand, false, i);
            write_framed(&mut buf, &header, format!("cmd {i}").as_bytes()).unwrap();
        }

        let mut cursor = io::Cursor::new(buf);
        for i in 0..3u32 {
            let msg = read_framed(&mut cursor).expect("read to succeed");
            assert_eq!(msg.header.seq_num, i);
            assert_eq!(msg.payload, format!("cmd {i}").into_bytes());
        }
    }

    #[test]
    fn decode_datagram_rejects_truncated_header() {
        let err = decode_datagram(&[1, 2, 3]).expect_err("should reject short buffer");
        assert!(format!("{err:?}").contains("truncated frame"));
    }

    #[test]
    fn msg_type_round_trips_through_u8() {
        for t in [
            MsgType::QueryVersion,
            MsgType::QueryPayloadSize,
            MsgType::QueryName,
            MsgType::QueryCommands1,
            MsgType::QueryCommands2,
            MsgType::UpdatePayloadSize,
            MsgType::UserCommand,
            MsgType::CommandComplete,
            MsgType::QueryBanner,
            MsgType::QueryTitle,
            MsgType::QueryPrompt,
            MsgType::ControlCommand,
        ] {
            assert_eq!(MsgType::try_from(t as u8).unwrap(), t);
        }
        assert!(MsgType::try_from(0).is_err());
        assert!(MsgType::try_from(13).is_err());
    }
}
