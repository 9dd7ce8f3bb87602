//! RTCP (RTP Control Protocol) views
//!
//! Walks compound RTCP packets (RFC 3550 Section 6) block by block and
//! decodes the Receiver Estimated Maximum Bitrate feedback message
//! (draft-alvestrand-rmcat-remb) used for bandwidth redistribution.
// Copyright 2025 Francisco F. Pinochet
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


use crate::error::{ConnectionError, ConnectionResult};
use bytes::{BufMut, Bytes, BytesMut};

/// RTCP packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcpPacketType {
    /// Sender Report (SR) - 200
    SenderReport,
    /// Receiver Report (RR) - 201
    ReceiverReport,
    /// Source Description (SDES) - 202
    SourceDescription,
    /// Goodbye (BYE) - 203
    Goodbye,
    /// Application Defined (APP) - 204
    ApplicationDefined,
    /// Transport layer feedback (RTPFB, RFC 4585) - 205
    TransportFeedback,
    /// Payload-specific feedback (PSFB, RFC 4585) - 206
    PayloadFeedback,
    /// Anything else in the RTCP range
    Other(u8),
}

impl RtcpPacketType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            200 => RtcpPacketType::SenderReport,
            201 => RtcpPacketType::ReceiverReport,
            202 => RtcpPacketType::SourceDescription,
            203 => RtcpPacketType::Goodbye,
            204 => RtcpPacketType::ApplicationDefined,
            205 => RtcpPacketType::TransportFeedback,
            206 => RtcpPacketType::PayloadFeedback,
            other => RtcpPacketType::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            RtcpPacketType::SenderReport => 200,
            RtcpPacketType::ReceiverReport => 201,
            RtcpPacketType::SourceDescription => 202,
            RtcpPacketType::Goodbye => 203,
            RtcpPacketType::ApplicationDefined => 204,
            RtcpPacketType::TransportFeedback => 205,
            RtcpPacketType::PayloadFeedback => 206,
            RtcpPacketType::Other(value) => *value,
        }
    }
}

/// RTCP common header (RFC 3550 Section 6.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    /// Version (must be 2)
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Reception report count, source count or feedback message type
    pub count: u8,
    /// Packet type
    pub packet_type: RtcpPacketType,
    /// Length in 32-bit words minus 1
    pub length: u16,
}

impl RtcpHeader {
    /// Header size in bytes
    pub const SIZE: usize = 4;

    /// Parse RTCP header from bytes
    pub fn parse(data: &[u8]) -> ConnectionResult<Self> {
        if data.len() < Self::SIZE {
            return Err(ConnectionError::RtcpParse(
                "RTCP header too short".to_string(),
            ));
        }

        let first_byte = data[0];
        let version = (first_byte >> 6) & 0x03;
        if version != 2 {
            return Err(ConnectionError::RtcpParse(format!(
                "Invalid RTCP version: {}",
                version
            )));
        }

        Ok(RtcpHeader {
            version,
            padding: (first_byte & 0x20) != 0,
            count: first_byte & 0x1F,
            packet_type: RtcpPacketType::from_u8(data[1]),
            length: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Size of the whole block this header starts, in bytes
    pub fn block_len(&self) -> usize {
        (self.length as usize + 1) * 4
    }

    /// Blocks addressed to a media source SSRC at offset 8: RTPFB, PSFB
    /// and receiver reports carrying at least one report block
    pub fn is_feedback(&self) -> bool {
        match self.packet_type {
            RtcpPacketType::TransportFeedback | RtcpPacketType::PayloadFeedback => true,
            RtcpPacketType::ReceiverReport => self.count >= 1,
            _ => false,
        }
    }
}

/// One block of a compound RTCP packet
#[derive(Debug, Clone, Copy)]
pub struct RtcpBlock<'a> {
    pub header: RtcpHeader,
    /// The whole block, header included
    pub data: &'a [u8],
}

impl<'a> RtcpBlock<'a> {
    fn word(&self, offset: usize) -> Option<u32> {
        self.data
            .get(offset..offset + 4)
            .map(|bytes| u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// SSRC of the packet sender
    pub fn ssrc(&self) -> Option<u32> {
        self.word(4)
    }

    /// SSRC of the media source a feedback message refers to
    pub fn media_source_ssrc(&self) -> Option<u32> {
        self.word(8)
    }

    /// SSRC used to find the streams this block belongs to
    pub fn routing_ssrc(&self) -> Option<u32> {
        if self.header.is_feedback() {
            self.media_source_ssrc()
        } else {
            self.ssrc()
        }
    }

    /// Copy this block into its own buffer
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.data)
    }

    /// Decode as REMB if this is one
    pub fn remb(&self) -> Option<Remb> {
        Remb::parse(self)
    }
}

/// Iterator over the blocks of a compound RTCP packet
///
/// Yields an error and stops at the first block whose header is invalid
/// or whose declared length runs past the buffer.
pub struct RtcpBlocks<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

/// Iterate the blocks of a compound RTCP packet
pub fn rtcp_blocks(data: &[u8]) -> RtcpBlocks<'_> {
    RtcpBlocks {
        data,
        offset: 0,
        failed: false,
    }
}

impl<'a> Iterator for RtcpBlocks<'a> {
    type Item = ConnectionResult<RtcpBlock<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let remaining = &self.data[self.offset..];
        let header = match RtcpHeader::parse(remaining) {
            Ok(header) => header,
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };

        let block_len = header.block_len();
        if block_len > remaining.len() {
            self.failed = true;
            return Some(Err(ConnectionError::RtcpParse(format!(
                "RTCP block length {} exceeds remaining {} bytes",
                block_len,
                remaining.len()
            ))));
        }

        self.offset += block_len;
        Some(Ok(RtcpBlock {
            header,
            data: &remaining[..block_len],
        }))
    }
}

/// Receiver Estimated Maximum Bitrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remb {
    /// SSRC of the receiver sending the estimate
    pub sender_ssrc: u32,
    /// Estimated bitrate in bits per second
    pub bitrate: u64,
    /// SSRCs the estimate applies to
    pub ssrcs: Vec<u32>,
}

impl Remb {
    /// Feedback message type for application layer feedback
    pub const FMT: u8 = 15;
    const IDENTIFIER: &'static [u8; 4] = b"REMB";
    const MANTISSA_BITS: u32 = 18;

    fn parse(block: &RtcpBlock<'_>) -> Option<Remb> {
        let data = block.data;
        if block.header.packet_type != RtcpPacketType::PayloadFeedback
            || block.header.count != Self::FMT
            || data.len() < 20
            || &data[12..16] != Self::IDENTIFIER
        {
            return None;
        }

        let num_ssrc = data[16] as usize;
        let exponent = (data[17] >> 2) as u32;
        let mantissa =
            ((data[17] as u64 & 0x03) << 16) | ((data[18] as u64) << 8) | data[19] as u64;
        let bitrate = if exponent > mantissa.leading_zeros() {
            u64::MAX
        } else {
            mantissa << exponent
        };

        // Trust the buffer over the declared count
        let ssrcs = data[20..]
            .chunks_exact(4)
            .take(num_ssrc)
            .map(|bytes| u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();

        Some(Remb {
            sender_ssrc: block.ssrc()?,
            bitrate,
            ssrcs,
        })
    }

    /// Serialize as a standalone PSFB block
    pub fn serialize(&self) -> Bytes {
        let mut exponent = 0u32;
        let mut mantissa = self.bitrate;
        while mantissa >= (1 << Self::MANTISSA_BITS) {
            mantissa >>= 1;
            exponent += 1;
        }

        let ssrc_count = self.ssrcs.len().min(255);
        let length_words = 4 + ssrc_count;
        let mut buf = BytesMut::with_capacity((length_words + 1) * 4);

        buf.put_u8(0x80 | Self::FMT);
        buf.put_u8(RtcpPacketType::PayloadFeedback.as_u8());
        buf.put_u16(length_words as u16);
        buf.put_u32(self.sender_ssrc);
        // Media source is unused for REMB
        buf.put_u32(0);
        buf.put_slice(Self::IDENTIFIER);
        buf.put_u8(ssrc_count as u8);
        buf.put_u8(((exponent as u8) << 2) | ((mantissa >> 16) as u8 & 0x03));
        buf.put_u16((mantissa & 0xFFFF) as u16);
        for ssrc in self.ssrcs.iter().take(ssrc_count) {
            buf.put_u32(*ssrc);
        }

        buf.freeze()
    }
}
