//! RTP packet handling
//!
//! Bounds-checked views over packets travelling between transports and
//! media streams. Nothing here copies payload data; parsing only reads
//! the fixed header, the CSRC list and the header-extension block.
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
use bytes::Bytes;
use sfu_config::MediaType;

/// A packet moving between a transport and the media streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Raw (decrypted) packet bytes
    pub data: Bytes,
    /// Media the packet belongs to, when known. Selects the transport
    /// for outbound packets on unbundled connections.
    pub media_type: Option<MediaType>,
}

impl DataPacket {
    pub fn new(data: impl Into<Bytes>, media_type: Option<MediaType>) -> Self {
        DataPacket {
            data: data.into(),
            media_type,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// RTCP packet types occupy 192..=223 in the second byte (RFC 5761)
pub fn is_rtcp(data: &[u8]) -> bool {
    data.len() >= 4 && (192..=223).contains(&data[1])
}

/// Location of the header-extension block inside a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionBlock {
    /// Extension profile identifier (0xBEDE for one-byte headers)
    pub profile: u16,
    /// Offset of the first extension element
    pub offset: usize,
    /// Length of the element area in bytes
    pub length: usize,
}

/// RTP fixed header as defined in RFC 3550
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (must be 2)
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// CSRC count
    pub csrc_count: u8,
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: u8,
    /// Sequence number (16 bits)
    pub sequence_number: u16,
    /// Timestamp (32 bits)
    pub timestamp: u32,
    /// SSRC (Synchronization Source) identifier (32 bits)
    pub ssrc: u32,
    /// Header-extension block, if the X bit is set
    pub extension: Option<ExtensionBlock>,
    /// Total header length including CSRCs and extension
    pub header_len: usize,
}

impl RtpHeader {
    /// Minimum RTP header size (12 bytes)
    pub const MIN_SIZE: usize = 12;

    /// One-byte header extension profile (RFC 8285)
    pub const ONE_BYTE_PROFILE: u16 = 0xBEDE;

    /// Parse the RTP header at the start of `data`
    pub fn parse(data: &[u8]) -> ConnectionResult<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(ConnectionError::RtpParse(format!(
                "RTP header too short: {} bytes",
                data.len()
            )));
        }

        // First byte: V(2) P(1) X(1) CC(4)
        let first_byte = data[0];
        let version = (first_byte >> 6) & 0x03;
        if version != 2 {
            return Err(ConnectionError::RtpParse(format!(
                "Invalid RTP version: {}",
                version
            )));
        }
        let padding = (first_byte & 0x20) != 0;
        let has_extension = (first_byte & 0x10) != 0;
        let csrc_count = first_byte & 0x0F;

        // Second byte: M(1) PT(7)
        let marker = (data[1] & 0x80) != 0;
        let payload_type = data[1] & 0x7F;

        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut header_len = Self::MIN_SIZE + csrc_count as usize * 4;
        if data.len() < header_len {
            return Err(ConnectionError::RtpParse("Incomplete CSRC list".to_string()));
        }

        let extension = if has_extension {
            if data.len() < header_len + 4 {
                return Err(ConnectionError::RtpParse(
                    "Incomplete extension header".to_string(),
                ));
            }
            let profile = u16::from_be_bytes([data[header_len], data[header_len + 1]]);
            // Length is in 32-bit words
            let length =
                u16::from_be_bytes([data[header_len + 2], data[header_len + 3]]) as usize * 4;
            let offset = header_len + 4;
            if data.len() < offset + length {
                return Err(ConnectionError::RtpParse(
                    "Incomplete extension data".to_string(),
                ));
            }
            header_len = offset + length;
            Some(ExtensionBlock {
                profile,
                offset,
                length,
            })
        } else {
            None
        };

        Ok(RtpHeader {
            version,
            padding,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            extension,
            header_len,
        })
    }

    /// Read only the SSRC field (bytes 8..12)
    pub fn ssrc_of(data: &[u8]) -> ConnectionResult<u32> {
        if data.len() < Self::MIN_SIZE {
            return Err(ConnectionError::RtpParse(format!(
                "RTP header too short: {} bytes",
                data.len()
            )));
        }
        Ok(u32::from_be_bytes([data[8], data[9], data[10], data[11]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtp_header_parse_minimal() {
        let data = [
            0x80, 0x60, // V=2, P=0, X=0, CC=0, M=0, PT=96
            0x00, 0x01, // Sequence number = 1
            0x00, 0x00, 0x00, 0x01, // Timestamp = 1
            0x00, 0x00, 0x00, 0x6F, // SSRC = 111
        ];

        let header = RtpHeader::parse(&data).unwrap();
        assert_eq!(header.version, 2);
        assert!(!header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence_number, 1);
        assert_eq!(header.ssrc, 111);
        assert_eq!(header.extension, None);
        assert_eq!(header.header_len, 12);
        assert_eq!(RtpHeader::ssrc_of(&data).unwrap(), 111);
    }

    #[test]
    fn test_rtp_header_with_extension() {
        let data = [
            0x90, 0xE0, // V=2, X=1, M=1, PT=96
            0x00, 0x02, //
            0x00, 0x00, 0x00, 0x02, //
            0x00, 0x00, 0x00, 0x01, //
            0xBE, 0xDE, 0x00, 0x01, // one-byte profile, 1 word
            0x32, 0x00, 0x00, 0x00, // id=3 len=3 abs-send-time
            0xAA, // payload
        ];

        let header = RtpHeader::parse(&data).unwrap();
        assert!(header.marker);
        let ext = header.extension.unwrap();
        assert_eq!(ext.profile, RtpHeader::ONE_BYTE_PROFILE);
        assert_eq!(ext.offset, 16);
        assert_eq!(ext.length, 4);
        assert_eq!(header.header_len, 20);
    }

    #[test]
    fn test_rtp_header_rejects_truncated() {
        assert!(RtpHeader::parse(&[0x80, 0x60, 0x00]).is_err());
        // CC=2 but no CSRCs present
        let data = [0x82, 0x60, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1];
        assert!(RtpHeader::parse(&data).is_err());
        // Wrong version
        let data = [0x40, 0x60, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1];
        assert!(RtpHeader::parse(&data).is_err());
    }

    #[test]
    fn test_is_rtcp() {
        assert!(is_rtcp(&[0x80, 200, 0, 6]));
        assert!(is_rtcp(&[0x8F, 206, 0, 4]));
        assert!(!is_rtcp(&[0x80, 96, 0, 1]));
        assert!(!is_rtcp(&[0x80, 200]));
    }
}
