//! Outbound RTP header-extension processing
//!
//! Knows which extension ids were negotiated and stamps the ones the relay
//! owns on the way out. Currently that is abs-send-time, a 24-bit 6.18
//! fixed-point send timestamp in seconds.
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


use crate::rtp_handler::{is_rtcp, DataPacket, RtpHeader};
use crate::session_description::SessionDescription;
use bytes::BytesMut;
use sfu_config::{ExtMap, MediaType};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ABS_SEND_TIME_URI: &str = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";

/// Header-extension table of a connection
#[derive(Debug, Clone, Default)]
pub struct ExtensionProcessor {
    supported: Vec<ExtMap>,
    negotiated: Vec<ExtMap>,
}

impl ExtensionProcessor {
    /// Processor understanding the configured extensions, none negotiated yet
    pub fn new(supported: &[ExtMap]) -> Self {
        ExtensionProcessor {
            supported: supported.to_vec(),
            negotiated: Vec::new(),
        }
    }

    /// Adopt the negotiated extensions of `description` this processor supports
    pub fn set_description(&mut self, description: &SessionDescription) {
        self.negotiated = description
            .negotiated_extensions
            .iter()
            .filter(|ext| {
                self.supported
                    .iter()
                    .any(|s| s.uri == ext.uri && s.media_type == ext.media_type)
            })
            .cloned()
            .collect();
    }

    /// Extensions in effect
    pub fn supported_extension_map(&self) -> &[ExtMap] {
        &self.negotiated
    }

    fn id_for(&self, uri: &str, media: Option<MediaType>) -> Option<u8> {
        self.negotiated
            .iter()
            .find(|ext| ext.uri == uri && media.map_or(true, |m| ext.media_type == m))
            .map(|ext| ext.id)
    }

    /// Stamp relay-owned extensions of an outbound packet
    ///
    /// RTCP, malformed packets and packets without a one-byte extension
    /// block pass through untouched.
    pub fn process_outbound(&self, packet: DataPacket) -> DataPacket {
        self.stamp_abs_send_time(packet, abs_send_time_now())
    }

    /// Write `send_time` (24-bit 6.18 seconds) into the abs-send-time element
    pub fn stamp_abs_send_time(&self, packet: DataPacket, send_time: u32) -> DataPacket {
        let Some(id) = self.id_for(ABS_SEND_TIME_URI, packet.media_type) else {
            return packet;
        };
        if is_rtcp(&packet.data) {
            return packet;
        }
        let Ok(header) = RtpHeader::parse(&packet.data) else {
            return packet;
        };
        let Some(block) = header
            .extension
            .filter(|block| block.profile == RtpHeader::ONE_BYTE_PROFILE)
        else {
            return packet;
        };
        let area = &packet.data[block.offset..block.offset + block.length];
        let Some(offset) = find_one_byte_element(area, id, 3) else {
            return packet;
        };

        let mut data = BytesMut::from(&packet.data[..]);
        let position = block.offset + offset;
        data[position..position + 3].copy_from_slice(&send_time.to_be_bytes()[1..]);

        DataPacket {
            data: data.freeze(),
            media_type: packet.media_type,
        }
    }
}

/// Offset of the data of element `id` with `len` bytes (RFC 8285 one-byte form)
fn find_one_byte_element(area: &[u8], id: u8, len: usize) -> Option<usize> {
    let mut index = 0;
    while index < area.len() {
        let byte = area[index];
        if byte == 0 {
            // Padding
            index += 1;
            continue;
        }
        let element_id = byte >> 4;
        let element_len = (byte & 0x0F) as usize + 1;
        if element_id == 15 {
            return None;
        }
        let start = index + 1;
        if start + element_len > area.len() {
            return None;
        }
        if element_id == id && element_len == len {
            return Some(start);
        }
        index = start + element_len;
    }
    None
}

/// `since_epoch` as 6.18 fixed-point seconds, wrapped to 24 bits
fn abs_send_time(since_epoch: Duration) -> u32 {
    (((since_epoch.as_micros() << 18) / 1_000_000) & 0x00FF_FFFF) as u32
}

fn abs_send_time_now() -> u32 {
    abs_send_time(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default(),
    )
}
