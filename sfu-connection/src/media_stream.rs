//! Media stream contract
//!
//! A media stream is one logical publisher or subscriber multiplexed on a
//! connection. The connection never looks inside it: it routes packets by
//! SSRC ownership and pushes descriptions, keyframe requests and bitrate
//! estimates.
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


use crate::rtp_handler::DataPacket;
use crate::session_description::SessionDescription;
use crate::transport::Transport;
use std::sync::Arc;

/// Default sink SSRC of an audio stream that was never assigned one
pub const DEFAULT_AUDIO_SINK_SSRC: u32 = 44444;
/// Default sink SSRC of a video stream that was never assigned one
pub const DEFAULT_VIDEO_SINK_SSRC: u32 = 55543;

/// Whether `ssrc` is worth advertising in a local description
pub fn is_advertised_audio_ssrc(ssrc: u32) -> bool {
    ssrc != 0 && ssrc != DEFAULT_AUDIO_SINK_SSRC
}

/// Whether `ssrc` is worth advertising in a local description
pub fn is_advertised_video_ssrc(ssrc: u32) -> bool {
    ssrc != 0 && ssrc != DEFAULT_VIDEO_SINK_SSRC
}

/// Logical media stream driven by a connection
pub trait MediaStream: Send + Sync {
    fn id(&self) -> String;

    /// Label used as the stream's msid in descriptions
    fn label(&self) -> String;

    fn is_ready(&self) -> bool;

    /// Publishers send media into the relay; their sink SSRCs are not
    /// announced to the remote peer
    fn is_publisher(&self) -> bool;

    fn audio_sink_ssrc(&self) -> u32;

    fn video_sink_ssrc(&self) -> u32;

    fn is_source_ssrc(&self, ssrc: u32) -> bool;

    fn is_sink_ssrc(&self, ssrc: u32) -> bool;

    fn set_remote_description(&self, description: &SessionDescription);

    fn on_packet_from_transport(&self, packet: DataPacket, transport: &Arc<dyn Transport>);

    /// Ask the publisher side for a fresh keyframe
    fn request_keyframe(&self);

    /// Candidate types of the selected pairs, for stats
    fn set_transport_diagnostics(&self, audio: &str, video: &str);

    /// Upper bound for this stream's video bitrate in bps
    fn max_video_bitrate(&self) -> u64 {
        0
    }

    /// Preferred video bitrate in bps
    fn target_video_bitrate(&self) -> u64 {
        0
    }

    /// Receive the bitrate share a distributor decided for this stream
    fn apply_bitrate_estimate(&self, _bitrate: u64) {}
}
