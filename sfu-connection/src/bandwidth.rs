//! Bandwidth distribution
//!
//! A REMB report carries one estimate for several SSRCs. A distributor
//! decides how much of that estimate each credited stream gets.
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


use crate::media_stream::MediaStream;
use crate::transport::Transport;
use sfu_config::DistributorKind;
use std::sync::Arc;
use tracing::trace;

/// Strategy splitting an estimated bitrate across media streams
pub trait BandwidthDistributor: Send {
    /// Apportion `bitrate` (bps), reported by `sender_ssrc`, over `streams`
    fn distribute(
        &mut self,
        bitrate: u64,
        sender_ssrc: u32,
        streams: &[Arc<dyn MediaStream>],
        transport: &Arc<dyn Transport>,
    );
}

/// Build the distributor selected by configuration
pub fn distributor_for(kind: DistributorKind) -> Box<dyn BandwidthDistributor> {
    match kind {
        DistributorKind::MaxVideo => Box::new(MaxVideoDistributor),
        DistributorKind::TargetVideo => Box::new(TargetVideoDistributor),
    }
}

/// Even split, each share capped at the stream's max video bitrate
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxVideoDistributor;

impl BandwidthDistributor for MaxVideoDistributor {
    fn distribute(
        &mut self,
        bitrate: u64,
        sender_ssrc: u32,
        streams: &[Arc<dyn MediaStream>],
        _transport: &Arc<dyn Transport>,
    ) {
        if streams.is_empty() {
            return;
        }
        let share = bitrate / streams.len() as u64;
        for stream in streams {
            let max = stream.max_video_bitrate();
            let assigned = if max > 0 { share.min(max) } else { share };
            trace!(sender_ssrc, stream_id = %stream.id(), assigned, "Max video share");
            stream.apply_bitrate_estimate(assigned);
        }
    }
}

/// Streams with a target get it while the budget lasts; what is left goes
/// evenly to streams without one, or to the last stream
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetVideoDistributor;

impl BandwidthDistributor for TargetVideoDistributor {
    fn distribute(
        &mut self,
        bitrate: u64,
        sender_ssrc: u32,
        streams: &[Arc<dyn MediaStream>],
        _transport: &Arc<dyn Transport>,
    ) {
        if streams.is_empty() {
            return;
        }

        let mut remaining = bitrate;
        let mut shares: Vec<u64> = streams
            .iter()
            .map(|stream| {
                let share = stream.target_video_bitrate().min(remaining);
                remaining -= share;
                share
            })
            .collect();

        let untargeted: Vec<usize> = streams
            .iter()
            .enumerate()
            .filter(|(_, stream)| stream.target_video_bitrate() == 0)
            .map(|(index, _)| index)
            .collect();
        if untargeted.is_empty() {
            if let Some(last) = shares.last_mut() {
                *last += remaining;
            }
        } else {
            let each = remaining / untargeted.len() as u64;
            for index in untargeted {
                shares[index] = each;
            }
        }

        for (stream, assigned) in streams.iter().zip(shares) {
            trace!(sender_ssrc, stream_id = %stream.id(), assigned, "Target video share");
            stream.apply_bitrate_estimate(assigned);
        }
    }
}
