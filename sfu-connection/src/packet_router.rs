//! Inbound packet routing
//!
//! Delivers decrypted packets from a transport to the media streams that
//! own their SSRC. Compound RTCP is split into blocks and each block routed
//! on its own; REMB feedback goes to the bandwidth distributor instead.
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


use crate::bandwidth::BandwidthDistributor;
use crate::media_stream::MediaStream;
use crate::rtcp::rtcp_blocks;
use crate::rtp_handler::{is_rtcp, DataPacket, RtpHeader};
use crate::stream_registry::{credited_streams, owners_of, StreamRegistry};
use crate::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Route statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    /// Deliveries to a stream (a packet owned by two streams counts twice)
    pub packets_routed: u64,
    /// Bytes delivered
    pub bytes_routed: u64,
    /// Packets or blocks no stream owned, or that failed to parse
    pub packets_dropped: u64,
    /// REMB reports handed to the distributor
    pub bitrate_estimates: u64,
}

#[derive(Default)]
struct RouteCounters {
    packets_routed: AtomicU64,
    bytes_routed: AtomicU64,
    packets_dropped: AtomicU64,
    bitrate_estimates: AtomicU64,
}

/// Packet router
pub struct PacketRouter {
    streams: StreamRegistry,
    distributor: Mutex<Box<dyn BandwidthDistributor>>,
    counters: RouteCounters,
}

impl PacketRouter {
    /// Create a router with no streams
    pub fn new(distributor: Box<dyn BandwidthDistributor>) -> Self {
        PacketRouter {
            streams: StreamRegistry::new(),
            distributor: Mutex::new(distributor),
            counters: RouteCounters::default(),
        }
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    /// Route one packet received on `transport`
    pub fn route(&self, packet: DataPacket, transport: &Arc<dyn Transport>) {
        let streams = self.streams.snapshot();
        if is_rtcp(&packet.data) {
            self.route_rtcp(packet, &streams, transport);
            return;
        }

        match RtpHeader::ssrc_of(&packet.data) {
            Ok(ssrc) => self.deliver(ssrc, packet, &streams, transport),
            Err(err) => {
                debug!(error = %err, "Dropping malformed RTP packet");
                self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn route_rtcp(
        &self,
        packet: DataPacket,
        streams: &[Arc<dyn MediaStream>],
        transport: &Arc<dyn Transport>,
    ) {
        for block in rtcp_blocks(&packet.data) {
            let block = match block {
                Ok(block) => block,
                Err(err) => {
                    // Blocks already routed stay routed
                    debug!(error = %err, "Stopping at malformed RTCP block");
                    self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            };

            if let Some(remb) = block.remb() {
                let credited = credited_streams(streams, &remb.ssrcs);
                trace!(
                    bitrate = remb.bitrate,
                    sender_ssrc = remb.sender_ssrc,
                    streams = credited.len(),
                    "Distributing REMB"
                );
                self.distributor
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .distribute(remb.bitrate, remb.sender_ssrc, &credited, transport);
                self.counters.bitrate_estimates.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let Some(ssrc) = block.routing_ssrc() else {
                self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            let rtcp = DataPacket::new(block.to_bytes(), packet.media_type);
            self.deliver(ssrc, rtcp, streams, transport);
        }
    }

    fn deliver(
        &self,
        ssrc: u32,
        packet: DataPacket,
        streams: &[Arc<dyn MediaStream>],
        transport: &Arc<dyn Transport>,
    ) {
        let mut delivered = false;
        for stream in owners_of(streams, ssrc) {
            self.counters.packets_routed.fetch_add(1, Ordering::Relaxed);
            self.counters
                .bytes_routed
                .fetch_add(packet.len() as u64, Ordering::Relaxed);
            stream.on_packet_from_transport(packet.clone(), transport);
            delivered = true;
        }
        if !delivered {
            trace!(ssrc, "No stream owns SSRC");
            self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> RouteStats {
        RouteStats {
            packets_routed: self.counters.packets_routed.load(Ordering::Relaxed),
            bytes_routed: self.counters.bytes_routed.load(Ordering::Relaxed),
            packets_dropped: self.counters.packets_dropped.load(Ordering::Relaxed),
            bitrate_estimates: self.counters.bitrate_estimates.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateInfo;
    use crate::rtcp::Remb;
    use crate::session_description::{IceCredentials, SessionDescription};
    use crate::transport::{CandidatePair, TransportState};
    use bytes::{Bytes, BytesMut};
    use sfu_config::MediaType;

    struct RecordingStream {
        id: &'static str,
        source: u32,
        sink: u32,
        received: Mutex<Vec<Bytes>>,
    }

    impl RecordingStream {
        fn new(id: &'static str, source: u32, sink: u32) -> Arc<Self> {
            Arc::new(RecordingStream {
                id,
                source,
                sink,
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<Bytes> {
            self.received.lock().unwrap().clone()
        }
    }

    impl MediaStream for RecordingStream {
        fn id(&self) -> String {
            self.id.to_string()
        }
        fn label(&self) -> String {
            self.id.to_string()
        }
        fn is_ready(&self) -> bool {
            true
        }
        fn is_publisher(&self) -> bool {
            false
        }
        fn audio_sink_ssrc(&self) -> u32 {
            0
        }
        fn video_sink_ssrc(&self) -> u32 {
            self.sink
        }
        fn is_source_ssrc(&self, ssrc: u32) -> bool {
            ssrc == self.source
        }
        fn is_sink_ssrc(&self, ssrc: u32) -> bool {
            ssrc == self.sink
        }
        fn set_remote_description(&self, _description: &SessionDescription) {}
        fn on_packet_from_transport(&self, packet: DataPacket, _transport: &Arc<dyn Transport>) {
            self.received.lock().unwrap().push(packet.data);
        }
        fn request_keyframe(&self) {}
        fn set_transport_diagnostics(&self, _audio: &str, _video: &str) {}
    }

    struct NullTransport;

    impl Transport for NullTransport {
        fn start(&self) {}
        fn write(&self, _data: Bytes) {}
        fn set_remote_candidates(&self, _candidates: &[CandidateInfo], _bundle: bool) -> bool {
            true
        }
        fn set_remote_credentials(&self, _credentials: &IceCredentials) {}
        fn set_received_last_candidate(&self) {}
        fn process_local_description(&self, _description: &mut SessionDescription) {}
        fn close(&self) {}
        fn selected_candidate_pair(&self) -> CandidatePair {
            CandidatePair::default()
        }
        fn state(&self) -> TransportState {
            TransportState::Ready
        }
        fn media_type(&self) -> MediaType {
            MediaType::Video
        }
    }

    struct CountingDistributor(Arc<Mutex<Vec<(u64, usize)>>>);

    impl BandwidthDistributor for CountingDistributor {
        fn distribute(
            &mut self,
            bitrate: u64,
            _sender_ssrc: u32,
            streams: &[Arc<dyn MediaStream>],
            _transport: &Arc<dyn Transport>,
        ) {
            self.0.lock().unwrap().push((bitrate, streams.len()));
        }
    }

    fn rtp(ssrc: u32) -> Bytes {
        let mut data = vec![0x80, 96, 0, 1, 0, 0, 0, 1];
        data.extend_from_slice(&ssrc.to_be_bytes());
        data.extend_from_slice(b"payload");
        Bytes::from(data)
    }

    fn receiver_report(ssrc: u32) -> Vec<u8> {
        let mut data = vec![0x80, 201, 0, 1];
        data.extend_from_slice(&ssrc.to_be_bytes());
        data
    }

    fn receiver_report_about(sender: u32, reported: u32) -> Vec<u8> {
        let mut data = vec![0x81, 201, 0, 7];
        data.extend_from_slice(&sender.to_be_bytes());
        data.extend_from_slice(&reported.to_be_bytes());
        data.extend_from_slice(&[0; 20]);
        data
    }

    fn pli(sender: u32, media: u32) -> Vec<u8> {
        let mut data = vec![0x81, 206, 0, 2];
        data.extend_from_slice(&sender.to_be_bytes());
        data.extend_from_slice(&media.to_be_bytes());
        data
    }

    fn router() -> (PacketRouter, Arc<Mutex<Vec<(u64, usize)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = PacketRouter::new(Box::new(CountingDistributor(calls.clone())));
        (router, calls)
    }

    #[test]
    fn test_rtp_goes_to_owner() {
        let (router, _) = router();
        let a = RecordingStream::new("a", 1111, 2222);
        let b = RecordingStream::new("b", 3333, 4444);
        router.streams().add(a.clone());
        router.streams().add(b.clone());
        let transport: Arc<dyn Transport> = Arc::new(NullTransport);

        router.route(DataPacket::new(rtp(1111), Some(MediaType::Video)), &transport);
        router.route(DataPacket::new(rtp(4444), Some(MediaType::Video)), &transport);
        router.route(DataPacket::new(rtp(9999), Some(MediaType::Video)), &transport);

        assert_eq!(a.received(), vec![rtp(1111)]);
        assert_eq!(b.received(), vec![rtp(4444)]);

        let stats = router.stats();
        assert_eq!(stats.packets_routed, 2);
        assert_eq!(stats.packets_dropped, 1);
    }

    #[test]
    fn test_compound_rtcp_split_per_block() {
        let (router, calls) = router();
        let a = RecordingStream::new("a", 1111, 2222);
        let b = RecordingStream::new("b", 3333, 4444);
        router.streams().add(a.clone());
        router.streams().add(b.clone());
        let transport: Arc<dyn Transport> = Arc::new(NullTransport);

        let remb = Remb {
            sender_ssrc: 7,
            bitrate: 500_000,
            ssrcs: vec![2222, 4444, 2222],
        };
        let mut compound = BytesMut::new();
        compound.extend_from_slice(&receiver_report(1111));
        compound.extend_from_slice(&remb.serialize());
        compound.extend_from_slice(&pli(9, 4444));

        router.route(DataPacket::new(compound.freeze(), Some(MediaType::Video)), &transport);

        assert_eq!(a.received(), vec![Bytes::from(receiver_report(1111))]);
        assert_eq!(b.received(), vec![Bytes::from(pli(9, 4444))]);
        assert_eq!(calls.lock().unwrap().as_slice(), &[(500_000, 2)]);
        assert_eq!(router.stats().bitrate_estimates, 1);
    }

    #[test]
    fn test_subscriber_receiver_report_reaches_sink_owner() {
        let (router, _) = router();
        let subscriber = RecordingStream::new("sub", 1111, 4001);
        router.streams().add(subscriber.clone());
        let transport: Arc<dyn Transport> = Arc::new(NullTransport);

        // Sender SSRC 1 is the browser's, no stream owns it
        let mut compound = receiver_report_about(1, 4001);
        compound.extend_from_slice(&pli(1, 4001));
        router.route(DataPacket::new(Bytes::from(compound), Some(MediaType::Video)), &transport);

        assert_eq!(
            subscriber.received(),
            vec![Bytes::from(receiver_report_about(1, 4001)), Bytes::from(pli(1, 4001))]
        );
        assert_eq!(router.stats().packets_dropped, 0);
        assert_eq!(router.stats().packets_routed, 2);
    }

    #[test]
    fn test_malformed_rtcp_keeps_earlier_blocks() {
        let (router, _) = router();
        let a = RecordingStream::new("a", 1111, 2222);
        router.streams().add(a.clone());
        let transport: Arc<dyn Transport> = Arc::new(NullTransport);

        let mut data = receiver_report(1111);
        // Declares 16 bytes, carries 8
        data.extend_from_slice(&[0x80, 201, 0, 3, 0, 0, 0, 1]);
        router.route(DataPacket::new(Bytes::from(data), None), &transport);

        assert_eq!(a.received(), vec![Bytes::from(receiver_report(1111))]);
        assert_eq!(router.stats().packets_dropped, 1);
    }
}
