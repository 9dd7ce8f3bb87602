//! Per-call connection controller for the SFU
//!
//! A [`Connection`] pairs one remote peer with the relay. It covers:
//! - SDP offer/answer negotiation and DTLS role selection
//! - ICE candidate exchange, trickled or embedded
//! - Transport lifecycle (one bundled transport or one per media type)
//! - Fan-in of transport states into a single connection state
//! - Routing of inbound RTP/RTCP to media streams by SSRC
//! - Splitting receiver bitrate estimates (REMB) across streams
//!
//! Transports (ICE/DTLS/SRTP) and media streams are supplied by the
//! embedding process through the [`Transport`], [`TransportFactory`] and
//! [`MediaStream`] traits.
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


pub mod error;
pub mod rtp_handler;
pub mod rtcp;
pub mod sdp;
pub mod candidate;
pub mod session_description;
pub mod transport;
pub mod media_stream;
pub mod stream_registry;
pub mod bandwidth;
pub mod extension;
pub mod events;
pub mod task_queue;
pub mod packet_router;
pub mod connection;
mod negotiation;
mod state_machine;

// Re-export main types
pub use error::{ConnectionError, ConnectionResult};
pub use rtp_handler::{DataPacket, RtpHeader};
pub use rtcp::{rtcp_blocks, Remb, RtcpBlock, RtcpHeader, RtcpPacketType};
pub use candidate::{CandidateInfo, CandidateType};
pub use session_description::{
    Direction, DtlsRole, IceCredentials, Profile, SessionDescription,
};
pub use transport::{
    CandidatePair, Transport, TransportFactory, TransportListener, TransportParams,
    TransportState,
};
pub use media_stream::{MediaStream, DEFAULT_AUDIO_SINK_SSRC, DEFAULT_VIDEO_SINK_SSRC};
pub use stream_registry::{StreamRegistry, StreamSnapshot};
pub use bandwidth::{
    distributor_for, BandwidthDistributor, MaxVideoDistributor, TargetVideoDistributor,
};
pub use extension::ExtensionProcessor;
pub use events::{CandidateMessage, ConnectionEvent, ConnectionEventListener, ConnectionState};
pub use task_queue::TaskHandle;
pub use packet_router::RouteStats;
pub use connection::Connection;
pub use sfu_config::{ConnectionSettings, MediaType};
