//! Secure transport contract
//!
//! A transport owns ICE, DTLS and SRTP for one media type, or for both
//! when bundled. The connection only drives it through [`Transport`] and
//! hears back through [`TransportListener`].
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


use crate::candidate::CandidateInfo;
use crate::rtp_handler::DataPacket;
use crate::session_description::{IceCredentials, SessionDescription};
use bytes::Bytes;
use sfu_config::{IceConfig, MediaType};
use std::sync::Arc;

/// Transport state as reported to the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Initial,
    /// ICE agent running
    Started,
    /// Local candidate gathering complete
    Gathered,
    /// ICE connected and DTLS handshake done
    Ready,
    Finished,
    Failed,
}

/// Selected ICE candidate pair, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePair {
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    /// Candidate type of the remote end (host, srflx, relay...)
    pub remote_candidate_type: String,
}

/// Parameters a transport is constructed with
#[derive(Debug, Clone)]
pub struct TransportParams {
    /// Media carried (video also stands for the bundled transport)
    pub media_type: MediaType,
    /// Transport name, "audio" or "video"
    pub name: String,
    pub connection_id: String,
    pub bundle: bool,
    /// Multiplex RTP and RTCP on one component
    pub rtcp_mux: bool,
    pub ice_config: IceConfig,
    /// Remote credentials when already known (answering)
    pub remote_credentials: Option<IceCredentials>,
    /// Whether this side sent the offer
    pub is_offerer: bool,
}

/// Secure transport for one or both media types
///
/// Callbacks into the [`TransportListener`] may arrive on any thread.
/// `state()` must already return the new state when a state change is
/// reported; the connection compares it across transports.
pub trait Transport: Send + Sync {
    /// Begin ICE gathering and connectivity checks
    fn start(&self);

    /// Encrypt and send one packet
    fn write(&self, data: Bytes);

    /// Hand over remote candidates; returns whether any was accepted
    fn set_remote_candidates(&self, candidates: &[CandidateInfo], bundle: bool) -> bool;

    /// Replace the remote ICE credentials (ICE restart without new sockets)
    fn set_remote_credentials(&self, credentials: &IceCredentials);

    /// The remote peer signalled end of candidates
    fn set_received_last_candidate(&self);

    /// Contribute local credentials, candidates and fingerprint
    fn process_local_description(&self, description: &mut SessionDescription);

    fn close(&self);

    fn selected_candidate_pair(&self) -> CandidatePair;

    fn state(&self) -> TransportState;

    fn media_type(&self) -> MediaType;
}

/// Callbacks from a transport into its connection
pub trait TransportListener: Send + Sync {
    fn on_transport_state_changed(&self, state: TransportState, media_type: MediaType);

    fn on_packet_received(&self, packet: DataPacket, media_type: MediaType);

    fn on_candidate(&self, candidate: CandidateInfo, media_type: MediaType);
}

/// Builds transports for a connection
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        params: TransportParams,
        listener: Arc<dyn TransportListener>,
    ) -> Arc<dyn Transport>;
}
