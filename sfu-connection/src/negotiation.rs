//! Offer/answer handling and ICE candidate exchange
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
use crate::connection::ConnectionCore;
use crate::error::ConnectionResult;
use crate::events::{CandidateMessage, ConnectionEvent, ConnectionState};
use crate::media_stream::{is_advertised_audio_ssrc, is_advertised_video_ssrc};
use crate::session_description::{Direction, DtlsRole, IceCredentials, Profile, SessionDescription};
use crate::transport::{Transport, TransportParams};
use sfu_config::MediaType;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl ConnectionCore {
    pub(crate) fn create_offer(&mut self, video: bool, audio: bool, bundle: bool) {
        if !self.sending {
            debug!("Ignoring offer request, connection not sending");
            return;
        }
        self.bundle = bundle;
        self.video_enabled = video;
        self.audio_enabled = audio;
        self.local.create_offer(video, audio, bundle);
        self.local.dtls_role = DtlsRole::ActPass;
        if self.local.internal_dtls_role == DtlsRole::ActPass {
            self.local.internal_dtls_role = DtlsRole::Passive;
        }
        info!(video, audio, bundle, "Creating offer");

        let streams = self.shared.router.streams().snapshot();
        for stream in streams.iter() {
            if !stream.is_ready() || stream.is_publisher() {
                continue;
            }
            let label = stream.label();
            let video_ssrc = stream.video_sink_ssrc();
            if self.video_enabled && is_advertised_video_ssrc(video_ssrc) {
                self.local.video_ssrc_map.insert(label.clone(), vec![video_ssrc]);
            }
            let audio_ssrc = stream.audio_sink_ssrc();
            if self.audio_enabled && is_advertised_audio_ssrc(audio_ssrc) {
                self.local.audio_ssrc_map.insert(label, audio_ssrc);
            }
        }

        if self.bundle {
            if self.transports.video.is_none() && (self.video_enabled || self.audio_enabled) {
                self.transports.video = Some(self.open_transport(MediaType::Video, true, None, true));
            }
        } else {
            if self.transports.video.is_none() && self.video_enabled {
                self.transports.video = Some(self.open_transport(MediaType::Video, true, None, true));
            }
            if self.transports.audio.is_none() && self.audio_enabled {
                self.transports.audio = Some(self.open_transport(MediaType::Audio, true, None, true));
            }
        }
        self.sync_transports();

        let sdp = self.render_local();
        self.shared.notify(ConnectionEvent::OfferReady { sdp });
    }

    pub(crate) fn set_remote_description(
        &mut self,
        mut description: SessionDescription,
        stream_ids: Vec<String>,
    ) {
        if !self.sending {
            debug!("Ignoring remote description, connection not sending");
            return;
        }
        description.inherit_candidates(&self.remote);
        self.remote = description;
        self.process_remote(&stream_ids);
    }

    fn process_remote(&mut self, stream_ids: &[String]) {
        if !self.first_remote_processed && self.local.internal_dtls_role == DtlsRole::ActPass {
            self.local.internal_dtls_role = DtlsRole::Active;
        }
        self.local.dtls_role = self.local.internal_dtls_role;
        debug!(
            dtls_role = self.local.dtls_role.as_str(),
            first = !self.first_remote_processed,
            "Processing remote description"
        );

        if !self.first_remote_processed {
            self.bundle = self.remote.is_bundle;
            self.local.set_offer(&self.remote);
            self.extensions.set_description(&self.local);
            self.local
                .update_supported_extensions(self.extensions.supported_extension_map());

            self.audio_enabled = self.remote.has_audio;
            self.video_enabled = self.remote.has_video;

            if self.remote.profile == Profile::Savpf && self.remote.is_fingerprint {
                self.answer_transports();
            }

            // Gathering already flushed once; apply what this description brought
            if self.state().has_gathered() {
                self.flush_remote_candidates(None);
            } else {
                for media in self.gathered_media() {
                    self.flush_remote_candidates(Some(media));
                }
            }
        }

        self.propagate_remote(stream_ids);
        self.first_remote_processed = true;
    }

    /// Create or re-credential transports for the remote description
    fn answer_transports(&mut self) {
        let rtcp_mux = self.remote.is_rtcp_mux;
        if self.remote.has_video || self.bundle {
            let media = if self.remote.has_video {
                MediaType::Video
            } else {
                MediaType::Audio
            };
            let credentials = self.remote.credentials(media).clone();
            match &self.transports.video {
                Some(transport) => transport.set_remote_credentials(&credentials),
                None => {
                    self.transports.video =
                        Some(self.open_transport(MediaType::Video, rtcp_mux, Some(credentials), false));
                }
            }
        }
        if !self.bundle && self.remote.has_audio {
            let credentials = self.remote.credentials(MediaType::Audio).clone();
            match &self.transports.audio {
                Some(transport) => transport.set_remote_credentials(&credentials),
                None => {
                    self.transports.audio =
                        Some(self.open_transport(MediaType::Audio, rtcp_mux, Some(credentials), false));
                }
            }
        }
        self.sync_transports();
    }

    fn propagate_remote(&mut self, stream_ids: &[String]) {
        let streams = self.shared.router.streams().snapshot();
        for stream in streams.iter() {
            stream.set_remote_description(&self.remote);
            let stream_id = stream.id();
            if stream_ids.contains(&stream_id) {
                let sdp = self.local_description();
                self.shared
                    .notify(ConnectionEvent::SdpProcessed { stream_id, sdp });
            }
        }
    }

    pub(crate) fn open_transport(
        &self,
        media: MediaType,
        rtcp_mux: bool,
        remote_credentials: Option<IceCredentials>,
        is_offerer: bool,
    ) -> Arc<dyn Transport> {
        let params = TransportParams {
            media_type: media,
            name: media.as_str().to_string(),
            connection_id: self.id.clone(),
            bundle: self.bundle,
            rtcp_mux,
            ice_config: self.settings.ice.clone(),
            remote_credentials,
            is_offerer,
        };
        debug!(transport = %params.name, bundle = self.bundle, is_offerer, "Creating transport");
        let transport = self.factory().create(params, self.transport_listener());
        transport.start();
        transport
    }

    pub(crate) fn copy_to_local_description(&mut self, description: SessionDescription) {
        if !self.sending {
            return;
        }
        self.local.copy_info_from(&description);
        self.extensions.set_description(&self.local);
        self.local
            .update_supported_extensions(self.extensions.supported_extension_map());
    }

    pub(crate) fn add_remote_candidate(
        &mut self,
        mid: &str,
        mline_index: i32,
        fragment: &str,
    ) -> ConnectionResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        if mline_index == -1 {
            debug!("Remote end of candidates");
            for transport in self.transports.iter() {
                transport.set_received_last_candidate();
            }
            return Ok(());
        }

        let is_video = mid == MediaType::Video.as_str()
            || (self.remote.has_video && mid == self.remote.video_mid)
            || usize::try_from(mline_index)
                .ok()
                .is_some_and(|index| self.remote.video_mline == Some(index));
        let media = if is_video {
            MediaType::Video
        } else {
            MediaType::Audio
        };

        let mut scratch = SessionDescription::default();
        scratch.set_credentials(media, self.remote.credentials(media).clone());
        let candidates = scratch.add_candidate_fragment(fragment, media)?;

        let transport = if media == MediaType::Video || self.bundle {
            self.transports.video.as_ref()
        } else {
            self.transports.audio.as_ref()
        };
        match transport {
            Some(transport) => {
                transport.set_remote_candidates(&candidates, self.bundle);
            }
            None => warn!(mid, mline_index, "No transport for remote candidate yet"),
        }

        for candidate in candidates {
            self.remote.add_candidate(candidate);
        }
        Ok(())
    }

    pub(crate) fn on_local_candidate(&mut self, candidate: CandidateInfo, media: MediaType) {
        let text = self.local.add_candidate(candidate);
        debug!(candidate = %text, ?media, "Local candidate");
        if !self.trickle_enabled {
            return;
        }

        if !self.bundle {
            self.trickle(media, &text);
            return;
        }
        if self.remote.has_audio {
            self.trickle(MediaType::Audio, &text);
        }
        if self.remote.has_video {
            self.trickle(MediaType::Video, &text);
        }
    }

    fn trickle(&self, media: MediaType, candidate: &str) {
        let sdp_mid = match media {
            MediaType::Audio => self.local.audio_mid.clone(),
            MediaType::Video => self.local.video_mid.clone(),
        };
        self.shared.notify(ConnectionEvent::Candidate(CandidateMessage {
            sdp_mid,
            candidate: candidate.to_string(),
            sdp_mline_index: self.local.mline(media).unwrap_or(0),
        }));
    }

    /// Local description with announced SSRCs and directions recomputed
    pub(crate) fn local_description(&mut self) -> String {
        let streams = self.shared.router.streams().snapshot();
        for stream in streams.iter() {
            if !stream.is_ready() || stream.is_publisher() {
                continue;
            }
            let label = stream.label();
            let video_ssrc = stream.video_sink_ssrc();
            if is_advertised_video_ssrc(video_ssrc) {
                self.local.video_ssrc_map.insert(label.clone(), vec![video_ssrc]);
            }
            let audio_ssrc = stream.audio_sink_ssrc();
            if is_advertised_audio_ssrc(audio_ssrc) {
                self.local.audio_ssrc_map.insert(label, audio_ssrc);
            }
        }

        let sending_audio = !self.local.audio_ssrc_map.is_empty();
        let receiving_audio = !self.remote.audio_ssrc_map.is_empty();
        let sending_video = !self.local.video_ssrc_map.is_empty();
        let receiving_video = !self.remote.video_ssrc_map.is_empty();

        self.audio_enabled = sending_audio || receiving_audio;
        self.video_enabled = sending_video || receiving_video;
        self.local.audio_direction = Direction::from_flags(sending_audio, receiving_audio);
        self.local.video_direction = Direction::from_flags(sending_video, receiving_video);

        self.render_local()
    }

    /// Render the local description, letting transports add their ICE and
    /// DTLS attributes until the connection is ready
    pub(crate) fn render_local(&mut self) -> String {
        if self.state() != ConnectionState::Ready {
            if let Some(transport) = &self.transports.video {
                transport.process_local_description(&mut self.local);
            }
            if !self.bundle {
                if let Some(transport) = &self.transports.audio {
                    transport.process_local_description(&mut self.local);
                }
            }
        }
        self.local.profile = self.remote.profile;
        self.local.to_sdp()
    }
}
