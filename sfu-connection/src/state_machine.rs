//! Aggregate connection state
//!
//! Folds the states reported by one (bundled) or two transports into the
//! connection state. States only move forward; FAILED absorbs everything.
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
use crate::events::{ConnectionEvent, ConnectionState};
use crate::session_description::SessionDescription;
use crate::transport::TransportState;
use sfu_config::MediaType;
use tracing::{debug, error, info};

const MEDIA_TYPES: [MediaType; 2] = [MediaType::Video, MediaType::Audio];

impl ConnectionCore {
    pub(crate) fn on_transport_state(&mut self, reported: TransportState, media: MediaType) {
        if self.transports.is_empty() {
            error!(?reported, ?media, "Transport state update without transports");
            return;
        }
        let current = self.state();
        if current.is_terminal() {
            debug!(?reported, %current, "Ignoring transport state, connection is terminal");
            return;
        }

        let mut next = current;
        let mut message = None;
        match reported {
            TransportState::Started => {
                if self.bundle || self.all_transports_in(TransportState::Started, &self.remote) {
                    next = ConnectionState::Started;
                }
            }
            TransportState::Gathered => {
                if self.bundle {
                    self.flush_remote_candidates(None);
                    if !self.trickle_enabled {
                        next = ConnectionState::Gathered;
                        message = Some(self.render_local());
                    }
                } else {
                    self.flush_remote_candidates(Some(media));
                    if self.all_transports_in(TransportState::Gathered, &self.local)
                        && !self.trickle_enabled
                    {
                        next = ConnectionState::Gathered;
                        message = Some(self.render_local());
                    }
                }
            }
            TransportState::Ready => {
                if self.bundle || self.all_transports_in(TransportState::Ready, &self.remote) {
                    next = ConnectionState::Ready;
                }
            }
            TransportState::Failed => {
                next = ConnectionState::Failed;
                self.sending = false;
                message = Some(self.remote.to_sdp());
                error!(?media, "Transport failed");
            }
            other => debug!(state = ?other, ?media, "Transport state not tracked"),
        }

        if next == current {
            return;
        }
        if !current.can_advance_to(next) {
            debug!(%current, %next, "Ignoring backward state change");
            return;
        }

        self.shared.publish_state(next);
        info!(state = %next, code = next.code(), "Connection state changed");

        if next == ConnectionState::Ready {
            self.on_ready();
        }
        self.shared
            .notify(ConnectionEvent::StateChanged { state: next, message });
    }

    /// Every media present in `description` has a transport in `state`
    fn all_transports_in(&self, state: TransportState, description: &SessionDescription) -> bool {
        MEDIA_TYPES
            .into_iter()
            .filter(|media| description.has_media(*media))
            .all(|media| {
                self.transports
                    .for_media(media)
                    .is_some_and(|transport| transport.state() == state)
            })
    }

    fn on_ready(&self) {
        let pair_type = |media: MediaType, enabled: bool| {
            self.transports
                .for_media(media)
                .filter(|_| enabled)
                .map(|transport| transport.selected_candidate_pair().remote_candidate_type)
                .unwrap_or_default()
        };
        let video = pair_type(MediaType::Video, self.video_enabled);
        let audio = if self.bundle {
            // One transport carries both
            pair_type(MediaType::Video, self.audio_enabled)
        } else {
            pair_type(MediaType::Audio, self.audio_enabled)
        };
        debug!(audio = %audio, video = %video, "Selected candidate pairs");

        let streams = self.shared.router.streams().snapshot();
        for stream in streams.iter() {
            stream.set_transport_diagnostics(&audio, &video);
        }
        for stream in streams.iter() {
            stream.request_keyframe();
        }
    }

    /// Hand remote candidates learned so far to their transport
    ///
    /// Bundled connections send everything to the shared transport;
    /// otherwise candidates go to the transport of their media, optionally
    /// limited to `only`.
    pub(crate) fn flush_remote_candidates(&self, only: Option<MediaType>) {
        let candidates = self.remote.candidates();
        if candidates.is_empty() {
            return;
        }

        if self.bundle {
            if let Some(transport) = &self.transports.video {
                debug!(count = candidates.len(), "Applying remote candidates to bundled transport");
                transport.set_remote_candidates(candidates, true);
            }
            return;
        }

        for media in MEDIA_TYPES {
            if only.is_some_and(|only| only != media) {
                continue;
            }
            let Some(transport) = self.transports.for_media(media) else {
                continue;
            };
            let for_media: Vec<CandidateInfo> = candidates
                .iter()
                .filter(|candidate| candidate.media_type == media)
                .cloned()
                .collect();
            if !for_media.is_empty() {
                debug!(count = for_media.len(), ?media, "Applying remote candidates");
                transport.set_remote_candidates(&for_media, false);
            }
        }
    }

    /// Media whose transport finished gathering on its own
    pub(crate) fn gathered_media(&self) -> Vec<MediaType> {
        MEDIA_TYPES
            .into_iter()
            .filter(|media| {
                self.transports.for_media(*media).is_some_and(|transport| {
                    matches!(transport.state(), TransportState::Gathered | TransportState::Ready)
                })
            })
            .collect()
    }
}
