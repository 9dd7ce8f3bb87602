//! Connection states and the events reported to the signaling layer
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


use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Initial,
    /// Every required transport is running
    Started,
    /// Local candidates gathered; the local description can be signalled
    Gathered,
    /// Media can flow
    Ready,
    /// A transport failed; absorbing
    Failed,
    /// Closed by the owner
    Finished,
}

impl ConnectionState {
    /// Legacy numeric code understood by existing signaling layers
    pub fn code(&self) -> u16 {
        match self {
            ConnectionState::Initial => 101,
            ConnectionState::Started => 102,
            ConnectionState::Gathered => 103,
            ConnectionState::Ready => 104,
            ConnectionState::Finished => 105,
            ConnectionState::Failed => 500,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ConnectionState::Initial => 0,
            ConnectionState::Started => 1,
            ConnectionState::Gathered => 2,
            ConnectionState::Ready => 3,
            ConnectionState::Failed | ConnectionState::Finished => 4,
        }
    }

    /// No transport event moves a connection out of these
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Finished)
    }

    /// Gathering finished and nothing terminal happened since
    pub fn has_gathered(&self) -> bool {
        !self.is_terminal() && self.rank() >= ConnectionState::Gathered.rank()
    }

    /// Whether moving from `self` to `next` is allowed
    ///
    /// States only move forward; FAILED is reachable from any non-terminal
    /// state.
    pub fn can_advance_to(&self, next: ConnectionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == ConnectionState::Failed || next.rank() > self.rank()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Initial => "initial",
            ConnectionState::Started => "started",
            ConnectionState::Gathered => "gathered",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
            ConnectionState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Trickled candidate as the browser API expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMessage {
    pub sdp_mid: String,
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: usize,
}

/// Something the signaling layer should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The aggregate state changed. GATHERED carries the local
    /// description, FAILED the last remote description.
    StateChanged {
        state: ConnectionState,
        message: Option<String>,
    },
    /// A local offer is ready to be sent
    OfferReady { sdp: String },
    /// A remote description was applied to a media stream
    SdpProcessed { stream_id: String, sdp: String },
    /// A local candidate to trickle
    Candidate(CandidateMessage),
}

impl ConnectionEvent {
    /// Legacy numeric code of the event
    pub fn code(&self) -> u16 {
        match self {
            ConnectionEvent::StateChanged { state, .. } => state.code(),
            ConnectionEvent::OfferReady { .. } => 202,
            ConnectionEvent::SdpProcessed { .. } => 203,
            ConnectionEvent::Candidate(_) => 201,
        }
    }

    /// Payload as text: descriptions verbatim, candidates as JSON
    pub fn message(&self) -> String {
        match self {
            ConnectionEvent::StateChanged { message, .. } => message.clone().unwrap_or_default(),
            ConnectionEvent::OfferReady { sdp } => sdp.clone(),
            ConnectionEvent::SdpProcessed { sdp, .. } => sdp.clone(),
            ConnectionEvent::Candidate(candidate) => {
                serde_json::to_string(candidate).unwrap_or_default()
            }
        }
    }

    pub fn stream_id(&self) -> Option<&str> {
        match self {
            ConnectionEvent::SdpProcessed { stream_id, .. } => Some(stream_id),
            _ => None,
        }
    }
}

/// Receives connection events; called from the connection's task queue
pub trait ConnectionEventListener: Send + Sync {
    fn on_connection_event(&self, event: ConnectionEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_only_moves_forward() {
        use ConnectionState::*;

        assert!(Initial.can_advance_to(Started));
        assert!(Initial.can_advance_to(Ready));
        assert!(Started.can_advance_to(Gathered));
        assert!(!Gathered.can_advance_to(Started));
        assert!(!Ready.can_advance_to(Gathered));
        assert!(!Ready.can_advance_to(Ready));
        assert!(Ready.can_advance_to(Failed));
        assert!(Initial.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Ready));
        assert!(!Failed.can_advance_to(Failed));
        assert!(!Finished.can_advance_to(Started));

        assert!(!Started.has_gathered());
        assert!(Gathered.has_gathered());
        assert!(Ready.has_gathered());
        assert!(!Failed.has_gathered());
    }

    #[test]
    fn test_legacy_codes() {
        assert_eq!(ConnectionState::Initial.code(), 101);
        assert_eq!(ConnectionState::Ready.code(), 104);
        assert_eq!(ConnectionState::Failed.code(), 500);
        let event = ConnectionEvent::SdpProcessed {
            stream_id: "s1".to_string(),
            sdp: "v=0".to_string(),
        };
        assert_eq!(event.code(), 203);
        assert_eq!(event.stream_id(), Some("s1"));
    }

    #[test]
    fn test_candidate_message_json() {
        let event = ConnectionEvent::Candidate(CandidateMessage {
            sdp_mid: "video".to_string(),
            candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".to_string(),
            sdp_mline_index: 1,
        });
        assert_eq!(event.code(), 201);

        let value: serde_json::Value = serde_json::from_str(&event.message()).unwrap();
        assert_eq!(value["sdpMid"], "video");
        assert_eq!(value["sdpMLineIndex"], 1);
        assert_eq!(value["candidate"], "candidate:1 1 udp 1 10.0.0.1 5000 typ host");
    }
}
