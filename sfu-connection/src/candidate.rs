//! ICE candidates as exchanged in SDP
//!
//! Parses and renders the `candidate` attribute grammar of RFC 8839
//! Section 5.1. Connectivity checks are the transport's business; the
//! connection only stores, forwards and signals candidates.
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
use sfu_config::MediaType;
use std::fmt;

/// ICE candidate type (RFC 8445 Section 5.1.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    /// Host candidate (directly connected interface)
    Host,
    /// Server reflexive candidate (via STUN server)
    ServerReflexive,
    /// Peer reflexive candidate (discovered during connectivity checks)
    PeerReflexive,
    /// Relayed candidate (via TURN server)
    Relayed,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relayed => "relay",
        }
    }

    fn parse(value: &str) -> ConnectionResult<Self> {
        match value {
            "host" => Ok(CandidateType::Host),
            "srflx" => Ok(CandidateType::ServerReflexive),
            "prflx" => Ok(CandidateType::PeerReflexive),
            "relay" => Ok(CandidateType::Relayed),
            other => Err(ConnectionError::CandidateParse(format!(
                "Unknown candidate type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ICE candidate (RFC 8445 Section 5.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateInfo {
    /// Foundation
    pub foundation: String,
    /// Component ID (1 for RTP, 2 for RTCP)
    pub component: u32,
    /// Transport protocol (udp, tcp)
    pub transport: String,
    pub priority: u32,
    /// IP address or mDNS host name
    pub address: String,
    pub port: u16,
    pub candidate_type: CandidateType,
    /// Related address and port (for srflx/relay candidates)
    pub related: Option<(String, u16)>,
    /// `tcptype` extension for TCP candidates
    pub tcp_type: Option<String>,
    pub generation: Option<u32>,
    /// Media section the candidate was signalled for
    pub media_type: MediaType,
    /// ICE username fragment of the section it belongs to
    pub username: String,
    /// ICE password of the section it belongs to
    pub password: String,
}

impl CandidateInfo {
    /// Priority per RFC 8445 Section 5.1.2.1 with maximum local preference
    pub fn compute_priority(candidate_type: CandidateType, component: u32) -> u32 {
        let type_preference: u32 = match candidate_type {
            CandidateType::Host => 126,
            CandidateType::PeerReflexive => 110,
            CandidateType::ServerReflexive => 100,
            CandidateType::Relayed => 0,
        };
        let component_preference = 256u32.saturating_sub(component);

        (type_preference << 24) | (65535 << 8) | component_preference
    }

    /// Build a host candidate
    pub fn host(media_type: MediaType, component: u32, address: &str, port: u16) -> Self {
        CandidateInfo {
            foundation: format!("host{}", component),
            component,
            transport: "udp".to_string(),
            priority: Self::compute_priority(CandidateType::Host, component),
            address: address.to_string(),
            port,
            candidate_type: CandidateType::Host,
            related: None,
            tcp_type: None,
            generation: None,
            media_type,
            username: String::new(),
            password: String::new(),
        }
    }

    /// Parse a candidate line
    ///
    /// Accepts `a=candidate:...`, `candidate:...` or the bare attribute value.
    pub fn parse(line: &str, media_type: MediaType) -> ConnectionResult<Self> {
        let value = line.trim();
        let value = value.strip_prefix("a=").unwrap_or(value);
        let value = value.strip_prefix("candidate:").unwrap_or(value);

        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 8 || parts[6] != "typ" {
            return Err(ConnectionError::CandidateParse(format!(
                "Invalid candidate: {}",
                line.trim()
            )));
        }

        let invalid = |what: &str| {
            ConnectionError::CandidateParse(format!("Invalid {} in candidate: {}", what, line.trim()))
        };

        let mut candidate = CandidateInfo {
            foundation: parts[0].to_string(),
            component: parts[1].parse().map_err(|_| invalid("component"))?,
            transport: parts[2].to_ascii_lowercase(),
            priority: parts[3].parse().map_err(|_| invalid("priority"))?,
            address: parts[4].to_string(),
            port: parts[5].parse().map_err(|_| invalid("port"))?,
            candidate_type: CandidateType::parse(parts[7])?,
            related: None,
            tcp_type: None,
            generation: None,
            media_type,
            username: String::new(),
            password: String::new(),
        };

        // Extension attributes come as name/value pairs
        let mut related_address = None;
        let mut related_port = None;
        for pair in parts[8..].chunks(2) {
            let [name, value] = pair else {
                break;
            };
            match *name {
                "raddr" => related_address = Some(value.to_string()),
                "rport" => related_port = Some(value.parse().map_err(|_| invalid("rport"))?),
                "tcptype" => candidate.tcp_type = Some(value.to_string()),
                "generation" => {
                    candidate.generation = Some(value.parse().map_err(|_| invalid("generation"))?)
                }
                _ => {}
            }
        }
        if let (Some(address), Some(port)) = (related_address, related_port) {
            candidate.related = Some((address, port));
        }

        Ok(candidate)
    }

    /// Render as an attribute value without the `a=` prefix
    pub fn to_attribute_value(&self) -> String {
        let mut value = format!(
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.transport,
            self.priority,
            self.address,
            self.port,
            self.candidate_type
        );
        if let Some((ref address, port)) = self.related {
            value.push_str(&format!(" raddr {} rport {}", address, port));
        }
        if let Some(ref tcp_type) = self.tcp_type {
            value.push_str(&format!(" tcptype {}", tcp_type));
        }
        if let Some(generation) = self.generation {
            value.push_str(&format!(" generation {}", generation));
        }
        value
    }
}
