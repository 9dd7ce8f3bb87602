//! Negotiated session description
//!
//! [`SessionDescription`] is the meaning extracted from (or rendered into)
//! SDP text: which media are present, their ICE credentials and
//! candidates, DTLS setup role, directions, the SSRCs announced per stream
//! label and the payload types / header extensions both sides support.
//! A connection keeps one for the local side and one for the remote side.
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
use crate::error::{ConnectionError, ConnectionResult};
use crate::sdp::{Attribute, MediaSection, Origin, SdpDocument};
use sfu_config::{ConnectionSettings, ExtMap, MediaType, RtpMap};
use std::collections::BTreeMap;

/// DTLS setup role (RFC 4145 / RFC 5763)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DtlsRole {
    /// Either side may start the handshake
    #[default]
    ActPass,
    /// This side starts the handshake (DTLS client)
    Active,
    /// This side waits for the handshake (DTLS server)
    Passive,
}

impl DtlsRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DtlsRole::ActPass => "actpass",
            DtlsRole::Active => "active",
            DtlsRole::Passive => "passive",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "actpass" => Some(DtlsRole::ActPass),
            "active" => Some(DtlsRole::Active),
            "passive" => Some(DtlsRole::Passive),
            _ => None,
        }
    }
}

/// Media direction attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }

    /// Direction for a side that sends and/or receives media
    pub fn from_flags(sending: bool, receiving: bool) -> Self {
        match (sending, receiving) {
            (false, true) => Direction::RecvOnly,
            (true, false) => Direction::SendOnly,
            _ => Direction::SendRecv,
        }
    }
}

/// RTP profile of the media sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// RTP/AVPF (plain RTP with feedback)
    Avpf,
    /// UDP/TLS/RTP/SAVPF (DTLS-SRTP with feedback)
    #[default]
    Savpf,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Avpf => "RTP/AVPF",
            Profile::Savpf => "UDP/TLS/RTP/SAVPF",
        }
    }

    fn from_protocol(protocol: &str) -> Self {
        if protocol.contains("SAVP") {
            Profile::Savpf
        } else {
            Profile::Avpf
        }
    }
}

/// ICE username fragment and password
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceCredentials {
    pub username: String,
    pub password: String,
}

impl IceCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        IceCredentials {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

/// Negotiated view of one side of a session
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    supported_payloads: Vec<RtpMap>,
    supported_extensions: Vec<ExtMap>,

    pub has_audio: bool,
    pub has_video: bool,
    pub is_bundle: bool,
    pub is_rtcp_mux: bool,
    pub is_fingerprint: bool,
    pub profile: Profile,
    /// `<hash-function> <fingerprint>` as carried by `a=fingerprint`
    pub fingerprint: Option<String>,

    /// Setup role written into the description
    pub dtls_role: DtlsRole,
    /// Role this side actually plays once negotiation settled
    pub internal_dtls_role: DtlsRole,

    pub audio_direction: Direction,
    pub video_direction: Direction,

    /// Stream label to audio SSRC
    pub audio_ssrc_map: BTreeMap<String, u32>,
    /// Stream label to video SSRCs (several with simulcast)
    pub video_ssrc_map: BTreeMap<String, Vec<u32>>,

    /// m-line index of each media section
    pub audio_mline: Option<usize>,
    pub video_mline: Option<usize>,
    pub audio_mid: String,
    pub video_mid: String,

    pub negotiated_payloads: Vec<RtpMap>,
    pub negotiated_extensions: Vec<ExtMap>,

    audio_credentials: IceCredentials,
    video_credentials: IceCredentials,
    candidates: Vec<CandidateInfo>,

    session_id: u64,
    session_version: u64,
}

impl SessionDescription {
    /// Empty description supporting the configured payload and extension tables
    pub fn new(settings: &ConnectionSettings) -> Self {
        SessionDescription {
            supported_payloads: settings.rtp_mappings.clone(),
            supported_extensions: settings.ext_mappings.clone(),
            audio_mid: MediaType::Audio.as_str().to_string(),
            video_mid: MediaType::Video.as_str().to_string(),
            session_id: rand::random::<u32>() as u64,
            ..Default::default()
        }
    }

    /// Parse a complete SDP document
    pub fn parse(text: &str, settings: &ConnectionSettings) -> ConnectionResult<Self> {
        let doc = SdpDocument::parse(text)?;
        let mut desc = SessionDescription::new(settings);
        desc.apply_document(&doc)?;
        Ok(desc)
    }

    fn apply_document(&mut self, doc: &SdpDocument) -> ConnectionResult<()> {
        if let Some(ref origin) = doc.origin {
            self.session_id = origin.session_id;
            self.session_version = origin.session_version;
        }

        self.is_bundle = doc
            .attribute_values("group")
            .any(|group| group.split_whitespace().next() == Some("BUNDLE"));

        let session_credentials = IceCredentials::new(
            doc.attribute("ice-ufrag").unwrap_or_default(),
            doc.attribute("ice-pwd").unwrap_or_default(),
        );
        let session_fingerprint = doc.attribute("fingerprint").map(str::to_string);
        let session_setup = doc.attribute("setup").and_then(DtlsRole::parse);

        for (index, section) in doc.media.iter().enumerate() {
            let media = match section.media_type.as_str() {
                "audio" => MediaType::Audio,
                "video" => MediaType::Video,
                _ => continue,
            };

            let mid = section
                .attribute("mid")
                .unwrap_or(media.as_str())
                .to_string();
            let credentials = IceCredentials::new(
                section
                    .attribute("ice-ufrag")
                    .unwrap_or(session_credentials.username.as_str()),
                section
                    .attribute("ice-pwd")
                    .unwrap_or(session_credentials.password.as_str()),
            );

            match media {
                MediaType::Audio => {
                    self.has_audio = true;
                    self.audio_mline = Some(index);
                    self.audio_mid = mid;
                }
                MediaType::Video => {
                    self.has_video = true;
                    self.video_mline = Some(index);
                    self.video_mid = mid;
                }
            }

            self.profile = Profile::from_protocol(&section.protocol);
            self.is_rtcp_mux |= section.has_attribute("rtcp-mux");

            if let Some(fingerprint) = section
                .attribute("fingerprint")
                .map(str::to_string)
                .or_else(|| session_fingerprint.clone())
            {
                self.is_fingerprint = true;
                self.fingerprint = Some(fingerprint);
            }

            if let Some(role) = section
                .attribute("setup")
                .and_then(DtlsRole::parse)
                .or(session_setup)
            {
                self.dtls_role = role;
            }

            if let Some(direction) = section
                .attributes
                .iter()
                .find_map(|attr| Direction::parse(&attr.name))
            {
                match media {
                    MediaType::Audio => self.audio_direction = direction,
                    MediaType::Video => self.video_direction = direction,
                }
            }

            for line in section.attribute_values("candidate") {
                let mut candidate = CandidateInfo::parse(line, media)?;
                candidate.username = credentials.username.clone();
                candidate.password = credentials.password.clone();
                self.candidates.push(candidate);
            }

            self.collect_ssrcs(section, media);
            let payloads = self.negotiate_payloads(section, media);
            self.negotiated_payloads.extend(payloads);
            let extensions = self.negotiate_extensions(section, media);
            self.negotiated_extensions.extend(extensions);

            self.set_credentials(media, credentials);
        }

        if !self.has_audio && !self.has_video {
            return Err(ConnectionError::SdpParse(
                "No audio or video media section".to_string(),
            ));
        }

        Ok(())
    }

    /// Record the SSRCs announced by `a=ssrc` lines under their stream label
    fn collect_ssrcs(&mut self, section: &MediaSection, media: MediaType) {
        // Retransmission SSRCs are not routed as streams of their own
        let rtx: Vec<u32> = section
            .attribute_values("ssrc-group")
            .filter_map(|group| {
                let mut parts = group.split_whitespace();
                match parts.next() {
                    Some("FID") => parts.nth(1).and_then(|ssrc| ssrc.parse().ok()),
                    _ => None,
                }
            })
            .collect();

        let section_label = section
            .attribute("msid")
            .and_then(|msid| msid.split_whitespace().next())
            .map(str::to_string);

        let mut labels: Vec<(u32, Option<String>, Option<String>)> = Vec::new();
        for value in section.attribute_values("ssrc") {
            let Some((ssrc, rest)) = value.split_once(' ') else {
                continue;
            };
            let Ok(ssrc) = ssrc.parse::<u32>() else {
                continue;
            };
            if rtx.contains(&ssrc) {
                continue;
            }
            let entry = match labels.iter().position(|(known, _, _)| *known == ssrc) {
                Some(position) => &mut labels[position],
                None => {
                    labels.push((ssrc, None, None));
                    let last = labels.len() - 1;
                    &mut labels[last]
                }
            };
            match rest.split_once(':') {
                Some(("msid", value)) | Some(("mslabel", value)) => {
                    if let Some(label) = value.split_whitespace().next() {
                        entry.1 = Some(label.to_string());
                    }
                }
                Some(("cname", value)) => entry.2 = Some(value.trim().to_string()),
                _ => {}
            }
        }

        for (ssrc, label, cname) in labels {
            let Some(label) = label.or_else(|| section_label.clone()).or(cname) else {
                continue;
            };
            match media {
                MediaType::Audio => {
                    self.audio_ssrc_map.entry(label).or_insert(ssrc);
                }
                MediaType::Video => {
                    let ssrcs = self.video_ssrc_map.entry(label).or_default();
                    if !ssrcs.contains(&ssrc) {
                        ssrcs.push(ssrc);
                    }
                }
            }
        }
    }

    /// Payload types of `section` that match a supported codec
    fn negotiate_payloads(&self, section: &MediaSection, media: MediaType) -> Vec<RtpMap> {
        let mut negotiated = Vec::new();

        for format in &section.formats {
            let Ok(payload_type) = format.parse::<u8>() else {
                continue;
            };
            let prefix = format!("{} ", payload_type);
            let rtpmap = section
                .attribute_values("rtpmap")
                .find_map(|value| value.strip_prefix(&prefix));

            let supported = match rtpmap {
                Some(encoding) => {
                    let mut parts = encoding.trim().split('/');
                    let name = parts.next().unwrap_or_default();
                    let clock_rate = parts.next().and_then(|rate| rate.parse::<u32>().ok());
                    self.supported_payloads.iter().find(|map| {
                        map.media_type == media
                            && map.encoding_name.eq_ignore_ascii_case(name)
                            && Some(map.clock_rate) == clock_rate
                    })
                }
                // Static payload types may omit rtpmap
                None => self
                    .supported_payloads
                    .iter()
                    .find(|map| map.media_type == media && map.payload_type == payload_type),
            };
            let Some(supported) = supported else {
                continue;
            };

            let mut map = supported.clone();
            map.payload_type = payload_type;

            let format_parameters: BTreeMap<String, String> = section
                .attribute_values("fmtp")
                .filter_map(|value| value.strip_prefix(&prefix))
                .flat_map(|params| params.split(';'))
                .filter_map(|param| param.trim().split_once('='))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
            if !format_parameters.is_empty() {
                map.format_parameters = format_parameters;
            }

            let feedback: Vec<String> = section
                .attribute_values("rtcp-fb")
                .filter_map(|value| value.strip_prefix(&prefix))
                .map(|value| value.trim().to_string())
                .collect();
            if !feedback.is_empty() {
                map.feedback_types = feedback;
            }

            negotiated.push(map);
        }

        negotiated
    }

    /// Header extensions of `section` that are in the supported table
    fn negotiate_extensions(&self, section: &MediaSection, media: MediaType) -> Vec<ExtMap> {
        section
            .attribute_values("extmap")
            .filter_map(|value| {
                let mut parts = value.split_whitespace();
                // "<id>[/<direction>] <uri> [<attributes>]"
                let id = parts.next()?.split('/').next()?.parse::<u8>().ok()?;
                let uri = parts.next()?;
                self.supported_extensions
                    .iter()
                    .any(|ext| ext.media_type == media && ext.uri == uri)
                    .then(|| ExtMap {
                        id,
                        uri: uri.to_string(),
                        media_type: media,
                    })
            })
            .collect()
    }

    /// Parse a trickled candidate fragment
    ///
    /// The fragment is one or more `candidate:` lines, with or without the
    /// `a=` prefix. Parsed candidates take this description's credentials
    /// for `media`, are stored and also returned.
    pub fn add_candidate_fragment(
        &mut self,
        fragment: &str,
        media: MediaType,
    ) -> ConnectionResult<Vec<CandidateInfo>> {
        let credentials = self.credentials(media).clone();
        let mut parsed = Vec::new();

        for line in fragment.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let value = line.strip_prefix("a=").unwrap_or(line);
            if value == "end-of-candidates" {
                continue;
            }
            if !value.starts_with("candidate:") {
                return Err(ConnectionError::CandidateParse(format!(
                    "Not a candidate line: {}",
                    line
                )));
            }
            let mut candidate = CandidateInfo::parse(value, media)?;
            candidate.username = credentials.username.clone();
            candidate.password = credentials.password.clone();
            parsed.push(candidate);
        }

        if parsed.is_empty() {
            return Err(ConnectionError::CandidateParse(format!(
                "No candidate in fragment: {}",
                fragment.trim()
            )));
        }

        self.candidates.extend(parsed.iter().cloned());
        Ok(parsed)
    }

    /// Store a candidate and return its attribute text
    pub fn add_candidate(&mut self, candidate: CandidateInfo) -> String {
        let text = candidate.to_attribute_value();
        self.candidates.push(candidate);
        text
    }

    pub fn candidates(&self) -> &[CandidateInfo] {
        &self.candidates
    }

    /// Keep candidates learned earlier that this description lacks
    pub fn inherit_candidates(&mut self, previous: &SessionDescription) {
        let mut merged: Vec<CandidateInfo> = previous
            .candidates
            .iter()
            .filter(|candidate| !self.candidates.contains(candidate))
            .cloned()
            .collect();
        merged.append(&mut self.candidates);
        self.candidates = merged;
    }

    pub fn credentials(&self, media: MediaType) -> &IceCredentials {
        match media {
            MediaType::Audio => &self.audio_credentials,
            MediaType::Video => &self.video_credentials,
        }
    }

    pub fn set_credentials(&mut self, media: MediaType, credentials: IceCredentials) {
        match media {
            MediaType::Audio => self.audio_credentials = credentials,
            MediaType::Video => self.video_credentials = credentials,
        }
    }

    pub fn mline(&self, media: MediaType) -> Option<usize> {
        match media {
            MediaType::Audio => self.audio_mline,
            MediaType::Video => self.video_mline,
        }
    }

    pub fn has_media(&self, media: MediaType) -> bool {
        match media {
            MediaType::Audio => self.has_audio,
            MediaType::Video => self.has_video,
        }
    }

    pub fn supported_extensions(&self) -> &[ExtMap] {
        &self.supported_extensions
    }

    /// Prepare a fresh offer
    pub fn create_offer(&mut self, video: bool, audio: bool, bundle: bool) {
        self.has_video = video;
        self.has_audio = audio;
        self.is_bundle = bundle;
        self.is_rtcp_mux = true;
        self.profile = Profile::Savpf;

        self.audio_mline = audio.then_some(0);
        self.video_mline = video.then_some(usize::from(audio));
        self.audio_mid = MediaType::Audio.as_str().to_string();
        self.video_mid = MediaType::Video.as_str().to_string();

        self.negotiated_payloads = self
            .supported_payloads
            .iter()
            .filter(|map| self.has_media(map.media_type))
            .cloned()
            .collect();
        self.negotiated_extensions = self
            .supported_extensions
            .iter()
            .filter(|ext| self.has_media(ext.media_type))
            .cloned()
            .collect();

        self.session_version += 1;
    }

    /// Shape this (local) description as the answer to `offer`
    pub fn set_offer(&mut self, offer: &SessionDescription) {
        self.has_audio = offer.has_audio;
        self.has_video = offer.has_video;
        self.is_bundle = offer.is_bundle;
        self.is_rtcp_mux = offer.is_rtcp_mux;
        self.profile = offer.profile;
        self.audio_mline = offer.audio_mline;
        self.video_mline = offer.video_mline;
        self.audio_mid = offer.audio_mid.clone();
        self.video_mid = offer.video_mid.clone();
        self.negotiated_payloads = offer.negotiated_payloads.clone();
        self.negotiated_extensions = offer.negotiated_extensions.clone();
        self.session_version += 1;
    }

    /// Copy negotiated payload and extension information from `other`
    pub fn copy_info_from(&mut self, other: &SessionDescription) {
        self.negotiated_payloads = other.negotiated_payloads.clone();
        self.negotiated_extensions = other.negotiated_extensions.clone();
        self.is_rtcp_mux = other.is_rtcp_mux;
    }

    /// Restrict negotiated extensions to those the processor will handle
    pub fn update_supported_extensions(&mut self, supported: &[ExtMap]) {
        self.negotiated_extensions.retain(|ext| {
            supported
                .iter()
                .any(|s| s.uri == ext.uri && s.media_type == ext.media_type)
        });
    }

    /// Render as SDP text
    pub fn to_sdp(&self) -> String {
        let mut sections: Vec<(usize, MediaType)> = Vec::new();
        if let Some(index) = self.audio_mline.filter(|_| self.has_audio) {
            sections.push((index, MediaType::Audio));
        }
        if let Some(index) = self.video_mline.filter(|_| self.has_video) {
            sections.push((index, MediaType::Video));
        }
        sections.sort();

        let mut doc = SdpDocument {
            version: 0,
            origin: Some(Origin {
                username: "-".to_string(),
                session_id: self.session_id,
                session_version: self.session_version,
                network_type: "IN".to_string(),
                address_type: "IP4".to_string(),
                unicast_address: "127.0.0.1".to_string(),
            }),
            session_name: "SFU".to_string(),
            connection: None,
            timing: None,
            attributes: Vec::new(),
            media: Vec::new(),
        };

        if self.is_bundle {
            let mids: Vec<&str> = sections.iter().map(|(_, media)| self.mid(*media)).collect();
            doc.attributes
                .push(Attribute::new("group", format!("BUNDLE {}", mids.join(" "))));
        }
        let mut labels: Vec<&str> = self
            .audio_ssrc_map
            .keys()
            .chain(self.video_ssrc_map.keys())
            .map(String::as_str)
            .collect();
        labels.sort_unstable();
        labels.dedup();
        doc.attributes.push(Attribute::new(
            "msid-semantic",
            format!(" WMS {}", if labels.is_empty() { "*".to_string() } else { labels.join(" ") }),
        ));

        for (_, media) in sections {
            doc.media.push(self.render_section(media));
        }

        doc.serialize()
    }

    fn mid(&self, media: MediaType) -> &str {
        match media {
            MediaType::Audio => &self.audio_mid,
            MediaType::Video => &self.video_mid,
        }
    }

    fn render_section(&self, media: MediaType) -> MediaSection {
        let payloads: Vec<&RtpMap> = self
            .negotiated_payloads
            .iter()
            .filter(|map| map.media_type == media)
            .collect();
        let mut section = MediaSection::new(
            media.as_str(),
            1,
            self.profile.as_str(),
            payloads
                .iter()
                .map(|map| map.payload_type.to_string())
                .collect(),
        );
        section.connection = Some("IN IP4 0.0.0.0".to_string());

        // Bundled candidates are gathered once and valid for every section
        for candidate in self
            .candidates
            .iter()
            .filter(|c| self.is_bundle || c.media_type == media)
        {
            let value = candidate.to_attribute_value();
            let value = value.strip_prefix("candidate:").unwrap_or(&value);
            section.push(Attribute::new("candidate", value));
        }

        let credentials = if self.is_bundle {
            &self.video_credentials
        } else {
            self.credentials(media)
        };
        if !credentials.is_empty() {
            section.push(Attribute::new("ice-ufrag", credentials.username.clone()));
            section.push(Attribute::new("ice-pwd", credentials.password.clone()));
        }
        if let Some(ref fingerprint) = self.fingerprint {
            section.push(Attribute::new("fingerprint", fingerprint.clone()));
        }
        section.push(Attribute::new("setup", self.dtls_role.as_str()));

        let direction = match media {
            MediaType::Audio => self.audio_direction,
            MediaType::Video => self.video_direction,
        };
        section.push(Attribute::flag(direction.as_str()));
        section.push(Attribute::new("mid", self.mid(media)));

        for ext in self.negotiated_extensions.iter().filter(|e| e.media_type == media) {
            section.push(Attribute::new("extmap", format!("{} {}", ext.id, ext.uri)));
        }
        if self.is_rtcp_mux {
            section.push(Attribute::flag("rtcp-mux"));
        }

        for map in payloads {
            let mut encoding = format!("{} {}/{}", map.payload_type, map.encoding_name, map.clock_rate);
            if map.channels > 1 {
                encoding.push_str(&format!("/{}", map.channels));
            }
            section.push(Attribute::new("rtpmap", encoding));
            for feedback in &map.feedback_types {
                section.push(Attribute::new("rtcp-fb", format!("{} {}", map.payload_type, feedback)));
            }
            if !map.format_parameters.is_empty() {
                let params: Vec<String> = map
                    .format_parameters
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value))
                    .collect();
                section.push(Attribute::new("fmtp", format!("{} {}", map.payload_type, params.join(";"))));
            }
        }

        let mut announce = |ssrc: u32, label: &str| {
            section.push(Attribute::new("ssrc", format!("{} cname:{}", ssrc, label)));
            section.push(Attribute::new(
                "ssrc",
                format!("{} msid:{} {}-{}", ssrc, label, label, media.as_str()),
            ));
        };
        match media {
            MediaType::Audio => {
                for (label, ssrc) in &self.audio_ssrc_map {
                    announce(*ssrc, label);
                }
            }
            MediaType::Video => {
                for (label, ssrcs) in &self.video_ssrc_map {
                    for ssrc in ssrcs {
                        announce(*ssrc, label);
                    }
                }
            }
        }

        section
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
a=msid-semantic: WMS stream1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 0 126\r\n\
c=IN IP4 0.0.0.0\r\n\
a=candidate:1 1 udp 2122260223 192.168.1.10 50000 typ host\r\n\
a=ice-ufrag:aUfr\r\n\
a=ice-pwd:aPwdaPwdaPwdaPwdaPwdaPwd\r\n\
a=fingerprint:sha-256 AA:BB:CC\r\n\
a=setup:actpass\r\n\
a=mid:0\r\n\
a=extmap:1 urn:ietf:params:rtp-hdrext:ssrc-audio-level\r\n\
a=extmap:7 urn:example:unknown\r\n\
a=sendrecv\r\n\
a=rtcp-mux\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
a=rtpmap:126 telephone-event/8000\r\n\
a=ssrc:1001 cname:abc\r\n\
a=ssrc:1001 msid:stream1 track-a\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 100 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:vUfr\r\n\
a=ice-pwd:vPwdvPwdvPwdvPwdvPwdvPwd\r\n\
a=fingerprint:sha-256 AA:BB:CC\r\n\
a=setup:actpass\r\n\
a=mid:1\r\n\
a=extmap:3 http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time\r\n\
a=sendonly\r\n\
a=rtcp-mux\r\n\
a=rtpmap:100 VP8/90000\r\n\
a=rtcp-fb:100 nack\r\n\
a=rtcp-fb:100 nack pli\r\n\
a=rtpmap:96 rtx/90000\r\n\
a=ssrc-group:FID 2001 2002\r\n\
a=ssrc:2001 msid:stream1 track-v\r\n\
a=ssrc:2002 msid:stream1 track-v\r\n";

    #[test]
    fn test_parse_offer() {
        let settings = ConnectionSettings::default();
        let desc = SessionDescription::parse(OFFER, &settings).unwrap();

        assert!(desc.has_audio && desc.has_video);
        assert!(desc.is_bundle);
        assert!(desc.is_rtcp_mux);
        assert!(desc.is_fingerprint);
        assert_eq!(desc.profile, Profile::Savpf);
        assert_eq!(desc.dtls_role, DtlsRole::ActPass);
        assert_eq!(desc.audio_mline, Some(0));
        assert_eq!(desc.video_mline, Some(1));
        assert_eq!(desc.video_mid, "1");
        assert_eq!(desc.video_direction, Direction::SendOnly);
        assert_eq!(desc.credentials(MediaType::Audio).username, "aUfr");
        assert_eq!(desc.credentials(MediaType::Video).username, "vUfr");

        assert_eq!(desc.audio_ssrc_map.get("stream1"), Some(&1001));
        // RTX SSRC is left out
        assert_eq!(desc.video_ssrc_map.get("stream1"), Some(&vec![2001]));

        let candidates = desc.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].username, "aUfr");

        let payloads: Vec<(u8, &str)> = desc
            .negotiated_payloads
            .iter()
            .map(|map| (map.payload_type, map.encoding_name.as_str()))
            .collect();
        assert_eq!(payloads, vec![(111, "opus"), (0, "PCMU"), (100, "VP8")]);
        let vp8 = &desc.negotiated_payloads[2];
        assert_eq!(vp8.feedback_types, vec!["nack".to_string(), "nack pli".to_string()]);

        let uris: Vec<&str> = desc.negotiated_extensions.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris.len(), 2);
        assert!(!uris.contains(&"urn:example:unknown"));
    }

    #[test]
    fn test_parse_rejects_without_media() {
        let settings = ConnectionSettings::default();
        assert!(SessionDescription::parse("v=0\r\ns=-\r\nt=0 0\r\n", &settings).is_err());
        assert!(SessionDescription::parse("garbage", &settings).is_err());
    }

    #[test]
    fn test_candidate_fragment_uses_seeded_credentials() {
        let mut scratch = SessionDescription::default();
        scratch.set_credentials(MediaType::Video, IceCredentials::new("u", "p"));

        let parsed = scratch
            .add_candidate_fragment(
                "a=candidate:2 1 udp 1686052607 203.0.113.1 40000 typ srflx raddr 10.0.0.1 rport 40000",
                MediaType::Video,
            )
            .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].username, "u");
        assert_eq!(parsed[0].password, "p");
        assert_eq!(scratch.candidates().len(), 1);

        assert!(scratch
            .add_candidate_fragment("a=ice-ufrag:nope", MediaType::Video)
            .is_err());
        assert!(scratch.add_candidate_fragment("", MediaType::Video).is_err());
    }

    #[test]
    fn test_inherit_candidates() {
        let mut old = SessionDescription::default();
        old.add_candidate(CandidateInfo::host(MediaType::Audio, 1, "10.0.0.1", 5000));
        let mut new = SessionDescription::default();
        new.add_candidate(CandidateInfo::host(MediaType::Video, 1, "10.0.0.2", 5002));

        new.inherit_candidates(&old);
        assert_eq!(new.candidates().len(), 2);
        assert_eq!(new.candidates()[0].address, "10.0.0.1");
    }

    #[test]
    fn test_offer_renders_video_only_bundle() {
        let settings = ConnectionSettings::default();
        let mut local = SessionDescription::new(&settings);
        local.create_offer(true, false, true);

        let text = local.to_sdp();
        let doc = SdpDocument::parse(&text).unwrap();
        assert_eq!(doc.attribute("group"), Some("BUNDLE video"));
        assert_eq!(doc.media.len(), 1);
        assert_eq!(doc.media[0].media_type, "video");
        assert_eq!(doc.media[0].formats, vec!["100".to_string(), "101".to_string()]);
        assert!(doc.media[0].has_attribute("rtcp-mux"));
        assert_eq!(doc.media[0].attribute_values("ssrc").count(), 0);
    }

    #[test]
    fn test_answer_follows_offer_and_announces_ssrcs() {
        let settings = ConnectionSettings::default();
        let remote = SessionDescription::parse(OFFER, &settings).unwrap();
        let mut local = SessionDescription::new(&settings);
        local.set_offer(&remote);
        local.dtls_role = DtlsRole::Active;
        local.audio_ssrc_map.insert("sub1".to_string(), 3003);
        local.video_direction = Direction::RecvOnly;

        let reparsed = SessionDescription::parse(&local.to_sdp(), &settings).unwrap();
        assert_eq!(reparsed.audio_mid, "0");
        assert_eq!(reparsed.video_mid, "1");
        assert!(reparsed.is_bundle);
        assert_eq!(reparsed.dtls_role, DtlsRole::Active);
        assert_eq!(reparsed.video_direction, Direction::RecvOnly);
        assert_eq!(reparsed.audio_ssrc_map.get("sub1"), Some(&3003));
    }

    #[test]
    fn test_direction_from_flags() {
        assert_eq!(Direction::from_flags(false, true), Direction::RecvOnly);
        assert_eq!(Direction::from_flags(true, false), Direction::SendOnly);
        assert_eq!(Direction::from_flags(true, true), Direction::SendRecv);
        assert_eq!(Direction::from_flags(false, false), Direction::SendRecv);
    }
}
