//! SDP (Session Description Protocol) text layer
//!
//! Implements the RFC 4566 line grammar: a document is a session section
//! followed by media sections, each made of `<type>=<value>` lines. Meaning
//! (ICE credentials, SSRCs, directions...) is layered on top by
//! [`crate::session_description`].
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

/// Parsed SDP document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdpDocument {
    /// Protocol version (v=)
    pub version: u32,
    /// Origin (o=)
    pub origin: Option<Origin>,
    /// Session name (s=)
    pub session_name: String,
    /// Connection data (c=)
    pub connection: Option<String>,
    /// Timing (t=)
    pub timing: Option<String>,
    /// Session-level attributes (a=)
    pub attributes: Vec<Attribute>,
    /// Media sections (m=)
    pub media: Vec<MediaSection>,
}

/// SDP origin (RFC 4566 Section 5.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub network_type: String,
    pub address_type: String,
    pub unicast_address: String,
}

/// SDP attribute (RFC 4566 Section 5.13)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute value (absent for flags such as `a=rtcp-mux`)
    pub value: Option<String>,
}

impl Attribute {
    pub fn flag(name: &str) -> Self {
        Attribute {
            name: name.to_string(),
            value: None,
        }
    }

    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Attribute {
            name: name.to_string(),
            value: Some(value.into()),
        }
    }

    fn parse(value: &str) -> Self {
        match value.split_once(':') {
            Some((name, value)) => Attribute::new(name, value),
            None => Attribute::flag(value),
        }
    }

    fn render(&self) -> String {
        match &self.value {
            Some(value) => format!("a={}:{}", self.name, value),
            None => format!("a={}", self.name),
        }
    }
}

/// SDP media section (RFC 4566 Section 5.14)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    /// Media type (audio, video, application...)
    pub media_type: String,
    pub port: u16,
    /// Protocol (UDP/TLS/RTP/SAVPF, RTP/AVPF...)
    pub protocol: String,
    /// Formats, usually payload types
    pub formats: Vec<String>,
    /// Connection data (c=)
    pub connection: Option<String>,
    /// Media-level attributes (a=)
    pub attributes: Vec<Attribute>,
}

impl MediaSection {
    pub fn new(media_type: &str, port: u16, protocol: &str, formats: Vec<String>) -> Self {
        MediaSection {
            media_type: media_type.to_string(),
            port,
            protocol: protocol.to_string(),
            formats,
            connection: None,
            attributes: Vec::new(),
        }
    }

    fn parse(value: &str) -> ConnectionResult<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(ConnectionError::SdpParse(format!(
                "Invalid media line: {}",
                value
            )));
        }

        // "9/2" port counts are accepted, the count is ignored
        let port_str = parts[1].split('/').next().unwrap_or(parts[1]);
        let port = port_str
            .parse()
            .map_err(|_| ConnectionError::SdpParse(format!("Invalid port: {}", parts[1])))?;

        Ok(MediaSection::new(
            parts[0],
            port,
            parts[2],
            parts[3..].iter().map(|s| s.to_string()).collect(),
        ))
    }

    /// Value of the first attribute called `name`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        find_attribute(&self.attributes, name)
    }

    /// Whether a flag or valued attribute called `name` is present
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|attr| attr.name == name)
    }

    /// Values of every attribute called `name`
    pub fn attribute_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        attribute_values(&self.attributes, name)
    }

    pub fn push(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    fn render(&self, lines: &mut Vec<String>) {
        let mut m_line = format!("m={} {} {}", self.media_type, self.port, self.protocol);
        for format in &self.formats {
            m_line.push(' ');
            m_line.push_str(format);
        }
        lines.push(m_line);

        if let Some(ref conn) = self.connection {
            lines.push(format!("c={}", conn));
        }
        for attr in &self.attributes {
            lines.push(attr.render());
        }
    }
}

fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|attr| attr.name == name)
        .map(|attr| attr.value.as_deref().unwrap_or(""))
}

fn attribute_values<'a>(
    attributes: &'a [Attribute],
    name: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    attributes
        .iter()
        .filter(move |attr| attr.name == name)
        .filter_map(|attr| attr.value.as_deref())
}

impl SdpDocument {
    /// Parse SDP from string per RFC 4566
    ///
    /// Unknown line types are skipped. A document with neither a version
    /// line nor any media or attribute content is rejected.
    pub fn parse(sdp: &str) -> ConnectionResult<Self> {
        let mut doc = SdpDocument::default();
        let mut current: Option<MediaSection> = None;
        let mut seen_content = false;

        for raw_line in sdp.lines() {
            let line = raw_line.trim_end_matches('\r');
            if line.len() < 2 {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) if key.len() == 1 => (key, value),
                _ => {
                    return Err(ConnectionError::SdpParse(format!(
                        "Malformed SDP line: {}",
                        line
                    )))
                }
            };

            match key {
                "v" => {
                    doc.version = value.trim().parse().map_err(|_| {
                        ConnectionError::SdpParse(format!("Invalid SDP version: {}", value))
                    })?;
                    seen_content = true;
                }
                "o" => doc.origin = Some(Origin::parse(value)?),
                "s" => doc.session_name = value.to_string(),
                "t" => doc.timing = Some(value.to_string()),
                "c" => match current.as_mut() {
                    Some(media) => media.connection = Some(value.to_string()),
                    None => doc.connection = Some(value.to_string()),
                },
                "a" => {
                    seen_content = true;
                    let attr = Attribute::parse(value);
                    match current.as_mut() {
                        Some(media) => media.attributes.push(attr),
                        None => doc.attributes.push(attr),
                    }
                }
                "m" => {
                    seen_content = true;
                    if let Some(media) = current.take() {
                        doc.media.push(media);
                    }
                    current = Some(MediaSection::parse(value)?);
                }
                _ => {
                    // b=, i=, k=... carry nothing the connection needs
                }
            }
        }

        if let Some(media) = current {
            doc.media.push(media);
        }

        if !seen_content {
            return Err(ConnectionError::SdpParse("Empty SDP".to_string()));
        }

        Ok(doc)
    }

    /// Serialize SDP to string per RFC 4566
    pub fn serialize(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("v={}", self.version));
        if let Some(ref origin) = self.origin {
            lines.push(origin.render());
        }
        lines.push(format!("s={}", self.session_name));
        if let Some(ref conn) = self.connection {
            lines.push(format!("c={}", conn));
        }
        lines.push(format!("t={}", self.timing.as_deref().unwrap_or("0 0")));

        for attr in &self.attributes {
            lines.push(attr.render());
        }
        for media in &self.media {
            media.render(&mut lines);
        }

        lines.join("\r\n") + "\r\n"
    }

    /// Value of the first session-level attribute called `name`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        find_attribute(&self.attributes, name)
    }

    /// Values of every session-level attribute called `name`
    pub fn attribute_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        attribute_values(&self.attributes, name)
    }
}

impl Origin {
    fn parse(value: &str) -> ConnectionResult<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 6 {
            return Err(ConnectionError::SdpParse(
                "Invalid origin format".to_string(),
            ));
        }

        Ok(Origin {
            username: parts[0].to_string(),
            session_id: parts[1]
                .parse()
                .map_err(|_| ConnectionError::SdpParse("Invalid session ID".to_string()))?,
            session_version: parts[2]
                .parse()
                .map_err(|_| ConnectionError::SdpParse("Invalid session version".to_string()))?,
            network_type: parts[3].to_string(),
            address_type: parts[4].to_string(),
            unicast_address: parts[5].to_string(),
        })
    }

    fn render(&self) -> String {
        format!(
            "o={} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.network_type,
            self.address_type,
            self.unicast_address
        )
    }
}
