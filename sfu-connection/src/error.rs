//! Error types for the connection controller
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


use thiserror::Error;

/// Result type for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors that can occur in the connection controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Malformed session description
    #[error("SDP parse error: {0}")]
    SdpParse(String),

    /// Malformed ICE candidate fragment
    #[error("Candidate parse error: {0}")]
    CandidateParse(String),

    /// RTP packet parsing error
    #[error("RTP packet parse error: {0}")]
    RtpParse(String),

    /// RTCP packet parsing error
    #[error("RTCP packet parse error: {0}")]
    RtcpParse(String),

    /// The connection no longer exists
    #[error("Connection closed")]
    Closed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sfu_config::ConfigError> for ConnectionError {
    fn from(err: sfu_config::ConfigError) -> Self {
        ConnectionError::Config(err.to_string())
    }
}
