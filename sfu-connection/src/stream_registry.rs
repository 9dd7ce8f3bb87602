//! Registry of the media streams multiplexed on a connection
//!
//! Writers (the connection's task queue) replace the whole list; readers on
//! the packet path take a cheap snapshot and never block a writer for long.
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


use crate::media_stream::MediaStream;
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable view of the registry at one point in time
pub type StreamSnapshot = Arc<Vec<Arc<dyn MediaStream>>>;

/// Copy-on-write list of media streams, in insertion order
pub struct StreamRegistry {
    streams: RwLock<StreamSnapshot>,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        StreamRegistry {
            streams: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Current streams
    pub fn snapshot(&self) -> StreamSnapshot {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append a stream
    pub fn add(&self, stream: Arc<dyn MediaStream>) {
        self.update(|streams| streams.push(stream));
    }

    /// Remove every stream with the given id, returning the removed ones
    pub fn remove(&self, stream_id: &str) -> Vec<Arc<dyn MediaStream>> {
        let mut removed = Vec::new();
        self.update(|streams| {
            let (gone, kept): (Vec<_>, Vec<_>) =
                streams.drain(..).partition(|stream| stream.id() == stream_id);
            *streams = kept;
            removed = gone;
        });
        removed
    }

    /// Drop every stream
    pub fn clear(&self) {
        *self.streams.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Arc<dyn MediaStream>>)) {
        let mut guard = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<Arc<dyn MediaStream>> = guard.as_ref().clone();
        f(&mut next);
        *guard = Arc::new(next);
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Streams owning `ssrc` as source or sink
pub fn owners_of(
    streams: &[Arc<dyn MediaStream>],
    ssrc: u32,
) -> impl Iterator<Item = &Arc<dyn MediaStream>> {
    streams
        .iter()
        .filter(move |stream| stream.is_source_ssrc(ssrc) || stream.is_sink_ssrc(ssrc))
}

/// Streams credited by a bitrate estimate for `ssrcs`, each listed once
///
/// Sink ownership decides; when no stream owns a credited SSRC as sink the
/// stream sourcing it is credited instead.
pub fn credited_streams(
    streams: &[Arc<dyn MediaStream>],
    ssrcs: &[u32],
) -> Vec<Arc<dyn MediaStream>> {
    let mut credited: Vec<Arc<dyn MediaStream>> = Vec::new();
    for &ssrc in ssrcs {
        let mut owners: Vec<&Arc<dyn MediaStream>> =
            streams.iter().filter(|stream| stream.is_sink_ssrc(ssrc)).collect();
        if owners.is_empty() {
            owners = streams.iter().filter(|stream| stream.is_source_ssrc(ssrc)).collect();
        }
        for stream in owners {
            if !credited.iter().any(|known| Arc::ptr_eq(known, stream)) {
                credited.push(stream.clone());
            }
        }
    }
    credited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp_handler::DataPacket;
    use crate::session_description::SessionDescription;
    use crate::transport::Transport;

    struct TestStream {
        id: String,
        source: u32,
        sink: u32,
    }

    impl MediaStream for TestStream {
        fn id(&self) -> String {
            self.id.clone()
        }
        fn label(&self) -> String {
            self.id.clone()
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
        fn on_packet_from_transport(&self, _packet: DataPacket, _transport: &Arc<dyn Transport>) {}
        fn request_keyframe(&self) {}
        fn set_transport_diagnostics(&self, _audio: &str, _video: &str) {}
    }

    fn stream(id: &str, source: u32, sink: u32) -> Arc<dyn MediaStream> {
        Arc::new(TestStream {
            id: id.to_string(),
            source,
            sink,
        })
    }

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let registry = StreamRegistry::new();
        registry.add(stream("a", 1, 2));
        let before = registry.snapshot();

        registry.add(stream("b", 3, 4));
        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_by_id() {
        let registry = StreamRegistry::new();
        registry.add(stream("a", 1, 2));
        registry.add(stream("b", 3, 4));

        let removed = registry.remove("a");
        assert_eq!(removed.len(), 1);
        assert_eq!(registry.snapshot()[0].id(), "b");
        assert!(registry.remove("missing").is_empty());

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ownership_lookup() {
        let streams = vec![stream("a", 1, 111), stream("b", 222, 2)];

        let owners: Vec<String> = owners_of(&streams, 111).map(|s| s.id()).collect();
        assert_eq!(owners, vec!["a".to_string()]);
        let owners: Vec<String> = owners_of(&streams, 222).map(|s| s.id()).collect();
        assert_eq!(owners, vec!["b".to_string()]);
        assert_eq!(owners_of(&streams, 999).count(), 0);

        // Duplicates collapse
        let credited = credited_streams(&streams, &[111, 111]);
        assert_eq!(credited.len(), 1);
        assert_eq!(credited[0].id(), "a");
        let credited = credited_streams(&streams, &[222]);
        assert_eq!(credited.len(), 1);
        assert_eq!(credited[0].id(), "b");

        // Sink ownership wins over source ownership
        let streams = vec![stream("a", 5, 111), stream("b", 111, 7)];
        let credited = credited_streams(&streams, &[111]);
        assert_eq!(credited.len(), 1);
        assert_eq!(credited[0].id(), "a");

        let credited = credited_streams(&streams, &[7, 999]);
        assert_eq!(credited.len(), 1);
        assert_eq!(credited[0].id(), "b");
    }
}
