//! Connection controller
//!
//! A [`Connection`] is a cheap handle. All mutable state lives in a
//! [`ConnectionCore`] owned by the connection's serial task queue; API
//! calls and transport notifications are queued onto it. Only the data
//! needed by synchronous getters and by the inbound packet path (state,
//! listener, stream registry, transports) is shared, behind narrow locks.
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


use crate::bandwidth::{distributor_for, BandwidthDistributor};
use crate::candidate::CandidateInfo;
use crate::error::{ConnectionError, ConnectionResult};
use crate::events::{ConnectionEvent, ConnectionEventListener, ConnectionState};
use crate::extension::ExtensionProcessor;
use crate::media_stream::MediaStream;
use crate::packet_router::{PacketRouter, RouteStats};
use crate::rtp_handler::DataPacket;
use crate::session_description::SessionDescription;
use crate::task_queue::{SerialQueue, TaskHandle};
use crate::transport::{Transport, TransportFactory, TransportListener, TransportState};
use sfu_config::{ConnectionSettings, MediaType};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, Span};

/// Transports currently owned by a connection
#[derive(Clone, Default)]
pub(crate) struct Transports {
    /// Video transport, or the bundled one
    pub(crate) video: Option<Arc<dyn Transport>>,
    pub(crate) audio: Option<Arc<dyn Transport>>,
}

impl Transports {
    pub(crate) fn for_media(&self, media: MediaType) -> Option<&Arc<dyn Transport>> {
        match media {
            MediaType::Video => self.video.as_ref(),
            MediaType::Audio => self.audio.as_ref(),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.video.iter().chain(self.audio.iter())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// State read outside the task queue
pub(crate) struct SharedState {
    pub(crate) connection_id: String,
    pub(crate) span: Span,
    state: watch::Sender<ConnectionState>,
    listener: Mutex<Option<Arc<dyn ConnectionEventListener>>>,
    transports: RwLock<Transports>,
    pub(crate) router: PacketRouter,
}

impl SharedState {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn publish_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub(crate) fn set_listener(&self, listener: Option<Arc<dyn ConnectionEventListener>>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Deliver an event; the listener is called without holding its lock
    pub(crate) fn notify(&self, event: ConnectionEvent) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match listener {
            Some(listener) => listener.on_connection_event(event),
            None => trace!(code = event.code(), "No listener for event"),
        }
    }

    pub(crate) fn transports(&self) -> Transports {
        self.transports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_transports(&self, transports: Transports) {
        *self.transports.write().unwrap_or_else(PoisonError::into_inner) = transports;
    }

    /// Inbound packet from the transport tagged `media`
    pub(crate) fn on_packet(&self, packet: DataPacket, media: MediaType) {
        if self.state() != ConnectionState::Ready {
            return;
        }
        let transport = match self.transports().for_media(media) {
            Some(transport) => transport.clone(),
            None => {
                trace!(connection_id = %self.connection_id, ?media, "Packet from unknown transport");
                return;
            }
        };
        self.router.route(packet, &transport);
    }
}

pub(crate) struct ConnectionInner {
    pub(crate) shared: Arc<SharedState>,
    settings: Arc<ConnectionSettings>,
    queue: SerialQueue<ConnectionCore>,
}

/// Handle to one peer connection
///
/// Cloning is cheap; every clone drives the same connection. Queued work
/// is skipped once the last handle is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection using the distributor selected in `settings`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        connection_id: impl Into<String>,
        settings: Arc<ConnectionSettings>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let distributor = distributor_for(settings.distributor);
        Self::with_distributor(connection_id, settings, factory, distributor)
    }

    /// Create a connection with settings loaded from a configuration file
    ///
    /// `SFU_*` environment variables override the file. Must be called from
    /// within a Tokio runtime.
    pub fn from_config_file(
        connection_id: impl Into<String>,
        path: impl AsRef<Path>,
        factory: Arc<dyn TransportFactory>,
    ) -> ConnectionResult<Self> {
        let settings = ConnectionSettings::from_file(path)?;
        Ok(Self::new(connection_id, Arc::new(settings), factory))
    }

    /// Create a connection with a custom bandwidth distributor
    pub fn with_distributor(
        connection_id: impl Into<String>,
        settings: Arc<ConnectionSettings>,
        factory: Arc<dyn TransportFactory>,
        distributor: Box<dyn BandwidthDistributor>,
    ) -> Self {
        let connection_id = connection_id.into();
        let span = tracing::info_span!(
            "connection",
            connection_id = %connection_id,
            metadata = tracing::field::Empty
        );
        let (state, _) = watch::channel(ConnectionState::Initial);

        let shared = Arc::new(SharedState {
            connection_id: connection_id.clone(),
            span: span.clone(),
            state,
            listener: Mutex::new(None),
            transports: RwLock::new(Transports::default()),
            router: PacketRouter::new(distributor),
        });

        span.in_scope(|| {
            info!(
                stun_server = %settings.ice.stun_server,
                stun_port = settings.ice.stun_port,
                min_port = settings.ice.min_port,
                max_port = settings.ice.max_port,
                trickle = settings.ice.should_trickle,
                "Connection created"
            );
        });

        let inner = Arc::new_cyclic(|handle: &Weak<ConnectionInner>| {
            let core = ConnectionCore::new(
                connection_id,
                settings.clone(),
                shared.clone(),
                factory,
                handle.clone(),
            );
            ConnectionInner {
                shared,
                settings,
                queue: SerialQueue::spawn(core, handle.clone(), span),
            }
        });

        Connection { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.shared.connection_id
    }

    /// Announce the current state to the listener
    pub fn init(&self) {
        let state = self.current_state();
        self.inner.shared.notify(ConnectionEvent::StateChanged {
            state,
            message: None,
        });
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn ConnectionEventListener>>) {
        self.inner.shared.set_listener(listener);
    }

    /// Attach key/value context to every subsequent log record
    pub fn set_metadata(&self, metadata: &BTreeMap<String, String>) {
        let rendered = metadata
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join(", ");
        self.inner.shared.span.record("metadata", rendered.as_str());
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    /// Watch the aggregate state, e.g. to wait for READY or FAILED
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// Counters of the inbound packet path
    pub fn route_stats(&self) -> RouteStats {
        self.inner.shared.router.stats()
    }

    /// Build a local offer; the listener gets [`ConnectionEvent::OfferReady`]
    pub fn create_offer(&self, video: bool, audio: bool, bundle: bool) -> TaskHandle {
        self.submit(move |core| core.create_offer(video, audio, bundle))
    }

    /// Parse and apply a remote description
    ///
    /// Malformed text is rejected here and leaves the connection untouched.
    /// `stream_ids` names the streams to acknowledge with
    /// [`ConnectionEvent::SdpProcessed`].
    pub fn set_remote_description(
        &self,
        sdp: &str,
        stream_ids: Vec<String>,
    ) -> ConnectionResult<TaskHandle> {
        let description = SessionDescription::parse(sdp, &self.inner.settings)?;
        Ok(self.set_remote_description_info(description, stream_ids))
    }

    /// Apply an already parsed remote description
    pub fn set_remote_description_info(
        &self,
        description: SessionDescription,
        stream_ids: Vec<String>,
    ) -> TaskHandle {
        self.submit(move |core| core.set_remote_description(description, stream_ids))
    }

    /// Copy negotiated codec and extension information into the local description
    pub fn copy_to_local_description(&self, sdp: &str) -> ConnectionResult<TaskHandle> {
        let description = SessionDescription::parse(sdp, &self.inner.settings)?;
        Ok(self.submit(move |core| core.copy_to_local_description(description)))
    }

    /// Apply a trickled remote candidate
    ///
    /// `mline_index == -1` signals end of candidates. Only a malformed
    /// fragment is an error.
    pub async fn add_remote_candidate(
        &self,
        mid: &str,
        mline_index: i32,
        candidate: &str,
    ) -> ConnectionResult<()> {
        let mid = mid.to_string();
        let candidate = candidate.to_string();
        self.call(move |core| core.add_remote_candidate(&mid, mline_index, &candidate))
            .await?
    }

    pub fn add_media_stream(&self, stream: Arc<dyn MediaStream>) -> TaskHandle {
        self.submit(move |core| core.add_media_stream(stream))
    }

    pub fn remove_media_stream(&self, stream_id: &str) -> TaskHandle {
        let stream_id = stream_id.to_string();
        self.submit(move |core| core.remove_media_stream(&stream_id))
    }

    /// Current local description
    ///
    /// Recomputes announced SSRCs and directions from the registered
    /// streams before rendering.
    pub async fn local_description(&self) -> ConnectionResult<String> {
        self.call(|core| core.local_description()).await
    }

    /// Send a packet produced by a media stream
    pub fn write(&self, packet: DataPacket) -> TaskHandle {
        self.submit(move |core| core.write(packet))
    }

    /// Close transports, drop streams and detach the listener
    pub fn close(&self) -> TaskHandle {
        self.submit(|core| core.close())
    }

    /// Resolves once every task queued before it has run
    pub fn flush(&self) -> TaskHandle {
        self.submit(|_| {})
    }

    fn submit(&self, task: impl FnOnce(&mut ConnectionCore) + Send + 'static) -> TaskHandle {
        self.inner.queue.submit(task)
    }

    async fn call<R: Send + 'static>(
        &self,
        task: impl FnOnce(&mut ConnectionCore) -> R + Send + 'static,
    ) -> ConnectionResult<R> {
        let (tx, rx) = oneshot::channel();
        let _ = self.submit(move |core| {
            let _ = tx.send(task(core));
        });
        rx.await.map_err(|_| ConnectionError::Closed)
    }
}

/// Bridges transport callbacks onto the owning connection
struct TransportCallbacks {
    connection: Weak<ConnectionInner>,
}

impl TransportListener for TransportCallbacks {
    fn on_transport_state_changed(&self, state: TransportState, media_type: MediaType) {
        if let Some(inner) = self.connection.upgrade() {
            let _ = inner
                .queue
                .submit(move |core| core.on_transport_state(state, media_type));
        }
    }

    fn on_packet_received(&self, packet: DataPacket, media_type: MediaType) {
        if let Some(inner) = self.connection.upgrade() {
            inner.shared.on_packet(packet, media_type);
        }
    }

    fn on_candidate(&self, candidate: CandidateInfo, media_type: MediaType) {
        if let Some(inner) = self.connection.upgrade() {
            let _ = inner
                .queue
                .submit(move |core| core.on_local_candidate(candidate, media_type));
        }
    }
}

/// Mutable connection state, only touched from the task queue
pub(crate) struct ConnectionCore {
    pub(crate) id: String,
    pub(crate) settings: Arc<ConnectionSettings>,
    pub(crate) shared: Arc<SharedState>,
    factory: Arc<dyn TransportFactory>,
    handle: Weak<ConnectionInner>,

    pub(crate) local: SessionDescription,
    pub(crate) remote: SessionDescription,
    pub(crate) transports: Transports,
    pub(crate) extensions: ExtensionProcessor,

    pub(crate) bundle: bool,
    pub(crate) audio_enabled: bool,
    pub(crate) video_enabled: bool,
    pub(crate) trickle_enabled: bool,
    /// False once the data path is shut (failure or close)
    pub(crate) sending: bool,
    closed: bool,
    pub(crate) first_remote_processed: bool,
}

impl ConnectionCore {
    fn new(
        id: String,
        settings: Arc<ConnectionSettings>,
        shared: Arc<SharedState>,
        factory: Arc<dyn TransportFactory>,
        handle: Weak<ConnectionInner>,
    ) -> Self {
        ConnectionCore {
            local: SessionDescription::new(&settings),
            remote: SessionDescription::new(&settings),
            extensions: ExtensionProcessor::new(&settings.ext_mappings),
            trickle_enabled: settings.ice.should_trickle,
            id,
            settings,
            shared,
            factory,
            handle,
            transports: Transports::default(),
            bundle: false,
            audio_enabled: false,
            video_enabled: false,
            sending: true,
            closed: false,
            first_remote_processed: false,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Listener handed to transports created by this connection
    pub(crate) fn transport_listener(&self) -> Arc<dyn TransportListener> {
        Arc::new(TransportCallbacks {
            connection: self.handle.clone(),
        })
    }

    pub(crate) fn factory(&self) -> &Arc<dyn TransportFactory> {
        &self.factory
    }

    /// Publish the current transports to the packet path
    pub(crate) fn sync_transports(&self) {
        self.shared.set_transports(self.transports.clone());
    }

    fn add_media_stream(&mut self, stream: Arc<dyn MediaStream>) {
        if !self.sending {
            return;
        }
        debug!(stream_id = %stream.id(), "Adding media stream");
        self.shared.router.streams().add(stream);
    }

    fn remove_media_stream(&mut self, stream_id: &str) {
        debug!(stream_id, "Removing media stream");
        for stream in self.shared.router.streams().remove(stream_id) {
            let label = stream.label();
            self.local.video_ssrc_map.remove(&label);
            self.local.audio_ssrc_map.remove(&label);
        }
    }

    fn write(&mut self, packet: DataPacket) {
        if !self.sending {
            return;
        }
        let transport = if self.bundle || packet.media_type == Some(MediaType::Video) {
            self.transports.video.as_ref()
        } else {
            self.transports.audio.as_ref()
        };
        let Some(transport) = transport else {
            trace!("Dropping write without transport");
            return;
        };
        let packet = self.extensions.process_outbound(packet);
        transport.write(packet.data);
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("Closing connection");
        self.closed = true;
        self.sending = false;

        self.shared.router.streams().clear();
        for transport in self.transports.iter() {
            transport.close();
        }
        self.transports = Transports::default();
        self.sync_transports();

        self.shared.publish_state(ConnectionState::Finished);
        self.shared.set_listener(None);
        info!("Connection closed");
    }
}
