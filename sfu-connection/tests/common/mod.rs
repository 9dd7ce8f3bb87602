//! Fakes shared by the connection integration tests

#![allow(dead_code)]

use bytes::Bytes;
use sfu_connection::{
    BandwidthDistributor, CandidateInfo, CandidatePair, Connection, ConnectionEvent,
    ConnectionEventListener, ConnectionSettings, ConnectionState, DataPacket, IceCredentials,
    MediaStream, MediaType, SessionDescription, Transport, TransportFactory, TransportListener,
    TransportParams, TransportState,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport recording every call made on it
pub struct FakeTransport {
    pub params: TransportParams,
    listener: Arc<dyn TransportListener>,
    state: Mutex<TransportState>,
    pub started: AtomicBool,
    pub closed: AtomicBool,
    pub received_last_candidate: AtomicBool,
    pub remote_candidates: Mutex<Vec<CandidateInfo>>,
    pub credentials: Mutex<Vec<IceCredentials>>,
    pub written: Mutex<Vec<Bytes>>,
    pub pair: Mutex<CandidatePair>,
}

impl FakeTransport {
    pub fn media(&self) -> MediaType {
        self.params.media_type
    }

    /// Move to `state` and tell the connection, as a real transport would
    pub fn report(&self, state: TransportState) {
        *self.state.lock().unwrap() = state;
        self.listener.on_transport_state_changed(state, self.media());
    }

    pub fn discover(&self, candidate: CandidateInfo) {
        self.listener.on_candidate(candidate, self.media());
    }

    pub fn receive(&self, data: Bytes) {
        let packet = DataPacket::new(data, Some(self.media()));
        self.listener.on_packet_received(packet, self.media());
    }

    pub fn remote_candidates(&self) -> Vec<CandidateInfo> {
        self.remote_candidates.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn write(&self, data: Bytes) {
        self.written.lock().unwrap().push(data);
    }

    fn set_remote_candidates(&self, candidates: &[CandidateInfo], _bundle: bool) -> bool {
        self.remote_candidates
            .lock()
            .unwrap()
            .extend(candidates.iter().cloned());
        true
    }

    fn set_remote_credentials(&self, credentials: &IceCredentials) {
        self.credentials.lock().unwrap().push(credentials.clone());
    }

    fn set_received_last_candidate(&self) {
        self.received_last_candidate.store(true, Ordering::SeqCst);
    }

    fn process_local_description(&self, description: &mut SessionDescription) {
        let credentials = IceCredentials::new(
            format!("{}Ufrag", self.params.name),
            "localPasswordlocalPassword",
        );
        description.set_credentials(self.media(), credentials.clone());
        if self.params.bundle {
            description.set_credentials(MediaType::Audio, credentials);
        }
        description.fingerprint = Some("sha-256 11:22:33".to_string());
        description.is_fingerprint = true;
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn selected_candidate_pair(&self) -> CandidatePair {
        self.pair.lock().unwrap().clone()
    }

    fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    fn media_type(&self) -> MediaType {
        self.media()
    }
}

/// Factory handing out [`FakeTransport`]s and keeping them for inspection
#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeFactory {
    pub fn created(&self) -> Vec<Arc<FakeTransport>> {
        self.created.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn transport(&self, media: MediaType) -> Arc<FakeTransport> {
        self.created()
            .into_iter()
            .find(|transport| transport.media() == media)
            .expect("no transport for media")
    }
}

impl TransportFactory for FakeFactory {
    fn create(
        &self,
        params: TransportParams,
        listener: Arc<dyn TransportListener>,
    ) -> Arc<dyn Transport> {
        let transport = Arc::new(FakeTransport {
            params,
            listener,
            state: Mutex::new(TransportState::Initial),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            received_last_candidate: AtomicBool::new(false),
            remote_candidates: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            pair: Mutex::new(CandidatePair {
                remote_candidate_type: "host".to_string(),
                ..Default::default()
            }),
        });
        self.created.lock().unwrap().push(transport.clone());
        transport
    }
}

/// Media stream recording what the connection does to it
pub struct FakeStream {
    pub id: String,
    pub ready: bool,
    pub publisher: bool,
    pub audio_sink: u32,
    pub video_sink: u32,
    pub sources: Vec<u32>,
    pub received: Mutex<Vec<Bytes>>,
    pub keyframes: AtomicUsize,
    pub remote_descriptions: AtomicUsize,
    pub diagnostics: Mutex<Option<(String, String)>>,
    pub bitrates: Mutex<Vec<u64>>,
}

impl FakeStream {
    pub fn subscriber(id: &str, audio_sink: u32, video_sink: u32) -> Arc<Self> {
        Arc::new(FakeStream {
            id: id.to_string(),
            ready: true,
            publisher: false,
            audio_sink,
            video_sink,
            sources: Vec::new(),
            received: Mutex::new(Vec::new()),
            keyframes: AtomicUsize::new(0),
            remote_descriptions: AtomicUsize::new(0),
            diagnostics: Mutex::new(None),
            bitrates: Mutex::new(Vec::new()),
        })
    }

    pub fn publisher(id: &str, sources: Vec<u32>) -> Arc<Self> {
        Arc::new(FakeStream {
            id: id.to_string(),
            ready: true,
            publisher: true,
            audio_sink: 0,
            video_sink: 0,
            sources,
            received: Mutex::new(Vec::new()),
            keyframes: AtomicUsize::new(0),
            remote_descriptions: AtomicUsize::new(0),
            diagnostics: Mutex::new(None),
            bitrates: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Bytes> {
        self.received.lock().unwrap().clone()
    }

    pub fn keyframes(&self) -> usize {
        self.keyframes.load(Ordering::SeqCst)
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn label(&self) -> String {
        format!("{}-label", self.id)
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn is_publisher(&self) -> bool {
        self.publisher
    }

    fn audio_sink_ssrc(&self) -> u32 {
        self.audio_sink
    }

    fn video_sink_ssrc(&self) -> u32 {
        self.video_sink
    }

    fn is_source_ssrc(&self, ssrc: u32) -> bool {
        self.sources.contains(&ssrc)
    }

    fn is_sink_ssrc(&self, ssrc: u32) -> bool {
        ssrc != 0 && (ssrc == self.audio_sink || ssrc == self.video_sink)
    }

    fn set_remote_description(&self, _description: &SessionDescription) {
        self.remote_descriptions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_packet_from_transport(&self, packet: DataPacket, _transport: &Arc<dyn Transport>) {
        self.received.lock().unwrap().push(packet.data);
    }

    fn request_keyframe(&self) {
        self.keyframes.fetch_add(1, Ordering::SeqCst);
    }

    fn set_transport_diagnostics(&self, audio: &str, video: &str) {
        *self.diagnostics.lock().unwrap() = Some((audio.to_string(), video.to_string()));
    }

    fn apply_bitrate_estimate(&self, bitrate: u64) {
        self.bitrates.lock().unwrap().push(bitrate);
    }
}

/// Listener keeping every event
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ConnectionEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ConnectionEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ConnectionEventListener for RecordingListener {
    fn on_connection_event(&self, event: ConnectionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Distributor recording the streams each estimate was split over
#[derive(Clone, Default)]
pub struct RecordingDistributor {
    pub calls: Arc<Mutex<Vec<(u64, Vec<String>)>>>,
}

impl RecordingDistributor {
    pub fn calls(&self) -> Vec<(u64, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl BandwidthDistributor for RecordingDistributor {
    fn distribute(
        &mut self,
        bitrate: u64,
        _sender_ssrc: u32,
        streams: &[Arc<dyn MediaStream>],
        _transport: &Arc<dyn Transport>,
    ) {
        let ids = streams.iter().map(|stream| stream.id()).collect();
        self.calls.lock().unwrap().push((bitrate, ids));
    }
}

pub struct Harness {
    pub connection: Connection,
    pub factory: Arc<FakeFactory>,
    pub listener: Arc<RecordingListener>,
    pub distributor: RecordingDistributor,
}

pub fn harness() -> Harness {
    harness_with(ConnectionSettings::default())
}

pub fn harness_with(settings: ConnectionSettings) -> Harness {
    sfu_logging::try_init_test_logging();
    let factory = Arc::new(FakeFactory::default());
    let listener = Arc::new(RecordingListener::default());
    let distributor = RecordingDistributor::default();
    let connection = Connection::with_distributor(
        uuid::Uuid::new_v4().to_string(),
        Arc::new(settings),
        factory.clone(),
        Box::new(distributor.clone()),
    );
    connection.set_listener(Some(listener.clone()));
    Harness {
        connection,
        factory,
        listener,
        distributor,
    }
}

pub fn trickle_settings() -> ConnectionSettings {
    let mut settings = ConnectionSettings::default();
    settings.ice.should_trickle = true;
    settings
}

/// Bundled audio+video offer from a browser
pub fn remote_offer(audio_ufrag: &str, video_ufrag: &str) -> String {
    format!(
        "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
a=msid-semantic: WMS stream1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:{audio_ufrag}\r\n\
a=ice-pwd:aPwdaPwdaPwdaPwdaPwdaPwd\r\n\
a=fingerprint:sha-256 AA:BB:CC\r\n\
a=setup:actpass\r\n\
a=mid:0\r\n\
a=sendrecv\r\n\
a=rtcp-mux\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=ssrc:1001 msid:stream1 track-a\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 100\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:{video_ufrag}\r\n\
a=ice-pwd:vPwdvPwdvPwdvPwdvPwdvPwd\r\n\
a=fingerprint:sha-256 AA:BB:CC\r\n\
a=setup:actpass\r\n\
a=mid:1\r\n\
a=sendrecv\r\n\
a=rtcp-mux\r\n\
a=rtpmap:100 VP8/90000\r\n\
a=ssrc:2001 msid:stream1 track-v\r\n"
    )
}

/// Same media without BUNDLE: one transport per media type
pub fn remote_unbundled_offer() -> String {
    remote_offer("aUfr", "vUfr").replace("a=group:BUNDLE 0 1\r\n", "")
}

pub const HOST_CANDIDATE: &str = "candidate:1 1 udp 2122260223 192.168.1.10 50000 typ host";

pub fn rtp_packet(ssrc: u32) -> Bytes {
    let mut data = vec![0x80, 100, 0, 1, 0, 0, 0, 1];
    data.extend_from_slice(&ssrc.to_be_bytes());
    data.extend_from_slice(b"payload");
    Bytes::from(data)
}

/// REMB block crediting `ssrcs` with `bitrate`
pub fn remb_packet(bitrate: u64, ssrcs: Vec<u32>) -> Bytes {
    sfu_connection::Remb {
        sender_ssrc: 9,
        bitrate,
        ssrcs,
    }
    .serialize()
}
