//! WebRTC peer transport built on `webrtc`.
//!
//! Each [`WebRtcTransportFactory::create`] builds a fresh `RTCPeerConnection`
//! with the default codecs and interceptors, hooks every callback to one
//! event channel, and hands both back as a [`TransportSetup`].
//!
//! # Callbacks → events
//!
//! | Callback                          | Event                          |
//! |-----------------------------------|--------------------------------|
//! | `on_ice_candidate(Some(c))`       | `LocalCandidate`               |
//! | `on_peer_connection_state_change` | `StateChanged`                 |
//! | `control` channel `on_open`       | `ControlOpen`                  |
//! | `control` channel `on_message`    | `ControlMessage`               |
//! | `on_track`                        | `RemoteTrack`                  |
//!
//! Callbacks run on webrtc's own tasks; events keep the order in which each
//! callback fired.

use std::sync::Arc;

use async_trait::async_trait;
use deskshare_core::protocol::control::CONTROL_CHANNEL_LABEL;
use deskshare_core::{IceCandidate, IceServer};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::application::ports::{
    EncodedFrame, FrameSink, PeerTransport, TransportError, TransportEvent, TransportFactory,
    TransportSetup, TransportState,
};

const EVENT_QUEUE: usize = 256;
const VIDEO_CLOCK_RATE: u32 = 90_000;

type ControlSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

// ── Factory ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct WebRtcTransportFactory;

impl WebRtcTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

fn to_rtc_ice_servers(servers: &[IceServer]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|s| {
            #[allow(clippy::needless_update)]
            RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
                ..Default::default()
            }
        })
        .collect()
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(&self, ice_servers: &[IceServer]) -> Result<TransportSetup, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::Setup(format!("codec registration: {e}")))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| TransportError::Setup(format!("interceptor registration: {e}")))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: to_rtc_ice_servers(ice_servers),
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| TransportError::Setup(e.to_string()))?,
        );

        let (events, rx) = mpsc::channel(EVENT_QUEUE);
        let control: ControlSlot = Arc::new(Mutex::new(None));
        hook_peer_connection(&pc, &events, &control);
        debug!("peer connection created with {} ICE server(s)", ice_servers.len());

        Ok(TransportSetup {
            transport: Arc::new(WebRtcTransport {
                pc,
                control,
                events,
            }),
            events: rx,
        })
    }
}

fn hook_peer_connection(
    pc: &Arc<RTCPeerConnection>,
    events: &mpsc::Sender<TransportEvent>,
    control: &ControlSlot,
) {
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            // `None` marks the end of gathering.
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => {
                    let _ = tx
                        .send(TransportEvent::LocalCandidate(from_rtc_candidate(init)))
                        .await;
                }
                Err(e) => warn!("could not serialize local candidate: {e}"),
            }
        })
    }));

    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        let tx = tx.clone();
        Box::pin(async move {
            let state = match s {
                RTCPeerConnectionState::New => TransportState::New,
                RTCPeerConnectionState::Connecting => TransportState::Connecting,
                RTCPeerConnectionState::Connected => TransportState::Connected,
                RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                RTCPeerConnectionState::Failed => TransportState::Failed,
                RTCPeerConnectionState::Closed => TransportState::Closed,
                _ => return,
            };
            debug!("peer connection state: {s}");
            let _ = tx.send(TransportEvent::StateChanged(state)).await;
        })
    }));

    // The answerer adopts the channel announced by the offerer.
    let tx = events.clone();
    let slot = Arc::clone(control);
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let tx = tx.clone();
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            if dc.label() != CONTROL_CHANNEL_LABEL {
                debug!("ignoring data channel '{}'", dc.label());
                return;
            }
            hook_control_channel(&dc, &tx);
            *slot.lock().await = Some(dc);
        })
    }));

    let tx = events.clone();
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let tx = tx.clone();
        Box::pin(async move {
            let kind = track.kind().to_string();
            let id = track.id();
            info!("remote {kind} track {id}");
            let _ = tx.send(TransportEvent::RemoteTrack { kind, id }).await;
            // Drain RTP so the receive buffer never fills.
            tokio::spawn(async move {
                let mut packets: u64 = 0;
                while track.read_rtp().await.is_ok() {
                    packets += 1;
                }
                debug!("remote track ended after {packets} packet(s)");
            });
        })
    }));
}

fn hook_control_channel(dc: &Arc<RTCDataChannel>, events: &mpsc::Sender<TransportEvent>) {
    let tx = events.clone();
    dc.on_open(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::ControlOpen).await;
        })
    }));

    let tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = tx.clone();
        Box::pin(async move {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => {
                    let _ = tx.send(TransportEvent::ControlMessage(text)).await;
                }
                Err(_) => debug!("dropping non-UTF-8 control message"),
            }
        })
    }));
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_rtc_candidate(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    control: ControlSlot,
    events: mpsc::Sender<TransportEvent>,
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_control_channel(&self) -> Result<(), TransportError> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(CONTROL_CHANNEL_LABEL, Some(init))
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        hook_control_channel(&dc, &self.events);
        *self.control.lock().await = Some(dc);
        Ok(())
    }

    async fn add_video_track(&self) -> Result<Arc<dyn FrameSink>, TransportError> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: VIDEO_CLOCK_RATE,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            "screen".to_owned(),
            "deskshare".to_owned(),
        ));
        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Media(e.to_string()))?;

        // RTCP must be read for the interceptors (NACK, reports) to work.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(Arc::new(VideoTrackSink { track }))
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))?;
        self.set_local(offer).await
    }

    async fn accept_offer(&self, sdp: &str) -> Result<String, TransportError> {
        let offer = RTCSessionDescription::offer(sdp.to_owned())
            .map_err(|e| TransportError::Description(e.to_string()))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))?;
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))?;
        self.set_local(answer).await
    }

    async fn accept_answer(&self, sdp: &str) -> Result<(), TransportError> {
        let answer = RTCSessionDescription::answer(sdp.to_owned())
            .map_err(|e| TransportError::Description(e.to_string()))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.pc
            .add_ice_candidate(to_rtc_candidate(candidate))
            .await
            .map_err(|e| TransportError::Candidate(e.to_string()))
    }

    async fn send_control(&self, text: &str) -> Result<(), TransportError> {
        let dc = self
            .control
            .lock()
            .await
            .clone()
            .ok_or_else(|| TransportError::Channel("control channel not open".into()))?;
        dc.send_text(text.to_owned())
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Channel(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!("closing peer connection: {e}");
        }
    }
}

impl WebRtcTransport {
    async fn set_local(&self, desc: RTCSessionDescription) -> Result<String, TransportError> {
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| TransportError::Description(e.to_string()))?;
        self.pc
            .local_description()
            .await
            .map(|d| d.sdp)
            .ok_or_else(|| TransportError::Description("no local description".into()))
    }
}

/// Writes encoded VP8 frames onto a sample track.
struct VideoTrackSink {
    track: Arc<TrackLocalStaticSample>,
}

#[async_trait]
impl FrameSink for VideoTrackSink {
    async fn write_frame(&self, frame: EncodedFrame) -> Result<(), TransportError> {
        let sample = Sample {
            data: frame.data.into(),
            duration: frame.duration,
            ..Default::default()
        };
        self.track
            .write_sample(&sample)
            .await
            .map_err(|e| TransportError::Media(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_servers_keep_credentials() {
        let servers = vec![
            IceServer::stun("stun:stun.l.google.com:19302"),
            IceServer {
                urls: vec!["turn:turn.example.org:3478".into()],
                username: Some("u".into()),
                credential: Some("p".into()),
            },
        ];

        let rtc = to_rtc_ice_servers(&servers);

        assert_eq!(rtc[0].urls, vec!["stun:stun.l.google.com:19302".to_string()]);
        assert_eq!(rtc[0].username, "");
        assert_eq!(rtc[1].username, "u");
        assert_eq!(rtc[1].credential, "p");
    }

    #[test]
    fn test_candidate_conversion_is_lossless() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 10.0.0.2 50000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: Some("abcd".into()),
        };

        assert_eq!(from_rtc_candidate(to_rtc_candidate(candidate.clone())), candidate);
    }

    #[tokio::test]
    async fn test_offer_carries_video_and_control_sections() {
        // Arrange
        let setup = WebRtcTransportFactory::new().create(&[]).await.unwrap();
        let transport = setup.transport;

        // Act
        transport.add_video_track().await.unwrap();
        transport.create_control_channel().await.unwrap();
        let sdp = transport.create_offer().await.unwrap();

        // Assert
        assert!(sdp.contains("m=video"), "offer must carry the screen track");
        assert!(sdp.contains("m=application"), "offer must carry the data channel");
        assert!(sdp.contains("VP8"));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_control_send_before_channel_is_rejected() {
        let setup = WebRtcTransportFactory::new().create(&[]).await.unwrap();

        let result = setup.transport.send_control("{}").await;

        assert!(matches!(result, Err(TransportError::Channel(_))));
        setup.transport.close().await;
    }

    #[tokio::test]
    async fn test_garbage_offer_is_description_error() {
        let setup = WebRtcTransportFactory::new().create(&[]).await.unwrap();

        let result = setup.transport.accept_offer("not an sdp").await;

        assert!(matches!(result, Err(TransportError::Description(_))));
        setup.transport.close().await;
    }
}
