//! Per-connection orchestration of the live detection loop.
//!
//! One coordinator owns one tracker/gate pair (inside its `FramePipeline`)
//! for the lifetime of a connection. The loop is strictly serial: the next
//! message is not read until the current frame's result has been sent, so
//! a fast client gets backpressure rather than a growing queue.

use std::sync::Arc;
use std::time::Instant;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use crate::detection::domain::mask_detector::MaskDetector;
use crate::events::domain::event::EventSource;
use crate::events::domain::event_store::EventStore;
use crate::pipeline::frame_pipeline::FramePipeline;
use crate::session::protocol::{ClientMessage, ServerMessage};
use crate::session::transport::{MessageTransport, TransportError};
use crate::shared::config::WatchConfig;
use crate::shared::frame::Frame;
use crate::storage::domain::snapshot_store::SnapshotStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

pub struct SessionCoordinator {
    pipeline: FramePipeline,
    state: SessionState,
    started: Instant,
    frames_received: usize,
}

impl SessionCoordinator {
    pub fn new(
        detector: Box<dyn MaskDetector>,
        config: &WatchConfig,
        store: Arc<dyn EventStore>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        Self {
            pipeline: FramePipeline::new(detector, config, EventSource::Live, store, snapshots),
            state: SessionState::Connecting,
            started: Instant::now(),
            frames_received: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session until the peer disconnects or the transport
    /// fails. Either way the session ends `Closed`; dropping the
    /// coordinator releases its tracker and gate — the only teardown path.
    pub fn run<T: MessageTransport>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        self.state = SessionState::Active;
        let result = self.serve(transport);
        self.state = SessionState::Closed;
        result
    }

    fn serve<T: MessageTransport>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        loop {
            match transport.recv() {
                Ok(Some(message)) => self.handle(message, transport)?,
                Ok(None) => return Ok(()),
                // A single bad message is rejected; the session stays up.
                Err(TransportError::Malformed(e)) => {
                    transport.send(&ServerMessage::Rejected {
                        reason: e.to_string(),
                    })?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn handle<T: MessageTransport>(
        &mut self,
        message: ClientMessage,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        match message {
            ClientMessage::Config {
                cooldown_seconds,
                snapshots_enabled,
            } => {
                if let Some(secs) = cooldown_seconds {
                    self.pipeline
                        .set_cooldown(std::time::Duration::from_secs(secs.max(1)));
                }
                if let Some(enabled) = snapshots_enabled {
                    self.pipeline.set_snapshots_enabled(enabled);
                }
                transport.send(&ServerMessage::ConfigAck {
                    cooldown_seconds: self.pipeline.cooldown().as_secs(),
                    snapshots_enabled: self.pipeline.snapshots_enabled(),
                })
            }
            ClientMessage::Ping => transport.send(&ServerMessage::Pong),
            ClientMessage::Frame { data } => match self.decode_frame(&data) {
                Ok(frame) => {
                    let report = self.pipeline.process_frame(&frame, self.started.elapsed());
                    transport.send(&ServerMessage::from(&report))
                }
                Err(reason) => transport.send(&ServerMessage::Rejected { reason }),
            },
        }
    }

    /// Decodes a base64 frame payload, tolerating `data:...;base64,` URL
    /// prefixes the way browser clients send canvas captures.
    fn decode_frame(&mut self, data: &str) -> Result<Frame, String> {
        let encoded = data
            .split_once(',')
            .map(|(_, rest)| rest)
            .unwrap_or(data)
            .trim();
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| format!("invalid base64 payload: {e}"))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| format!("undecodable image: {e}"))?
            .to_rgb8();

        let index = self.frames_received;
        self.frames_received += 1;

        let (width, height) = image.dimensions();
        Ok(Frame::new(image.into_raw(), width, height, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::{BoundingBox, Detection, MaskLabel};
    use crate::events::infrastructure::memory_event_store::InMemoryEventStore;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Feeds a scripted message sequence and records every reply.
    struct ScriptedTransport {
        incoming: VecDeque<Result<Option<ClientMessage>, TransportError>>,
        outgoing: Vec<ServerMessage>,
    }

    impl ScriptedTransport {
        fn new(messages: Vec<ClientMessage>) -> Self {
            Self {
                incoming: messages.into_iter().map(|m| Ok(Some(m))).collect(),
                outgoing: Vec::new(),
            }
        }

        fn push_malformed(&mut self) {
            let err = serde_json::from_str::<ClientMessage>("nonsense").unwrap_err();
            self.incoming.push_back(Err(TransportError::Malformed(err)));
        }
    }

    impl MessageTransport for ScriptedTransport {
        fn recv(&mut self) -> Result<Option<ClientMessage>, TransportError> {
            self.incoming.pop_front().unwrap_or(Ok(None))
        }

        fn send(&mut self, message: &ServerMessage) -> Result<(), TransportError> {
            self.outgoing.push(message.clone());
            Ok(())
        }
    }

    struct SequenceDetector {
        results: VecDeque<Result<Vec<Detection>, String>>,
    }

    impl MaskDetector for SequenceDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            match self.results.pop_front() {
                Some(Ok(detections)) => Ok(detections),
                Some(Err(message)) => Err(message.into()),
                None => Ok(Vec::new()),
            }
        }
    }

    fn encoded_frame() -> String {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([120, 120, 120]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        BASE64_STANDARD.encode(bytes.into_inner())
    }

    fn frame_message() -> ClientMessage {
        ClientMessage::Frame {
            data: encoded_frame(),
        }
    }

    fn violation() -> Detection {
        Detection {
            bbox: BoundingBox::new(2.0, 2.0, 10.0, 10.0),
            label: MaskLabel::NoMask,
            confidence: 0.95,
        }
    }

    fn coordinator(results: Vec<Result<Vec<Detection>, String>>) -> SessionCoordinator {
        SessionCoordinator::new(
            Box::new(SequenceDetector {
                results: results.into(),
            }),
            &WatchConfig::default(),
            Arc::new(InMemoryEventStore::new()),
            None,
        )
    }

    #[test]
    fn test_session_reaches_closed_after_disconnect() {
        let mut session = coordinator(vec![]);
        assert_eq!(session.state(), SessionState::Connecting);

        let mut transport = ScriptedTransport::new(vec![]);
        session.run(&mut transport).unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_frame_produces_result_with_tracked_detection() {
        let mut session = coordinator(vec![Ok(vec![violation()])]);
        let mut transport = ScriptedTransport::new(vec![frame_message()]);
        session.run(&mut transport).unwrap();

        assert_eq!(transport.outgoing.len(), 1);
        match &transport.outgoing[0] {
            ServerMessage::Result {
                detections,
                faces_count,
                alert,
            } => {
                assert_eq!(*faces_count, 1);
                assert!(*alert);
                assert!(detections[0].track_id.is_some());
                assert!(detections[0].alert);
            }
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let mut session = coordinator(vec![]);
        let mut transport = ScriptedTransport::new(vec![ClientMessage::Ping]);
        session.run(&mut transport).unwrap();
        assert_eq!(transport.outgoing, vec![ServerMessage::Pong]);
    }

    #[test]
    fn test_config_update_acknowledged_with_effective_values() {
        let mut session = coordinator(vec![]);
        let mut transport = ScriptedTransport::new(vec![ClientMessage::Config {
            cooldown_seconds: Some(30),
            snapshots_enabled: Some(true),
        }]);
        session.run(&mut transport).unwrap();

        assert_eq!(
            transport.outgoing,
            vec![ServerMessage::ConfigAck {
                cooldown_seconds: 30,
                snapshots_enabled: true,
            }]
        );
    }

    #[test]
    fn test_partial_config_keeps_other_settings() {
        let mut session = coordinator(vec![]);
        let mut transport = ScriptedTransport::new(vec![ClientMessage::Config {
            cooldown_seconds: None,
            snapshots_enabled: Some(true),
        }]);
        session.run(&mut transport).unwrap();

        assert_eq!(
            transport.outgoing,
            vec![ServerMessage::ConfigAck {
                cooldown_seconds: 10,
                snapshots_enabled: true,
            }]
        );
    }

    #[test]
    fn test_zero_cooldown_clamped_to_one_second() {
        let mut session = coordinator(vec![]);
        let mut transport = ScriptedTransport::new(vec![ClientMessage::Config {
            cooldown_seconds: Some(0),
            snapshots_enabled: None,
        }]);
        session.run(&mut transport).unwrap();

        assert_eq!(
            transport.outgoing,
            vec![ServerMessage::ConfigAck {
                cooldown_seconds: 1,
                snapshots_enabled: false,
            }]
        );
    }

    #[test]
    fn test_undecodable_frame_rejected_session_continues() {
        let mut session = coordinator(vec![Ok(vec![])]);
        let mut transport = ScriptedTransport::new(vec![
            ClientMessage::Frame {
                data: "!!!not-base64!!!".to_string(),
            },
            frame_message(),
        ]);
        session.run(&mut transport).unwrap();

        assert!(matches!(
            transport.outgoing[0],
            ServerMessage::Rejected { .. }
        ));
        assert!(matches!(transport.outgoing[1], ServerMessage::Result { .. }));
    }

    #[test]
    fn test_malformed_message_rejected_session_continues() {
        let mut session = coordinator(vec![]);
        let mut transport = ScriptedTransport::new(vec![ClientMessage::Ping]);
        transport.push_malformed();
        session.run(&mut transport).unwrap();

        assert_eq!(transport.outgoing[0], ServerMessage::Pong);
        assert!(matches!(
            transport.outgoing[1],
            ServerMessage::Rejected { .. }
        ));
    }

    #[test]
    fn test_detector_failure_yields_empty_result_and_session_survives() {
        // Spec scenario: the adapter fails on one frame in the middle of a
        // session; that frame reports no detections and later frames are
        // processed normally.
        let mut results: Vec<Result<Vec<Detection>, String>> = Vec::new();
        for i in 0..20 {
            if i == 6 {
                results.push(Err("backend gone".into()));
            } else {
                results.push(Ok(vec![violation()]));
            }
        }
        let mut session = coordinator(results);
        let mut transport = ScriptedTransport::new((0..20).map(|_| frame_message()).collect());
        session.run(&mut transport).unwrap();

        assert_eq!(transport.outgoing.len(), 20);
        for (i, reply) in transport.outgoing.iter().enumerate() {
            match reply {
                ServerMessage::Result { faces_count, .. } => {
                    assert_eq!(*faces_count, usize::from(i != 6), "frame {i}");
                }
                other => panic!("expected result for frame {i}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_data_url_prefix_is_tolerated() {
        let mut session = coordinator(vec![Ok(vec![])]);
        let mut transport = ScriptedTransport::new(vec![ClientMessage::Frame {
            data: format!("data:image/png;base64,{}", encoded_frame()),
        }]);
        session.run(&mut transport).unwrap();
        assert!(matches!(transport.outgoing[0], ServerMessage::Result { .. }));
    }

    #[test]
    fn test_same_face_keeps_track_id_across_frames() {
        let mut session = coordinator(vec![Ok(vec![violation()]), Ok(vec![violation()])]);
        let mut transport = ScriptedTransport::new(vec![frame_message(), frame_message()]);
        session.run(&mut transport).unwrap();

        let ids: Vec<_> = transport
            .outgoing
            .iter()
            .map(|m| match m {
                ServerMessage::Result { detections, .. } => detections[0].track_id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids[0], ids[1]);
    }
}
