// src/connection/dispatcher.rs

//! Defines the seam between a connection's receive loop and the protocol, and
//! `SessionDispatcher`, the implementation that speaks the Guard protocol.

use super::client::ClientConnection;
use super::session::DeviceSession;
use crate::core::events::DisconnectReason;
use crate::core::metrics;
use crate::core::protocol::message::message_type;
use crate::core::protocol::{
    GuardFrameCodec, ProtocolVariant, StructuredResult, decode_structure, encode_error_frame,
    encode_response,
};
use crate::core::GatewayError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Liveness check sent by monitoring tools instead of a Guard frame.
pub const PING_REQUEST: &[u8] = b"PING";
pub const PING_REPLY: &[u8] = b"PONG";

/// Receives every non-empty chunk read from a connection.
///
/// Called inline by the connection's worker, so the next read waits until it returns.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn on_data(&self, conn: &Arc<ClientConnection>, data: Bytes);
}

/// Decodes Guard frames, answers them and keeps the device session current.
#[derive(Debug, Default, Clone)]
pub struct SessionDispatcher {
    codec: GuardFrameCodec,
}

impl SessionDispatcher {
    pub fn new(verify_checksum: bool) -> Self {
        Self {
            codec: GuardFrameCodec::new(verify_checksum),
        }
    }

    /// Runs one chunk through the codec and sends the acknowledgement.
    async fn process(
        &self,
        conn: &Arc<ClientConnection>,
        data: Bytes,
    ) -> Result<StructuredResult, GatewayError> {
        let message = self.codec.decode_chunk(data)?;
        let response = encode_response(&message)?;
        let result = decode_structure(&message)?;

        metrics::FRAMES_DECODED_TOTAL
            .with_label_values(&[metrics::message_type_label(message.message_type)])
            .inc();

        let new_timeout = {
            let mut session = conn.session.lock();
            let session = session.get_or_insert_with(|| DeviceSession::new(message.variant));
            session.update(message.variant, &result);
            result
                .ping_interval_secs()
                .and(session.idle_timeout_secs())
                .map(Duration::from_secs)
        };
        if let Some(timeout) = new_timeout
            && timeout != conn.idle_timeout()
        {
            debug!(
                "Connection {} idle timeout set to {}s from device ping interval.",
                conn.key(),
                timeout.as_secs()
            );
            conn.set_idle_timeout(timeout);
        }

        if message.message_type == message_type::EVENT_LOG {
            info!(
                "Event log frame from {}: in={} out={}",
                conn.key(),
                hex::encode_upper(&message.payload),
                response.as_deref().map(hex::encode_upper).unwrap_or_default()
            );
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                "Decoded frame from {} (seq {}): {}",
                conn.key(),
                message.sequence,
                serde_json::to_string(&result)?
            );
        }

        if let Some(response) = response {
            conn.send_bytes(&response).await;
        }
        Ok(result)
    }

    /// The variant to answer in when the frame itself could not be trusted.
    fn reply_variant(conn: &ClientConnection, data: &[u8]) -> ProtocolVariant {
        conn.session
            .lock()
            .as_ref()
            .map(|s| s.variant)
            .or_else(|| ProtocolVariant::detect(data))
            .unwrap_or(ProtocolVariant::Legacy)
    }
}

#[async_trait]
impl PayloadHandler for SessionDispatcher {
    async fn on_data(&self, conn: &Arc<ClientConnection>, data: Bytes) {
        if data.is_empty() {
            return;
        }

        if data.as_ref() == PING_REQUEST {
            debug!("Liveness check from {}.", conn.key());
            conn.send_bytes(PING_REPLY).await;
            conn.disconnect(DisconnectReason::Ping);
            return;
        }

        if let Err(e) = self.process(conn, data.clone()).await {
            warn!("Dropping connection {}: {}", conn.key(), e);
            if let GatewayError::Protocol(_) = e {
                metrics::PROTOCOL_ERRORS_TOTAL.inc();
                match encode_error_frame(Self::reply_variant(conn, &data)) {
                    Ok(frame) => {
                        conn.send_bytes(&frame).await;
                    }
                    Err(e) => debug!("Could not build error frame: {}", e),
                }
            }
            conn.disconnect(DisconnectReason::Exception);
        }
    }
}
