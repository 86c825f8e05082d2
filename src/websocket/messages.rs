//! Application messages carried in text frames.
//!
//! Every message is a JSON object discriminated by `"type"`. Clients send
//! `chat` and the three WebRTC signalling types; the server sends `welcome`,
//! `online-users`, `chat` and relayed signals.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::{MessageRecord, MessageStore};
use crate::websocket::connection::WsConnection;
use crate::websocket::error::WsError;
use crate::websocket::registry::ConnectionRegistry;

/// A message received from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Chat {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        media: Option<Value>,
    },
    WebrtcOffer(Signal),
    WebrtcAnswer(Signal),
    WebrtcIceCandidate(Signal),
    #[serde(other)]
    Unknown,
}

/// WebRTC signalling payload addressed to another user.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Signal {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub offer: Option<Value>,
    #[serde(default)]
    pub answer: Option<Value>,
    #[serde(default)]
    pub candidate: Option<Value>,
}

/// A message sent by the server.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage<'a> {
    Welcome { username: &'a str },
    OnlineUsers { users: Vec<String> },
    Chat(&'a MessageRecord),
    WebrtcOffer(SignalRelay<'a>),
    WebrtcAnswer(SignalRelay<'a>),
    WebrtcIceCandidate(SignalRelay<'a>),
}

/// A signal forwarded to its target, stamped with the sender.
#[derive(Debug, Serialize)]
pub struct SignalRelay<'a> {
    pub from: Option<&'a str>,
    pub offer: Option<&'a Value>,
    pub answer: Option<&'a Value>,
    pub candidate: Option<&'a Value>,
}

impl<'a> SignalRelay<'a> {
    fn new(from: &'a WsConnection, signal: &'a Signal) -> Self {
        Self {
            from: from.identity(),
            offer: signal.offer.as_ref(),
            answer: signal.answer.as_ref(),
            candidate: signal.candidate.as_ref(),
        }
    }
}

/// Handle one text payload from `sender`.
///
/// Undecodable payloads are returned as errors for the caller to log;
/// unknown types and incomplete messages are ignored.
pub async fn dispatch(
    sender: &WsConnection,
    text: &str,
    registry: &ConnectionRegistry,
    messages: &dyn MessageStore,
) -> Result<(), WsError> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Chat { message, media } => {
            handle_chat(sender, message.unwrap_or_default(), media, registry, messages).await
        }
        ClientMessage::WebrtcOffer(signal) => {
            relay(sender, &signal, registry, ServerMessage::WebrtcOffer).await;
            Ok(())
        }
        ClientMessage::WebrtcAnswer(signal) => {
            relay(sender, &signal, registry, ServerMessage::WebrtcAnswer).await;
            Ok(())
        }
        ClientMessage::WebrtcIceCandidate(signal) => {
            relay(sender, &signal, registry, ServerMessage::WebrtcIceCandidate).await;
            Ok(())
        }
        ClientMessage::Unknown => {
            tracing::debug!(connection_id = %sender.id(), "Ignoring message of unknown type");
            Ok(())
        }
    }
}

async fn handle_chat(
    sender: &WsConnection,
    message: String,
    media: Option<Value>,
    registry: &ConnectionRegistry,
    messages: &dyn MessageStore,
) -> Result<(), WsError> {
    let media = media.filter(|m| !m.is_null());
    if message.is_empty() && media.is_none() {
        return Ok(());
    }

    let username = sender.display_name();
    let record = match messages.persist_message(username, &message, media) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(connection_id = %sender.id(), %username, error = %e, "Chat message rejected");
            return Ok(());
        }
    };

    let delivered = registry.broadcast(&ServerMessage::Chat(&record), None).await?;
    tracing::debug!(message_id = %record.id, %username, delivered, "Chat message broadcast");
    Ok(())
}

async fn relay<'a>(
    sender: &'a WsConnection,
    signal: &'a Signal,
    registry: &ConnectionRegistry,
    wrap: fn(SignalRelay<'a>) -> ServerMessage<'a>,
) {
    let Some(target) = signal.target.as_deref().filter(|t| !t.is_empty()) else {
        return;
    };
    let Some(peer) = registry.find_by_identity(target) else {
        tracing::debug!(connection_id = %sender.id(), %target, "Signal target not connected");
        return;
    };
    if let Err(e) = peer.send_json(&wrap(SignalRelay::new(sender, signal))).await {
        tracing::debug!(connection_id = %peer.id(), error = %e, "Signal relay failed");
    }
}

/// Send the current presence list to every connection.
pub async fn broadcast_online_users(registry: &ConnectionRegistry) {
    let message = ServerMessage::OnlineUsers {
        users: registry.online_users(),
    };
    if let Err(e) = registry.broadcast(&message, None).await {
        tracing::warn!(error = %e, "Presence broadcast failed");
    }
}
