//! Chat history over HTTP.

use std::sync::Arc;

use serde_json::Value;

use crate::http::{Request, Response};
use crate::routes::{store_failure, text};
use crate::routing::{HandlerError, HandlerResult};
use crate::services::{MessageRecord, MessageStore, StoreError};
use crate::websocket::messages::ServerMessage;
use crate::websocket::ConnectionRegistry;

/// `GET /chat-messages`
pub fn list(messages: Arc<dyn MessageStore>) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |_: &mut Request| {
        let mut response = Response::ok();
        response.json(&messages.list_messages())?;
        Ok(response)
    }
}

/// `POST /chat-messages`, behind `OptionalAuth` and `RequireXsrf`.
///
/// Signed-in users post a form; guests may post JSON or a form.
pub fn post(
    messages: Arc<dyn MessageStore>,
    registry: ConnectionRegistry,
) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        let (username, message) = match request.user.clone() {
            Some(user) => (user, request.form_data().remove("message")),
            None => ("guest".to_string(), guest_message(request)),
        };

        let Some(message) = message.filter(|m| !m.is_empty()) else {
            return Ok(text(400, "Message is required"));
        };

        let record = match messages.persist_message(&username, &message, None) {
            Ok(record) => record,
            Err(e) => return store_failure(e),
        };
        broadcast_chat(&registry, record.clone());

        let mut response = Response::new(201);
        response.json(&record)?;
        Ok(response)
    }
}

fn guest_message(request: &Request) -> Option<String> {
    match request.json().get("message") {
        Some(Value::String(message)) => Some(message.clone()),
        _ => request.form_data().remove("message"),
    }
}

/// Push a stored message to WebSocket clients without blocking the handler.
fn broadcast_chat(registry: &ConnectionRegistry, record: MessageRecord) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::debug!(message_id = %record.id, "No runtime; skipping WebSocket broadcast");
        return;
    };
    let registry = registry.clone();
    runtime.spawn(async move {
        if let Err(e) = registry.broadcast(&ServerMessage::Chat(&record), None).await {
            tracing::warn!(message_id = %record.id, error = %e, "Chat broadcast failed");
        }
    });
}

/// `DELETE /chat-messages/{id}`, behind `RequireAuth`.
pub fn delete(messages: Arc<dyn MessageStore>) -> impl Fn(&mut Request) -> HandlerResult + Send + Sync {
    move |request: &mut Request| {
        let id = request.path_param("id").unwrap_or_default();
        if id.is_empty() {
            return Ok(text(400, "Message ID required"));
        }
        let user = request
            .user
            .as_deref()
            .ok_or_else(|| HandlerError::Internal("delete route reached without identity".into()))?;

        match messages.delete_message(id, user) {
            Ok(()) => {
                tracing::info!(message_id = %id, username = %user, "Message deleted");
                Ok(Response::new(204))
            }
            Err(e @ StoreError::NotOwner) => Ok(text(403, &e.to_string())),
            Err(e @ StoreError::MessageNotFound) => Ok(text(404, &e.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
