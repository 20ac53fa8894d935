//! Inbound webhook for the messaging gateway.
//!
//! Every delivery is archived regardless of sender; text from the monitored
//! number additionally drives the reconciliation pipeline, with an optional
//! acknowledgment sent back through the gateway. The endpoint always answers
//! 200 so the gateway does not re-deliver on our own processing hiccups.

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::post, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_core::domain::decision::InputId;
use leadflow_db::{MessageRepository, StoredMessage};
use leadflow_gateway::{GatewayClient, InboundMessage, MessageKind, WebhookEnvelope};

use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct WebhookState {
    pub pipeline: Arc<Pipeline>,
    pub messages: Arc<dyn MessageRepository>,
    pub gateway: Option<Arc<GatewayClient>>,
    pub monitored_number: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: &'static str,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook/messages", post(ingest)).with_state(state)
}

pub async fn ingest(
    State(state): State<WebhookState>,
    Json(raw): Json<Value>,
) -> Json<WebhookResponse> {
    let envelope: WebhookEnvelope = match serde_json::from_value(raw) {
        Ok(envelope) => envelope,
        Err(parse_error) => {
            warn!(
                event_name = "webhook.payload_ignored",
                error = %parse_error,
                "delivery payload did not match the gateway schema"
            );
            return Json(WebhookResponse { status: "ignored" });
        }
    };

    let Some(inbound) = envelope.inbound() else {
        return Json(WebhookResponse { status: "ignored" });
    };

    archive(&state, &inbound).await;

    if !should_process(&state, &inbound) {
        return Json(WebhookResponse { status: "archived" });
    }

    let body = inbound.body.clone().unwrap_or_default();
    let input_id = InputId(inbound.id.clone());
    let decision = state
        .pipeline
        .process_text(input_id, &body, Some(&inbound.sender_number))
        .await;

    if let Some(gateway) = &state.gateway {
        let ack = format!(
            "Conversation recorded ({}, {}).",
            decision.action.as_str(),
            decision.status.kind()
        );
        if let Err(send_error) = gateway.send_text(&inbound.sender_number, &ack).await {
            warn!(
                event_name = "webhook.ack_failed",
                error = %send_error,
                "acknowledgment could not be delivered"
            );
        }
    }

    Json(WebhookResponse { status: "processed" })
}

async fn archive(state: &WebhookState, inbound: &InboundMessage) {
    let id = if inbound.id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        inbound.id.clone()
    };

    let stored = StoredMessage {
        id,
        sender_number: inbound.sender_number.clone(),
        push_name: inbound.push_name.clone(),
        kind: inbound.kind.as_str().to_string(),
        body: inbound.body.clone(),
        received_at: Utc::now(),
    };

    if let Err(archive_error) = state.messages.append(&stored).await {
        warn!(
            event_name = "webhook.archive_failed",
            sender = %inbound.sender_number,
            error = %archive_error,
            "message could not be archived"
        );
    } else {
        info!(
            event_name = "webhook.message_archived",
            sender = %inbound.sender_number,
            kind = inbound.kind.as_str(),
            "inbound message archived"
        );
    }
}

fn should_process(state: &WebhookState, inbound: &InboundMessage) -> bool {
    if inbound.kind != MessageKind::Text || inbound.body.as_deref().unwrap_or("").trim().is_empty()
    {
        return false;
    }

    match &state.monitored_number {
        Some(monitored) => digits(monitored) == digits(&inbound.sender_number),
        None => false,
    }
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}
