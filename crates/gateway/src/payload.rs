//! Wire model of gateway webhook deliveries.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Option<MessageData>,
}

#[derive(Debug, Deserialize)]
pub struct MessageData {
    #[serde(default)]
    pub key: Option<MessageKey>,
    #[serde(rename = "pushName", default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message: Option<MessageBody>,
    #[serde(rename = "messageTimestamp", default)]
    pub message_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MessageKey {
    #[serde(rename = "remoteJid", default)]
    pub remote_jid: Option<String>,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(rename = "extendedTextMessage", default)]
    pub extended_text_message: Option<ExtendedTextMessage>,
    #[serde(rename = "audioMessage", default)]
    pub audio_message: Option<Value>,
    #[serde(rename = "imageMessage", default)]
    pub image_message: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendedTextMessage {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Audio,
    Image,
    Other,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

/// Normalized inbound delivery, ready for archival and pipeline dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub sender_number: String,
    pub push_name: Option<String>,
    pub kind: MessageKind,
    pub body: Option<String>,
}

impl WebhookEnvelope {
    /// Extracts the inbound message, skipping our own outbound echoes and
    /// deliveries without a sender.
    pub fn inbound(&self) -> Option<InboundMessage> {
        let data = self.data.as_ref()?;
        let key = data.key.as_ref()?;
        if key.from_me {
            return None;
        }

        let sender_number = key.remote_jid.as_deref().map(sender_number)?;
        if sender_number.is_empty() {
            return None;
        }

        let (kind, body) = match &data.message {
            Some(message) => classify(message),
            None => (MessageKind::Other, None),
        };

        Some(InboundMessage {
            id: key.id.clone().unwrap_or_default(),
            sender_number: sender_number.to_string(),
            push_name: data.push_name.clone(),
            kind,
            body,
        })
    }
}

/// The JID carries the subscriber number before the `@` host part.
pub fn sender_number(remote_jid: &str) -> &str {
    remote_jid.split('@').next().unwrap_or(remote_jid)
}

fn classify(message: &MessageBody) -> (MessageKind, Option<String>) {
    if let Some(text) = &message.conversation {
        return (MessageKind::Text, Some(text.clone()));
    }
    if let Some(text) = message.extended_text_message.as_ref().and_then(|ext| ext.text.clone()) {
        return (MessageKind::Text, Some(text));
    }
    if message.audio_message.is_some() {
        return (MessageKind::Audio, None);
    }
    if message.image_message.is_some() {
        return (MessageKind::Image, None);
    }
    (MessageKind::Other, None)
}

#[cfg(test)]
mod tests {
    use super::{sender_number, MessageKind, WebhookEnvelope};

    fn envelope(raw: &str) -> WebhookEnvelope {
        serde_json::from_str(raw).expect("payload should deserialize")
    }

    #[test]
    fn text_delivery_is_normalized() {
        let payload = envelope(
            r#"{
                "event": "messages.upsert",
                "instance": "leadflow",
                "data": {
                    "key": {"remoteJid": "556599123456@s.whatsapp.net", "fromMe": false, "id": "ABC123"},
                    "pushName": "Maria Santos",
                    "message": {"conversation": "hello, I want a quote"},
                    "messageTimestamp": 1730000000
                }
            }"#,
        );

        let inbound = payload.inbound().expect("inbound message");
        assert_eq!(inbound.id, "ABC123");
        assert_eq!(inbound.sender_number, "556599123456");
        assert_eq!(inbound.push_name.as_deref(), Some("Maria Santos"));
        assert_eq!(inbound.kind, MessageKind::Text);
        assert_eq!(inbound.body.as_deref(), Some("hello, I want a quote"));
    }

    #[test]
    fn own_outbound_echoes_are_skipped() {
        let payload = envelope(
            r#"{"data": {"key": {"remoteJid": "5565@s.whatsapp.net", "fromMe": true, "id": "X"},
                         "message": {"conversation": "our reply"}}}"#,
        );
        assert!(payload.inbound().is_none());
    }

    #[test]
    fn audio_deliveries_carry_no_body() {
        let payload = envelope(
            r#"{"data": {"key": {"remoteJid": "5565@s.whatsapp.net", "fromMe": false, "id": "A1"},
                         "message": {"audioMessage": {"seconds": 14}}}}"#,
        );

        let inbound = payload.inbound().expect("inbound message");
        assert_eq!(inbound.kind, MessageKind::Audio);
        assert_eq!(inbound.body, None);
    }

    #[test]
    fn extended_text_is_treated_as_text() {
        let payload = envelope(
            r#"{"data": {"key": {"remoteJid": "5565@s.whatsapp.net", "fromMe": false, "id": "A2"},
                         "message": {"extendedTextMessage": {"text": "quoted reply"}}}}"#,
        );

        let inbound = payload.inbound().expect("inbound message");
        assert_eq!(inbound.kind, MessageKind::Text);
        assert_eq!(inbound.body.as_deref(), Some("quoted reply"));
    }

    #[test]
    fn jid_host_part_is_stripped() {
        assert_eq!(sender_number("556599123456@s.whatsapp.net"), "556599123456");
        assert_eq!(sender_number("plain-number"), "plain-number");
    }

    #[test]
    fn empty_envelopes_produce_nothing() {
        assert!(envelope(r#"{"event": "connection.update"}"#).inbound().is_none());
    }
}
