use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use crate::db::models::{DM_PREFIX, TaskRow};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Guild,
    Direct,
}

/// A message received from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: String,
    pub channel_kind: ChannelKind,
    pub author_id: String,
    pub guild_id: Option<String>,
    pub content: String,
}

impl InboundMessage {
    /// Task endpoint this message originates from: the channel id, or
    /// `@<author>` for direct messages.
    pub fn origin_key(&self) -> String {
        match self.channel_kind {
            ChannelKind::Guild => self.channel_id.clone(),
            ChannelKind::Direct => format!("{DM_PREFIX}{}", self.author_id),
        }
    }
}

/// A message with its resolved tasks, ready for translation.
#[derive(Debug)]
pub struct RoutedMessage {
    pub message: InboundMessage,
    pub origin: String,
    pub tasks: Vec<TaskRow>,
    /// Set when the task lookup failed; `tasks` is then empty.
    pub error: Option<StoreError>,
    pub routed_at: DateTime<Utc>,
}

/// Receiver of routed messages (the translation engine).
pub trait TranslationSink {
    fn hand_off(&self, routed: RoutedMessage);
}

impl TranslationSink for mpsc::UnboundedSender<RoutedMessage> {
    fn hand_off(&self, routed: RoutedMessage) {
        if let Err(mpsc::error::SendError(dropped)) = self.send(routed) {
            warn!(origin = %dropped.origin, "translation consumer gone, dropping routed message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: ChannelKind) -> InboundMessage {
        InboundMessage {
            channel_id: "C1".into(),
            channel_kind: kind,
            author_id: "U1".into(),
            guild_id: None,
            content: "hello".into(),
        }
    }

    #[test]
    fn test_origin_key_for_channel() {
        assert_eq!(message(ChannelKind::Guild).origin_key(), "C1");
    }

    #[test]
    fn test_origin_key_for_direct_message() {
        assert_eq!(message(ChannelKind::Direct).origin_key(), "@U1");
    }

    #[test]
    fn test_hand_off_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel::<RoutedMessage>();
        drop(rx);
        tx.hand_off(RoutedMessage {
            message: message(ChannelKind::Guild),
            origin: "C1".into(),
            tasks: Vec::new(),
            error: None,
            routed_at: Utc::now(),
        });
    }
}
