//! Transport seam: the only view the core has of a messaging platform.
//!
//! Concrete adapters (linked-device protocol, bot APIs) live outside this
//! workspace; they implement [`Transport`] and register with the host.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Which family of transport a chat identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Numeric chat ids (Telegram-style bot APIs).
    BotApi,
    /// Everything else (WhatsApp-style linked-device JIDs).
    LinkedDevice,
}

impl TransportKind {
    /// Route by the shape of the chat identifier: all-digits goes to the
    /// bot API, anything else to the linked-device transport.
    pub fn for_jid(jid: &str) -> Self {
        if !jid.is_empty() && jid.bytes().all(|b| b.is_ascii_digit()) {
            TransportKind::BotApi
        } else {
            TransportKind::LinkedDevice
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::BotApi => write!(f, "bot-api"),
            TransportKind::LinkedDevice => write!(f, "linked-device"),
        }
    }
}

/// Capability set implemented by every registered transport.
///
/// Implementations must be `Send + Sync` so the bridge, the cron executor,
/// and Tide can all hold the same `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which jid family this transport serves.
    fn kind(&self) -> TransportKind;

    /// Deliver a plain text message to `jid`.
    async fn send_text(&self, jid: &str, text: &str) -> Result<()>;

    /// Deliver a local image file with an optional caption.
    async fn send_image(&self, jid: &str, path: &Path, caption: Option<&str>) -> Result<()>;

    /// Deliver a local audio file as a voice note.
    async fn send_voice(&self, jid: &str, path: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_jid_routes_to_bot_api() {
        assert_eq!(TransportKind::for_jid("123456789"), TransportKind::BotApi);
    }

    #[test]
    fn device_jid_routes_to_linked_device() {
        assert_eq!(
            TransportKind::for_jid("49170000000@s.whatsapp.net"),
            TransportKind::LinkedDevice
        );
    }

    #[test]
    fn empty_jid_is_linked_device() {
        assert_eq!(TransportKind::for_jid(""), TransportKind::LinkedDevice);
    }
}
