//! Built-in stand-in transport.
//!
//! Real adapters (linked-device protocol, bot APIs) live outside this
//! workspace and register themselves with the host. The console transport
//! keeps every outbound path exercised when none are wired: it logs what
//! would have been sent.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use moobot_core::transport::{Transport, TransportKind};
use moobot_core::Result;

pub struct ConsoleTransport {
    kind: TransportKind,
}

impl ConsoleTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        info!(kind = %self.kind, jid, "outbound text: {text}");
        Ok(())
    }

    async fn send_image(&self, jid: &str, path: &Path, caption: Option<&str>) -> Result<()> {
        info!(
            kind = %self.kind, jid, path = %path.display(),
            caption = caption.unwrap_or("-"),
            "outbound image"
        );
        Ok(())
    }

    async fn send_voice(&self, jid: &str, path: &Path) -> Result<()> {
        info!(kind = %self.kind, jid, path = %path.display(), "outbound voice note");
        Ok(())
    }
}
