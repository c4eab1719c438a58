//! QR Code Producer
//!
//! External collaborator that turns a connection string into a PNG byte
//! stream. The bot passes the string through opaquely and never inspects the
//! image content; rendering is delegated to the `qrencode` binary via the
//! shell bridge. Callers fall back to plain text when rendering fails.

use crate::shell::{ShellBridge, ShellError};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Produces QR images for client connection strings.
#[async_trait]
pub trait QrProducer: Send + Sync {
    async fn render(&self, connection_string: &str) -> Result<Vec<u8>, QrError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("qr renderer unavailable: {0}")]
    Unavailable(#[from] ShellError),
    #[error("qr renderer failed: {0}")]
    RenderFailed(String),
    #[error("qr output unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// `qrencode`-backed producer. Writes the PNG to a temp path and reads it
/// back; the connection string travels as a single inert argv element.
pub struct QrEncodeProducer {
    bridge: ShellBridge,
}

impl QrEncodeProducer {
    pub fn new(bridge: ShellBridge) -> Self {
        Self { bridge }
    }

    fn temp_output_path() -> PathBuf {
        std::env::temp_dir().join(format!("realitybot-qr-{}.png", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl QrProducer for QrEncodeProducer {
    async fn render(&self, connection_string: &str) -> Result<Vec<u8>, QrError> {
        let out_path = Self::temp_output_path();
        let argv = vec![
            "qrencode".to_string(),
            "-o".to_string(),
            out_path.display().to_string(),
            "-t".to_string(),
            "PNG".to_string(),
            connection_string.to_string(),
        ];

        let output = self.bridge.run(&argv).await?;
        if !output.success() {
            let _ = tokio::fs::remove_file(&out_path).await;
            return Err(QrError::RenderFailed(output.stderr));
        }

        let bytes = tokio::fs::read(&out_path).await?;
        let _ = tokio::fs::remove_file(&out_path).await;
        debug!("Rendered QR code: {} bytes", bytes.len());
        Ok(bytes)
    }
}
