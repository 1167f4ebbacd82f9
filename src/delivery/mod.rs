//! Turns frames and lifecycle events into mail and hands them to a transport.

mod message;
mod smtp;

use std::sync::Arc;

use chrono::Local;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{models::CapturedFrame, settings::SettingsStore};

pub use message::{MailAccount, MessageAttachment, Notice, OutboundMessage};
pub use smtp::SmtpMailTransport;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("authentication or permanent rejection: {0}")]
    Authentication(String),
    #[error("server unreachable: {0}")]
    Connection(String),
    #[error("message could not be built: {0}")]
    Message(String),
}

/// Outbound mail boundary. Implementations may block.
pub trait MailTransport: Send + Sync {
    fn send(&self, account: &MailAccount, message: &OutboundMessage) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Username, password or destination missing; nothing was attempted.
    NotConfigured,
}

pub struct DeliveryPipeline {
    settings: Arc<SettingsStore>,
    transport: Arc<dyn MailTransport>,
}

impl DeliveryPipeline {
    pub fn new(settings: Arc<SettingsStore>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    /// Build and send `notice` using the configuration as it is right now.
    pub fn send(&self, notice: Notice<'_>) -> Result<SendOutcome, TransportError> {
        let config = self.settings.snapshot();
        if !config.is_complete() {
            debug!("Skipping {} mail: delivery not configured", notice.label());
            return Ok(SendOutcome::NotConfigured);
        }

        let message = OutboundMessage::build(&config, &notice, Local::now());
        let account = MailAccount::from_config(&config);
        self.transport.send(&account, &message)?;

        debug!("Sent {} mail to {}", notice.label(), message.to);
        Ok(SendOutcome::Sent)
    }

    /// Send a control notice. Failures are logged and dropped; control notices are
    /// never retried. Returns whether a message went out.
    pub fn notify(&self, notice: Notice<'_>) -> bool {
        debug_assert!(notice.is_control());
        match self.send(notice) {
            Ok(SendOutcome::Sent) => {
                info!("Sent {} notice", notice.label());
                true
            }
            Ok(SendOutcome::NotConfigured) => false,
            Err(err) => {
                warn!("Dropping {} notice: {err}", notice.label());
                false
            }
        }
    }

    pub fn deliver_frame(&self, frame: &CapturedFrame) -> Result<SendOutcome, TransportError> {
        self.send(Notice::Screenshot(frame))
    }
}
