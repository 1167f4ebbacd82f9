use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local};

use crate::{
    models::{CapturedFrame, BODY_STAMP_FORMAT},
    settings::Configuration,
};

pub const ATTACHMENT_NAME: &str = "screenshot.jpg";
pub const ATTACHMENT_CONTENT_TYPE: &str = "image/jpeg";

/// What an outbound message announces.
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    Startup,
    Activated,
    Deactivated,
    Exit,
    Screenshot(&'a CapturedFrame),
}

impl Notice<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Notice::Startup => "startup",
            Notice::Activated => "activation",
            Notice::Deactivated => "deactivation",
            Notice::Exit => "exit",
            Notice::Screenshot(_) => "screenshot",
        }
    }

    /// Control notices are fire-and-forget; screenshots are retried via the queue.
    pub fn is_control(&self) -> bool {
        !matches!(self, Notice::Screenshot(_))
    }

    /// Plain-text body. Screenshots carry their own capture time; everything else
    /// is stamped with `now`.
    pub fn body(&self, now: DateTime<Local>) -> String {
        let stamp = |at: DateTime<Local>| at.format(BODY_STAMP_FORMAT).to_string();
        match self {
            Notice::Startup => format!("[Startup] Monitoring begun at {}", stamp(now)),
            Notice::Activated => format!("[Activated] Monitoring resumed at {}", stamp(now)),
            Notice::Deactivated => format!("[Deactivated] Monitoring stopped at {}", stamp(now)),
            Notice::Exit => format!("[Exit] Application exited at {}", stamp(now)),
            Notice::Screenshot(frame) => {
                format!("Screenshot taken at {}", stamp(frame.captured_at()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Arc<[u8]>,
}

/// Transport-neutral message. Threading headers are both set to `thread_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub thread_id: String,
    pub attachment: Option<MessageAttachment>,
}

impl OutboundMessage {
    pub fn build(config: &Configuration, notice: &Notice<'_>, now: DateTime<Local>) -> Self {
        let attachment = match notice {
            Notice::Screenshot(frame) => Some(MessageAttachment {
                filename: ATTACHMENT_NAME.into(),
                content_type: ATTACHMENT_CONTENT_TYPE.into(),
                bytes: Arc::from(frame.bytes()),
            }),
            _ => None,
        };

        Self {
            from: config.smtp_username.trim().to_string(),
            to: config.destination_email.trim().to_string(),
            subject: config.mail.subject.clone(),
            body: notice.body(now),
            thread_id: config.thread_id.clone(),
            attachment,
        }
    }
}

/// Where and as whom to send.
#[derive(Clone, PartialEq, Eq)]
pub struct MailAccount {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl MailAccount {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            host: config.mail.host.clone(),
            port: config.mail.port,
            username: config.smtp_username.trim().to_string(),
            password: config.smtp_password.clone(),
            timeout: Duration::from_secs(config.mail.timeout_secs.max(1)),
        }
    }
}

impl std::fmt::Debug for MailAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailAccount")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
