use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};

use super::{MailAccount, MailTransport, OutboundMessage, TransportError};

/// STARTTLS submission through `lettre`. A fresh connection per message keeps
/// credential changes effective immediately.
#[derive(Debug, Default)]
pub struct SmtpMailTransport;

impl SmtpMailTransport {
    pub fn new() -> Self {
        Self
    }
}

fn to_lettre(message: &OutboundMessage) -> Result<Message, TransportError> {
    let from: Mailbox = message
        .from
        .parse()
        .map_err(|e| TransportError::Message(format!("invalid sender {:?}: {e}", message.from)))?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| TransportError::Message(format!("invalid recipient {:?}: {e}", message.to)))?;

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.clone())
        .in_reply_to(message.thread_id.clone())
        .references(message.thread_id.clone());

    let built = match &message.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| TransportError::Message(e.to_string()))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(message.body.clone()))
                    .singlepart(
                        Attachment::new(attachment.filename.clone())
                            .body(attachment.bytes.to_vec(), content_type),
                    ),
            )
        }
        None => builder.header(ContentType::TEXT_PLAIN).body(message.body.clone()),
    };

    built.map_err(|e| TransportError::Message(e.to_string()))
}

impl MailTransport for SmtpMailTransport {
    fn send(&self, account: &MailAccount, message: &OutboundMessage) -> Result<(), TransportError> {
        let email = to_lettre(message)?;

        let mailer = SmtpTransport::starttls_relay(&account.host)
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .port(account.port)
            .credentials(Credentials::new(
                account.username.clone(),
                account.password.clone(),
            ))
            .timeout(Some(account.timeout))
            .build();

        mailer.send(&email).map(|_| ()).map_err(|e| {
            if e.is_permanent() {
                TransportError::Authentication(e.to_string())
            } else {
                TransportError::Connection(e.to_string())
            }
        })
    }
}
