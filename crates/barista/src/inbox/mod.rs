//! Email inbox ingestion.
//!
//! Unread mail whose subject starts with a `[module]` tag becomes a record
//! in that module, with attachments, links, a history trail and an
//! acknowledgment back to the sender. The `processed_emails` ledger makes
//! every message count exactly once.

pub mod client;
pub mod content;
pub mod engine;
pub mod error;
pub mod graph;
pub mod responder;
pub mod scheduler;
pub mod subject;
pub mod tracker;
pub mod transport;
pub mod types;

pub use client::{GraphMailboxClient, MailboxClient};
pub use content::{extract_links, to_plain_text, ExtractedLink, MAX_LINK_LENGTH};
pub use engine::{EngineOptions, IngestionEngine, PassItem, PassSummary, UnprocessedMessage};
pub use error::InboxError;
pub use graph::{GraphAuth, GraphSession};
pub use responder::{compose, Acknowledgment, AutoResponder, DEFAULT_SITE_NAME};
pub use scheduler::{SchedulerHandle, SchedulerStatus, MAX_INTERVAL_MINUTES};
pub use subject::{parse_tag, TaggedSubject};
pub use tracker::LedgerTracker;
pub use transport::{build_transport, GraphMailTransport, MailTransport, SmtpMailTransport};
pub use types::{AttachmentMeta, DownloadedAttachment, MailMessage, OutgoingMail, SendReceipt};
