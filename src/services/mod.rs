//! Service layer: external API clients, storage and the multi-step flows
//! shared between routes.

pub mod cache;
pub mod checklist;
pub mod conversion;
pub mod deliverables;
pub mod dropbox;
pub mod link_preview;
pub mod llm_client;
pub mod storage;
pub mod xero;
pub mod xero_sync;

pub use cache::RedisCache;
pub use dropbox::DropboxClient;
pub use llm_client::LlmClient;
pub use storage::{AttachmentStore, LocalAttachmentStore};
pub use xero::XeroClient;
