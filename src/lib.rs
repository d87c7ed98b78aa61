pub mod classification;
pub mod config;
pub mod error;
pub mod ews;
pub mod metadata;
pub mod package;
pub mod server;
pub mod service;

pub use classification::Classification;
pub use config::Config;
pub use error::{FetchError, FormatError};
pub use ews::{AttachmentContent, AttachmentSource, EwsClient};
pub use server::ApiServer;
pub use service::{ClassificationRequest, ClassificationResponse, ClassificationService};
