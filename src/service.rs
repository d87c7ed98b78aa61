use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classification::{classify_values, Classification};
use crate::error::FormatError;
use crate::ews::{AttachmentContent, AttachmentSource};
use crate::metadata;
use crate::package::DocumentPackage;

/// Wire request posted by the add-in front-end. Treated as untrusted
/// input and never mutated after deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationRequest {
    pub token: String,
    pub ews_url: String,
    pub attachment_ids: Vec<String>,
}

/// Wire response: the most restrictive label found across all
/// attachments, or an empty label plus a reason when the lookup itself
/// failed. `error` is empty on every success path, including the case
/// where no attachment carried a recognized marking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResponse {
    pub classification: String,
    pub error: String,
}

impl ClassificationResponse {
    pub fn verdict(level: Classification) -> Self {
        ClassificationResponse {
            classification: level.label().to_string(),
            error: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ClassificationResponse {
            classification: String::new(),
            error: message.into(),
        }
    }
}

/// Orchestrates one classification lookup: fetch all attachments in a
/// single batch, classify each independently, reduce to the highest
/// level. Holds no state across requests.
pub struct ClassificationService {
    source: Arc<dyn AttachmentSource>,
}

impl ClassificationService {
    pub fn new(source: Arc<dyn AttachmentSource>) -> Self {
        ClassificationService { source }
    }

    pub async fn classify(&self, request: &ClassificationRequest) -> ClassificationResponse {
        if request.attachment_ids.is_empty() {
            return ClassificationResponse::verdict(Classification::None);
        }

        let attachments = match self
            .source
            .fetch(&request.token, &request.ews_url, &request.attachment_ids)
            .await
        {
            Ok(attachments) => attachments,
            Err(e) => {
                log::warn!("Attachment fetch failed: {}", e);
                return ClassificationResponse::failure(e.to_string());
            }
        };

        let mut highest = Classification::None;
        for attachment in attachments {
            let level = classify_attachment(attachment);
            highest = highest.max(level);
        }

        ClassificationResponse::verdict(highest)
    }
}

/// Per-attachment pipeline with graceful degradation: content that is
/// not a readable document package contributes nothing instead of
/// failing the batch, so a PDF attachment cannot block send.
fn classify_attachment(attachment: AttachmentContent) -> Classification {
    let name = attachment.name;
    match classify_document(attachment.bytes) {
        Ok(level) => {
            log::info!("Attachment {} classified as {:?}", name, level);
            level
        }
        Err(e) => {
            log::debug!("Attachment {} not classifiable: {}", name, e);
            Classification::None
        }
    }
}

/// Runs the package -> metadata -> policy pipeline over one document.
pub fn classify_document(bytes: Vec<u8>) -> Result<Classification, FormatError> {
    let mut package = DocumentPackage::open(bytes)?;
    let properties = metadata::extract_properties(&mut package)?;
    Ok(classify_values(
        properties.iter().map(|property| property.value.as_str()),
    ))
}
