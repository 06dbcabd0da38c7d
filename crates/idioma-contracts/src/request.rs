use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::{
    LanguageVariant, OperationMode, OperationType, ReferenceCitationStyle, WritingStyle,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("select at least one operation type")]
    NoOperations,
    #[error("provide text, a link or at least one image")]
    NoInput,
}

/// Inline image carried with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 without the `data:` prefix.
    pub data: String,
}

impl ImagePayload {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: BASE64.encode(bytes),
        }
    }
}

/// Immutable snapshot of everything a single submission needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    pub source_variant: LanguageVariant,
    pub target_variant: LanguageVariant,
    pub writing_style: WritingStyle,
    pub operation_mode: OperationMode,
    pub operation_types: Vec<OperationType>,
    pub citation_style: ReferenceCitationStyle,
    pub raw_text: String,
    pub raw_url: String,
    pub images: Vec<ImagePayload>,
}

impl RequestParameters {
    pub fn has_input(&self) -> bool {
        !self.raw_text.trim().is_empty() || !self.raw_url.trim().is_empty() || !self.images.is_empty()
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.operation_types.is_empty() {
            return Err(RequestError::NoOperations);
        }
        if !self.has_input() {
            return Err(RequestError::NoInput);
        }
        Ok(())
    }
}

/// Editable form state. Call [`RequestDraft::snapshot`] to freeze it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub source_variant: LanguageVariant,
    pub target_variant: LanguageVariant,
    pub writing_style: WritingStyle,
    pub operation_mode: OperationMode,
    pub citation_style: ReferenceCitationStyle,
    pub raw_text: String,
    pub raw_url: String,
    operations: Vec<OperationType>,
    images: Vec<ImagePayload>,
}

impl Default for RequestDraft {
    fn default() -> Self {
        Self {
            source_variant: LanguageVariant::default(),
            target_variant: LanguageVariant::default(),
            writing_style: WritingStyle::default(),
            operation_mode: OperationMode::default(),
            citation_style: ReferenceCitationStyle::default(),
            raw_text: String::new(),
            raw_url: String::new(),
            operations: vec![OperationType::Rewrite],
            images: Vec::new(),
        }
    }
}

impl RequestDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[OperationType] {
        &self.operations
    }

    pub fn images(&self) -> &[ImagePayload] {
        &self.images
    }

    /// Selects the operation if absent, removes it otherwise. Returns whether
    /// it is selected afterwards.
    pub fn toggle_operation(&mut self, operation: OperationType) -> bool {
        if let Some(idx) = self.operations.iter().position(|item| *item == operation) {
            self.operations.remove(idx);
            false
        } else {
            self.operations.push(operation);
            true
        }
    }

    pub fn set_operations(&mut self, operations: impl IntoIterator<Item = OperationType>) {
        self.operations.clear();
        for operation in operations {
            if !self.operations.contains(&operation) {
                self.operations.push(operation);
            }
        }
    }

    /// Appends text the way dropped text files are merged: separated from
    /// existing text by a blank line.
    pub fn append_text(&mut self, text: &str) {
        if !self.raw_text.is_empty() {
            self.raw_text.push_str("\n\n");
        }
        self.raw_text.push_str(text);
    }

    pub fn push_image(&mut self, image: ImagePayload) {
        self.images.push(image);
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImagePayload> {
        if index < self.images.len() {
            Some(self.images.remove(index))
        } else {
            None
        }
    }

    /// Clears inputs but keeps the selected options.
    pub fn clear_inputs(&mut self) {
        self.raw_text.clear();
        self.raw_url.clear();
        self.images.clear();
    }


    pub fn snapshot(&self) -> Result<RequestParameters, RequestError> {
        let params = RequestParameters {
            source_variant: self.source_variant,
            target_variant: self.target_variant,
            writing_style: self.writing_style,
            operation_mode: self.operation_mode,
            operation_types: self.operations.clone(),
            citation_style: self.citation_style,
            raw_text: self.raw_text.clone(),
            raw_url: self.raw_url.trim().to_string(),
            images: self.images.clone(),
        };
        params.validate()?;
        Ok(params)
    }
}
