use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use idioma_contracts::request::{ImagePayload, RequestDraft};

/// What a file turned into once attached to a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Image { mime_type: String, bytes: usize },
    Text { chars: usize },
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    match extension(path).as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn is_text_path(path: &Path) -> bool {
    matches!(extension(path).as_str(), "txt" | "md")
}

/// Images become inline payloads; `.txt` and `.md` files are appended to
/// the draft text.
pub fn attach_file(draft: &mut RequestDraft, path: &Path) -> Result<Attachment> {
    if let Some(mime_type) = mime_for_path(path) {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        draft.push_image(ImagePayload::from_bytes(mime_type, &bytes));
        return Ok(Attachment::Image {
            mime_type: mime_type.to_string(),
            bytes: bytes.len(),
        });
    }
    if is_text_path(path) {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        draft.append_text(&text);
        return Ok(Attachment::Text {
            chars: text.chars().count(),
        });
    }
    bail!(
        "unsupported file type: {} (expected png, jpg, jpeg, webp, gif, txt or md)",
        path.display()
    );
}
