//! Turn emails into overlapping text chunks for embedding.

use crate::email::EmailRecord;

/// Render an email as one indexable text block.
pub fn flatten_email(email: &EmailRecord) -> String {
    format!(
        "Email ID: {}\nSubject: {}\nFrom: {} <{}>\nTo: {}\nDate: {}\nCategory: {}\n\n{}",
        email.id,
        email.subject,
        email.sender_name,
        email.sender_email,
        email.to.join(", "),
        email.timestamp,
        email.category.as_deref().unwrap_or(""),
        email.body_text,
    )
}

/// Split `text` into windows of at most `size` characters, each starting
/// `overlap` characters before the previous one ended.
///
/// Windows prefer to end on whitespace when one falls in their back half.
/// Overlap is capped at half the window so every step makes progress.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if size == 0 || chars.len() <= size {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(size / 2);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + size).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            chars[start..hard_end]
                .iter()
                .rposition(|c| c.is_whitespace())
                .map(|p| start + p)
                .filter(|&p| p > start + size / 2)
                .unwrap_or(hard_end)
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}
