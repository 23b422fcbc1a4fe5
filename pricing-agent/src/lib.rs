pub mod api;
pub mod app_context;
pub mod completion;
pub mod config;
pub mod contextual;
pub mod embedding;
pub mod ensemble;
pub mod error;
pub mod generative;
pub mod metrics_utils;
pub mod similarity;
pub mod test_utils;

/// Cut `text` down to `max_chars` characters for logging, marking the cut with `...`.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}
