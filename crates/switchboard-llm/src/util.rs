//! Shared helpers for providers

const KEY_MASK_VISIBLE_CHARS: usize = 4;
const MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY: usize = 12;
const MAX_ERROR_LEN: usize = 300;

/// Mask an API key for logging (`sk-t...cdef`).
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY || !key.is_ascii() {
        return "****".to_string();
    }
    format!(
        "{}...{}",
        &key[..KEY_MASK_VISIBLE_CHARS],
        &key[key.len() - KEY_MASK_VISIBLE_CHARS..]
    )
}

/// Strip credentials-related detail and overly long bodies from API errors.
#[must_use]
pub fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("apikey")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        return "API authentication error. Please check your API key configuration.".to_string();
    }

    if error.chars().count() > MAX_ERROR_LEN {
        let truncated: String = error.chars().take(MAX_ERROR_LEN).collect();
        format!("{truncated}...(truncated)")
    } else {
        error.to_string()
    }
}
