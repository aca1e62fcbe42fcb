/**
 * Input Validation Module
 *
 * Centralized validation for spoken command arguments and config values.
 * Rejects control characters, malformed ids and out-of-range settings
 * before they reach the flat-file stores or external processes.
 */
use thiserror::Error;

/// Longest task or reminder text accepted from a spoken command
pub const MAX_TEXT_LEN: usize = 500;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too long: max {max}, got {actual}")]
    ValueTooLong { max: usize, actual: usize },
}

/// Validate free text for a to-do item or reminder (non-empty, bounded, printable)
pub fn validate_item_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Text cannot be empty".to_string(),
        ));
    }

    let len = trimmed.chars().count();
    if len > MAX_TEXT_LEN {
        return Err(ValidationError::ValueTooLong {
            max: MAX_TEXT_LEN,
            actual: len,
        });
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(
            "Text contains invalid control characters".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Normalize a spoken item reference into a store id.
///
/// Accepts either the bare number (`"3"`) or the full id (`"reminder-3"`)
/// and always returns `"{prefix}-{n}"`.
pub fn normalize_item_id(raw: &str, prefix: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    let number = raw
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(raw)
        .trim();

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat(format!(
            "Expected a number or '{}-<number>', got '{}'",
            prefix, raw
        )));
    }

    let n: u32 = number.parse().map_err(|_| {
        ValidationError::InvalidRange(format!("Item number out of range: {}", number))
    })?;
    if n == 0 {
        return Err(ValidationError::InvalidRange(
            "Item numbers start at 1".to_string(),
        ));
    }

    Ok(format!("{}-{}", prefix, n))
}

/// Validate the reminder poll interval (1s to 59s).
///
/// Anything a minute or longer could skip over a whole matching minute.
pub fn validate_poll_interval_secs(secs: u64) -> Result<u64, ValidationError> {
    if !(1..=59).contains(&secs) {
        return Err(ValidationError::InvalidRange(format!(
            "Poll interval must be between 1s and 59s, got {}s",
            secs
        )));
    }
    Ok(secs)
}

/// Validate how long a reminder notification stays up (1s to 45s).
///
/// The poller is blocked while a notification is shown, so it must close in
/// time for the next minute's reminders.
pub fn validate_notification_secs(secs: u64) -> Result<u64, ValidationError> {
    if !(1..=45).contains(&secs) {
        return Err(ValidationError::InvalidRange(format!(
            "Notification timeout must be between 1s and 45s, got {}s",
            secs
        )));
    }
    Ok(secs)
}

/// Validate the media player volume step (1 to 256 player units)
pub fn validate_volume_step(step: u32) -> Result<u32, ValidationError> {
    if !(1..=256).contains(&step) {
        return Err(ValidationError::InvalidRange(format!(
            "Volume step must be between 1 and 256, got {}",
            step
        )));
    }
    Ok(step)
}

/// Validate a TCP port (non-zero)
pub fn validate_port(port: u16) -> Result<u16, ValidationError> {
    if port == 0 {
        return Err(ValidationError::InvalidRange(
            "Port must be between 1 and 65535".to_string(),
        ));
    }
    Ok(port)
}

/// Validate a public skill endpoint (https with a host)
pub fn validate_public_url(raw: &str) -> Result<url::Url, ValidationError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ValidationError::InvalidFormat(format!("Invalid URL '{}': {}", raw, e)))?;

    if parsed.scheme() != "https" {
        return Err(ValidationError::InvalidFormat(format!(
            "Skill endpoint must use https, got '{}'",
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none() {
        return Err(ValidationError::InvalidFormat(
            "Skill endpoint has no host".to_string(),
        ));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_text_valid() {
        assert_eq!(validate_item_text("  buy milk ").unwrap(), "buy milk");
    }

    #[test]
    fn test_item_text_invalid() {
        assert!(validate_item_text("").is_err());
        assert!(validate_item_text("   ").is_err());
        assert!(validate_item_text("bad\u{7}bell").is_err());
        assert!(matches!(
            validate_item_text(&"a".repeat(MAX_TEXT_LEN + 1)),
            Err(ValidationError::ValueTooLong { .. })
        ));
    }

    #[test]
    fn test_normalize_item_id() {
        assert_eq!(normalize_item_id("3", "reminder").unwrap(), "reminder-3");
        assert_eq!(normalize_item_id("reminder-12", "reminder").unwrap(), "reminder-12");
        assert_eq!(normalize_item_id(" 7 ", "task").unwrap(), "task-7");
    }

    #[test]
    fn test_normalize_item_id_invalid() {
        assert!(normalize_item_id("", "task").is_err());
        assert!(normalize_item_id("0", "task").is_err());
        assert!(normalize_item_id("three", "task").is_err());
        assert!(normalize_item_id("reminder-2", "task").is_err());
    }

    #[test]
    fn test_poll_interval() {
        assert!(validate_poll_interval_secs(30).is_ok());
        assert!(validate_poll_interval_secs(0).is_err());
        assert!(validate_poll_interval_secs(60).is_err());
    }

    #[test]
    fn test_notification_secs() {
        assert!(validate_notification_secs(30).is_ok());
        assert!(validate_notification_secs(0).is_err());
        assert!(validate_notification_secs(60).is_err());
    }

    #[test]
    fn test_volume_step_and_port() {
        assert!(validate_volume_step(20).is_ok());
        assert!(validate_volume_step(0).is_err());
        assert!(validate_volume_step(300).is_err());
        assert!(validate_port(5000).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_public_url() {
        assert!(validate_public_url("https://abc.ngrok-free.app/alexa").is_ok());
        assert!(validate_public_url("http://abc.ngrok-free.app/alexa").is_err());
        assert!(validate_public_url("not a url").is_err());
    }
}
