//! Shared utility functions for CLI commands

use std::time::Duration;

/// Format a byte size as a human-readable string
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Safely truncate a hash string to a maximum length
///
/// Returns the entire string if it's shorter than `max_len`.
#[must_use]
pub fn truncate_hash(hash: &str, max_len: usize) -> &str {
    let end = hash.len().min(max_len);
    &hash[..end]
}

/// Cache TTL as `1h 30m`
#[must_use]
pub fn format_ttl(ttl: Duration) -> String {
    humantime::format_duration(Duration::from_secs(ttl.as_secs())).to_string()
}

/// Parse a `--cache-ttl` value: humantime (`90m`, `2h`) or bare minutes
pub fn parse_ttl(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if let Ok(minutes) = value.parse::<u64>() {
        return Ok(Duration::from_secs(minutes * 60));
    }
    humantime::parse_duration(value).map_err(|e| format!("invalid duration '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5242880), "5.00 MB");
        assert_eq!(format_size(1073741824), "1.00 GB");
    }

    #[test]
    fn test_truncate_hash() {
        let hash = "abcdef1234567890abcdef1234567890";
        assert_eq!(truncate_hash(hash, 12), "abcdef123456");
        assert_eq!(truncate_hash("abc", 12), "abc");
        assert_eq!(truncate_hash("", 12), "");
    }

    #[test]
    fn test_ttl_round_trip() {
        assert_eq!(parse_ttl("90").unwrap(), Duration::from_secs(90 * 60));
        assert_eq!(parse_ttl("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(format_ttl(Duration::from_secs(86400)), "1day");
        assert_eq!(format_ttl(Duration::from_millis(90_500)), "1m 30s");
        assert!(parse_ttl("soon").is_err());
    }
}
