//! Small helpers shared across the pipeline.
//!
//! - Log-safe truncation and slugs for snapshot file names
//! - JSON truncation detection for LLM responses
//! - Randomized pacing delays
//! - Output directory validation

use crate::config::DelayBounds;
use rand::{Rng, rng};
use std::fs as stdfs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` characters (never inside a UTF-8 sequence)
/// with an ellipsis and the number of dropped bytes appended.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of characters to keep
///
/// # Returns
///
/// The original string if it has at most `max` characters, otherwise a
/// truncated version with `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the LLM response is cut off (e.g., due to token limits), the
/// resulting JSON will fail to parse with an EOF error.
///
/// # Returns
///
/// `true` if the error is an EOF (end-of-file) error, indicating truncation.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed to a
/// single `-`, capped at 60 characters.
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    slug.chars().take(60).collect::<String>().trim_end_matches('-').to_string()
}

/// A uniformly random delay within `bounds`.
pub fn jittered_delay(bounds: &DelayBounds) -> Duration {
    let (lo, hi) = if bounds.min_ms <= bounds.max_ms {
        (bounds.min_ms, bounds.max_ms)
    } else {
        (bounds.max_ms, bounds.min_ms)
    };
    if hi == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng().random_range(lo..=hi))
}

/// Sleep for a jittered delay; zero bounds return immediately.
pub async fn pause(bounds: &DelayBounds) {
    let delay = jittered_delay(bounds);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let s = "₹₹₹₹";
        assert_eq!(truncate_for_log(s, 2), "₹₹…(+6 bytes)");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Nifty IT"), "nifty-it");
        assert_eq!(slugify("thehindu.com/business/"), "thehindu-com-business");
        assert_eq!(slugify("  M&M  results!! "), "m-m-results");
        assert_eq!(slugify("₹"), "");
        assert_eq!(slugify(&"a".repeat(80)).len(), 60);
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let bounds = DelayBounds::new(100, 200);
        for _ in 0..50 {
            let d = jittered_delay(&bounds);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
        assert_eq!(jittered_delay(&DelayBounds::zero()), Duration::ZERO);
        let swapped = DelayBounds::new(300, 100);
        let d = jittered_delay(&swapped);
        assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(300));
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#;
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_eof);
        assert!(looks_truncated(&result.unwrap_err()));

        let json_bad = r#"{"field": nope}"#;
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_bad);
        assert!(!looks_truncated(&result.unwrap_err()));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());
    }
}
