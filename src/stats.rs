//! Content cache statistics.
//!
//! Used by `conquerx cache stats` to show how many pages are cached, how
//! much disk they use and when the cache was last written.

use crate::cache::{CacheStats, ContentCache};

/// Render the stats report printed by `conquerx cache stats`.
pub fn render_cache_stats(cache: &ContentCache, stats: &CacheStats) -> String {
    let newest = match stats.newest {
        Some(ts) => format_ts_relative(ts),
        None => "never".to_string(),
    };

    let mut out = String::new();
    out.push_str("ConQuerX Content Cache\n");
    out.push_str("======================\n\n");
    out.push_str(&format!("  Directory:   {}\n", cache.dir().display()));
    out.push_str(&format!("  Pages:       {}\n", stats.total_pages));
    out.push_str(&format!("  Size:        {}\n", format_bytes(stats.total_bytes)));
    out.push_str(&format!("  Last write:  {}\n", newest));
    out
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 3 * 86400), "3 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }

    #[test]
    fn test_render_empty_cache() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = ContentCache::new(tmp.path());
        let report = render_cache_stats(&cache, &cache.stats());
        assert!(report.contains("Pages:       0"));
        assert!(report.contains("Last write:  never"));
    }
}
