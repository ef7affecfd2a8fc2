/// Human-readable byte count
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

/// First `len` characters of a hash, for tables
pub fn short_hash(hash: &str, len: usize) -> &str {
    match hash.char_indices().nth(len) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}

/// Keep the tail of long paths so the file name stays visible
pub fn truncate_path(path: &str, max: usize) -> String {
    let count = path.chars().count();
    if count <= max || max < 4 {
        return path.to_string();
    }
    let tail: String = path.chars().skip(count - (max - 3)).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_short_hash_and_truncate() {
        assert_eq!(short_hash("abcdef", 4), "abcd");
        assert_eq!(short_hash("ab", 4), "ab");
        assert_eq!(truncate_path("short", 10), "short");
        let long = "/very/long/path/to/some/file.exe";
        let cut = truncate_path(long, 12);
        assert_eq!(cut.chars().count(), 12);
        assert!(cut.ends_with("file.exe"));
    }
}
