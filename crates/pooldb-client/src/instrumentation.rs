//! Tracing conventions shared by the pools and the id allocator.
//!
//! Span names live here so every crate in the workspace emits the same
//! vocabulary. Statement text recorded on spans goes through
//! [`SanitizationConfig`] so literal values never reach the logs.

use tracing::Span;

/// Store system identifier recorded on spans.
pub const DB_SYSTEM: &str = "pooldb";

/// Span names for pooled operations.
pub mod span_names {
    /// Acquiring an item from a pool.
    pub const ACQUIRE: &str = "pooldb.acquire";
    /// Executing a recycled command.
    pub const EXECUTE: &str = "pooldb.execute";
    /// Running a gap scan to refill an id allocator.
    pub const REFILL: &str = "pooldb.refill";
}

/// Configuration for statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to replace literals.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder used for replaced literals.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 1024,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// A configuration that records statements verbatim.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }
        truncate_string(&sanitize_sql(sql, &self.placeholder), self.max_length)
    }
}

/// Open a debug span around one command execution.
#[must_use]
pub fn execute_span(sql: &str, sanitization: &SanitizationConfig) -> Span {
    tracing::debug_span!(
        span_names::EXECUTE,
        db.system = DB_SYSTEM,
        db.operation = extract_operation(sql),
        db.statement = %sanitization.sanitize(sql),
        db.rows_affected = tracing::field::Empty,
    )
}

/// Replace string and numeric literals with `placeholder`.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                // doubled quote is an escaped quote
                if chars.peek() == Some(&q) {
                    chars.next();
                    continue;
                }
                quote = None;
                result.push_str(placeholder);
            }
            continue;
        }

        if c == '\'' || c == '"' {
            quote = Some(c);
            continue;
        }

        if c.is_ascii_digit()
            && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_' || ch == '@')
        {
            while chars
                .peek()
                .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
            {
                chars.next();
            }
            result.push_str(placeholder);
            continue;
        }

        result.push(c);
    }

    if quote.is_some() {
        result.push_str(placeholder);
    }

    result
}

/// Truncate to at most `max_len` bytes on a char boundary.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Extract the operation keyword from a statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let head = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match head.as_str() {
        "SELECT" => "SELECT",
        "INSERT" => "INSERT",
        "UPDATE" => "UPDATE",
        "DELETE" => "DELETE",
        "MERGE" => "MERGE",
        "EXEC" | "EXECUTE" | "CALL" => "EXECUTE",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT id FROM items"), "SELECT");
        assert_eq!(extract_operation("  insert into items"), "INSERT");
        assert_eq!(extract_operation("UPDATE items SET x = 1"), "UPDATE");
        assert_eq!(extract_operation("delete from items"), "DELETE");
        assert_eq!(extract_operation("EXEC sp_who"), "EXECUTE");
        assert_eq!(extract_operation("VACUUM"), "OTHER");
        assert_eq!(extract_operation(""), "OTHER");
    }

    #[test]
    fn test_sanitize_sql() {
        assert_eq!(
            sanitize_sql("UPDATE guilds SET name = 'Ravens' WHERE id = 42", "?"),
            "UPDATE guilds SET name = ? WHERE id = ?"
        );
        assert_eq!(
            sanitize_sql("SELECT 'it''s' FROM t", "?"),
            "SELECT ? FROM t"
        );
        // parameter names and identifiers keep their digits
        assert_eq!(
            sanitize_sql("INSERT INTO t2 (c1) VALUES (@p1)", "?"),
            "INSERT INTO t2 (c1) VALUES (@p1)"
        );
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("abcdefghij", 8), "abcde...");
        // multi-byte characters are never split
        assert_eq!(truncate_string("ééééé", 6), "é...");
    }

    #[test]
    fn test_sanitization_config() {
        let config = SanitizationConfig::default();
        assert_eq!(config.sanitize("DELETE FROM t WHERE id = 5"), "DELETE FROM t WHERE id = ?");

        let raw = SanitizationConfig::no_sanitization();
        assert_eq!(raw.sanitize("DELETE FROM t WHERE id = 5"), "DELETE FROM t WHERE id = 5");
    }
}
