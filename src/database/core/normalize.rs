//! Migration statement normalization
//!
//! Migration statements are stored as raw SQL text that may carry comments
//! and may or may not end with a semicolon. Before a statement is sent to
//! SQLite it goes through [`normalize_statement`]:
//!
//! 1. trim surrounding whitespace
//! 2. strip `--` line comments
//! 3. strip `/* ... */` block comments (non-greedy, may span lines)
//! 4. trim again
//! 5. terminate with `;` if the result is non-empty and not already terminated
//!
//! Statements that normalize to an empty string are never executed.

/// Normalize a single raw migration statement
pub fn normalize_statement(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_line_comments = strip_line_comments(trimmed);
    let without_block_comments = strip_block_comments(&without_line_comments);
    let mut statement = without_block_comments.trim().to_string();

    if !statement.is_empty() && !statement.ends_with(';') {
        statement.push(';');
    }
    statement
}

/// Normalize a statement list, dropping statements that end up empty
///
/// The relative order of the remaining statements is preserved.
pub fn normalized_statements(raw: &[&str]) -> Vec<String> {
    raw.iter()
        .map(|s| normalize_statement(s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Remove everything from `--` to the end of each line
fn strip_line_comments(sql: &str) -> String {
    sql.split('\n')
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `/* ... */` blocks, matching each opener with the nearest closer
///
/// An opener without a closer is left in place.
fn strip_block_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;

    while let Some(start) = rest.find("/*") {
        match rest[start + 2..].find("*/") {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + 2 + end + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_semicolon() {
        assert_eq!(
            normalize_statement("CREATE TABLE t (id TEXT)"),
            "CREATE TABLE t (id TEXT);"
        );
    }

    #[test]
    fn test_keeps_existing_semicolon() {
        assert_eq!(
            normalize_statement("  CREATE TABLE t (id TEXT);  "),
            "CREATE TABLE t (id TEXT);"
        );
    }

    #[test]
    fn test_comment_only_statements_are_empty() {
        assert_eq!(normalize_statement(""), "");
        assert_eq!(normalize_statement("   \n\t "), "");
        assert_eq!(normalize_statement("-- just a note"), "");
        assert_eq!(normalize_statement("/* block */"), "");
        assert_eq!(
            normalize_statement("-- first\n/* second\n spans lines */\n  -- third"),
            ""
        );
    }

    #[test]
    fn test_strips_line_comments() {
        let raw = "CREATE TABLE tags ( -- tag table\n  id TEXT PRIMARY KEY -- key\n)";
        assert_eq!(
            normalize_statement(raw),
            "CREATE TABLE tags ( \n  id TEXT PRIMARY KEY \n);"
        );
    }

    #[test]
    fn test_strips_multiline_block_comments_non_greedy() {
        let raw = "/* header\n comment */ALTER TABLE phrases /* inline */ADD COLUMN note TEXT";
        assert_eq!(
            normalize_statement(raw),
            "ALTER TABLE phrases ADD COLUMN note TEXT;"
        );
    }

    #[test]
    fn test_unterminated_block_comment_is_kept() {
        assert_eq!(normalize_statement("SELECT 1 /* open"), "SELECT 1 /* open;");
    }

    #[test]
    fn test_semicolon_inside_trailing_comment_does_not_count() {
        assert_eq!(normalize_statement("SELECT 1 -- done;"), "SELECT 1;");
    }

    #[test]
    fn test_never_duplicates_semicolon() {
        for raw in ["SELECT 1;", "SELECT 1; -- note", "SELECT 1;/* x */", "SELECT 1"] {
            let normalized = normalize_statement(raw);
            assert!(normalized.ends_with(';'));
            assert!(!normalized.ends_with(";;"), "duplicated in {:?}", normalized);
        }
    }

    #[test]
    fn test_normalized_statements_drops_empty_and_keeps_order() {
        let raw = [
            "CREATE TABLE a (id TEXT)",
            "-- nothing here",
            "CREATE TABLE b (id TEXT);",
            "  ",
        ];
        assert_eq!(
            normalized_statements(&raw),
            vec![
                "CREATE TABLE a (id TEXT);".to_string(),
                "CREATE TABLE b (id TEXT);".to_string()
            ]
        );
    }
}
