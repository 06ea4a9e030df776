//! Resolves client-side `DELIMITER` directives into plain `;` terminators.

use tracing::debug;

/// Returns the new delimiter if `line` is a `DELIMITER <token>` directive
fn parse_directive(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let keyword = trimmed.get(..9)?;
    if !keyword.eq_ignore_ascii_case("delimiter") {
        return None;
    }
    let token = trimmed[9..].trim();
    Some(token).filter(|t| !t.is_empty() && !t.contains(char::is_whitespace))
}

/// Rewrites `sql` so that every statement ends with `;`.
///
/// Directive lines are dropped. A line whose trimmed end carries the active
/// delimiter has that one trailing occurrence replaced by `;`; any other
/// occurrence on the line is left as written.
pub fn preprocess(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut delimiter = ";".to_string();

    for line in sql.split_inclusive('\n') {
        if let Some(token) = parse_directive(line) {
            debug!(delimiter = token, "switching statement delimiter");
            delimiter = token.to_string();
            continue;
        }

        let content = line.trim_end();
        if delimiter != ";" && content.ends_with(delimiter.as_str()) {
            out.push_str(&content[..content.len() - delimiter.len()]);
            out.push(';');
            out.push_str(&line[content.len()..]);
        } else {
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::preprocess;

    #[test]
    fn test_no_directive_is_identity() {
        let sql = "SELECT 1;\nSELECT 2;\n";
        assert_eq!(preprocess(sql), sql);
    }

    #[test]
    fn test_routine_with_custom_delimiter() {
        let sql = "DELIMITER //\n\
                   CREATE PROCEDURE p()\n\
                   BEGIN\n\
                   \x20 SELECT 1;\n\
                   END //\n\
                   DELIMITER ;\n\
                   CALL p();\n";
        let out = preprocess(sql);
        assert_eq!(
            out,
            "CREATE PROCEDURE p()\nBEGIN\n  SELECT 1;\nEND ;\nCALL p();\n"
        );
        assert!(!out.contains("//"));
    }

    #[test]
    fn test_only_trailing_occurrence_replaced() {
        let sql = "delimiter $$\nSELECT '$$' $$   \n";
        assert_eq!(preprocess(sql), "SELECT '$$' ;   \n");
    }

    #[test]
    fn test_directive_is_case_insensitive() {
        let sql = "  Delimiter |\nSELECT 1|\ndelimiter ;\nSELECT 2;";
        assert_eq!(preprocess(sql), "SELECT 1;\nSELECT 2;");
    }

    #[test]
    fn test_delimiter_without_space() {
        assert_eq!(preprocess("DELIMITER//\nSELECT 1//\n"), "SELECT 1;\n");
    }
}
