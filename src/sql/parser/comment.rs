//! Comment removal that keeps line numbering intact.

use super::lexer::{ScanCursor, ScanState};

/// Removes `/* ... */`, `-- ...` and `# ...` comments from `sql`.
///
/// Every newline of the input survives, including those inside block
/// comments, so line `n` of the output corresponds to line `n` of the input.
/// Comment markers inside quoted literals are left alone. Block comments do
/// not nest, and an unterminated block comment swallows the rest of the
/// input.
pub fn remove_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut cursor = ScanCursor::new(sql, 0);

    while let Some((before, range)) = cursor.step() {
        let keep = match before {
            ScanState::Quoted(_) => true,
            ScanState::Code => matches!(cursor.state(), ScanState::Code | ScanState::Quoted(_)),
            ScanState::BlockComment | ScanState::LineComment => false,
        };
        if keep {
            out.extend_from_slice(&bytes[range]);
        } else if bytes[range].contains(&b'\n') {
            out.push(b'\n');
        }
    }

    // Kept spans only ever break at ASCII comment markers.
    String::from_utf8_lossy(&out).into_owned()
}
