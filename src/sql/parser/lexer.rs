//! Low-level scanning over raw SQL text.
//!
//! Two tools live here: `ScanCursor`, a byte cursor that knows whether a
//! position falls inside a quoted literal or a comment, and `Lexer`, a word
//! tokenizer used when balancing control blocks inside routine bodies.

use std::{fmt::Display, iter::Peekable, ops::Range, str::CharIndices};

/// Where a `ScanCursor` currently sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Code,
    /// Inside `/* ... */`
    BlockComment,
    /// Inside `-- ...` or `# ...`, up to the newline
    LineComment,
    /// Inside a literal opened by the given quote byte
    Quoted(u8),
}

/// Forward-only cursor tracking quote and comment state.
///
/// State is only meaningful relative to the position the cursor was created
/// at; callers rescan from a known boundary instead of carrying a cursor
/// across unrelated searches.
pub struct ScanCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    state: ScanState,
}

impl<'a> ScanCursor<'a> {
    pub fn new(sql: &'a str, start: usize) -> Self {
        Self {
            bytes: sql.as_bytes(),
            pos: start,
            state: ScanState::Code,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn in_code(&self) -> bool {
        self.state == ScanState::Code
    }

    /// Consumes input up to (not including) `target`
    pub fn advance_to(&mut self, target: usize) {
        while self.pos < target {
            if self.step().is_none() {
                break;
            }
        }
    }

    /// Consumes one lexical unit. Returns the state in effect before it and
    /// the byte range it covered.
    ///
    /// Two-byte markers (`/*`, `*/`, `--`, backslash escapes) are consumed
    /// whole so a marker is never split between steps.
    pub fn step(&mut self) -> Option<(ScanState, Range<usize>)> {
        let b = *self.bytes.get(self.pos)?;
        let next = self.bytes.get(self.pos + 1).copied();
        let before = self.state;
        let mut width = 1;

        match self.state {
            ScanState::Code => match (b, next) {
                (b'/', Some(b'*')) => {
                    self.state = ScanState::BlockComment;
                    width = 2;
                }
                (b'-', Some(b'-')) => {
                    self.state = ScanState::LineComment;
                    width = 2;
                }
                (b'#', _) => self.state = ScanState::LineComment,
                (b'\'' | b'"', _) => self.state = ScanState::Quoted(b),
                _ => {}
            },
            ScanState::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    self.state = ScanState::Code;
                    width = 2;
                }
            }
            ScanState::LineComment => {
                if b == b'\n' {
                    self.state = ScanState::Code;
                }
            }
            ScanState::Quoted(quote) => {
                if b == b'\\' && next.is_some() {
                    width = 2;
                } else if b == quote {
                    self.state = ScanState::Code;
                }
            }
        }

        let start = self.pos;
        self.pos = (self.pos + width).min(self.bytes.len());
        Some((before, start..self.pos))
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Matches `phrase` at the very start of `text`.
///
/// Matching is ASCII case-insensitive, any run of whitespace stands in for
/// the single spaces between the phrase's words, and a phrase ending in a
/// word character must not be followed by another word character (so `DO`
/// never matches `DROP`). Returns the matched length in bytes.
pub fn match_phrase(text: &str, phrase: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    for (i, word) in phrase.split_whitespace().enumerate() {
        if i > 0 {
            let ws = bytes[pos..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            if ws == 0 {
                return None;
            }
            pos += ws;
        }
        let end = pos + word.len();
        if end > bytes.len() || !bytes[pos..end].eq_ignore_ascii_case(word.as_bytes()) {
            return None;
        }
        pos = end;
    }

    let ends_in_word = phrase.bytes().last().is_some_and(is_word_byte);
    if ends_in_word && bytes.get(pos).copied().is_some_and(is_word_byte) {
        return None;
    }
    Some(pos)
}

/// Finds the next standalone occurrence of `phrase` at or after `from`.
/// Quotes and comments are not considered here; see `ScanCursor`.
pub fn find_phrase(text: &str, phrase: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let first = *phrase.as_bytes().first()?;
    let starts_in_word = is_word_byte(first);
    (from..bytes.len()).find(|&i| {
        bytes[i].eq_ignore_ascii_case(&first)
            && !(starts_in_word && i > 0 && is_word_byte(bytes[i - 1]))
            && match_phrase(&text[i..], phrase).is_some()
    })
}

/// Offset of the first byte that is neither whitespace nor part of a
/// comment. `None` when the text is empty, blank, or ends inside a comment.
pub fn skip_ignorable(text: &str) -> Option<usize> {
    let mut pos = 0;
    loop {
        let rest = &text[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.starts_with("/*") {
            pos += trimmed[2..].find("*/")? + 4;
        } else if trimmed.starts_with("--") || trimmed.starts_with('#') {
            pos += trimmed.find('\n')? + 1;
        } else {
            return Some(pos);
        }
    }
}

/// A single lexical token of a routine body
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword, uppercased
    Word(String),
    /// Contents of a quoted literal or quoted identifier
    String(String),
    /// Any other single character
    Symbol(char),
}

impl Token {
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Word(w) if w == word)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Symbol(c) => write!(f, "{}", c),
        }
    }
}

/// A token with the byte offset just past it and the 1-based line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub end: usize,
    pub line: usize,
}

/// Word lexer for comment-free SQL text. Never fails: an unterminated
/// literal simply runs to end of input.
pub struct Lexer<'a> {
    text: &'a str,
    iter: Peekable<CharIndices<'a>>,
    line: usize,
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Lexeme;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan()
    }
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            iter: text.char_indices().peekable(),
            line: 1,
        }
    }

    /// Consumes the next character if it satisfies the predicate
    fn next_if<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        let (_, c) = self.iter.next_if(|&(_, c)| predicate(c))?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Consumes consecutive characters while they satisfy the predicate
    fn next_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<String> {
        let mut value = String::new();
        while let Some(c) = self.next_if(&predicate) {
            value.push(c);
        }
        Some(value).filter(|v| !v.is_empty())
    }

    fn erase_whitespace(&mut self) {
        self.next_while(|c| c.is_whitespace());
    }

    fn offset(&mut self) -> usize {
        self.iter.peek().map_or(self.text.len(), |&(i, _)| i)
    }

    fn scan(&mut self) -> Option<Lexeme> {
        self.erase_whitespace();
        let line = self.line;
        let next = self.iter.peek()?.1;
        let token = match next {
            q @ ('\'' | '"' | '`') => self.scan_string(q),
            c if c.is_alphanumeric() || c == '_' => self.scan_word(),
            _ => self.scan_symbol(),
        }?;
        let end = self.offset();
        Some(Lexeme { token, end, line })
    }

    /// Scans a quoted literal; doubled quotes and backslash escapes stay inside
    fn scan_string(&mut self, quote: char) -> Option<Token> {
        self.next_if(|c| c == quote)?;
        let mut val = String::new();
        while let Some(c) = self.next_if(|_| true) {
            if c == '\\' {
                if let Some(escaped) = self.next_if(|_| true) {
                    val.push(escaped);
                }
            } else if c == quote {
                match self.next_if(|c| c == quote) {
                    Some(_) => val.push(quote),
                    None => break,
                }
            } else {
                val.push(c);
            }
        }
        Some(Token::String(val))
    }

    fn scan_word(&mut self) -> Option<Token> {
        let word = self.next_while(|c| c.is_alphanumeric() || c == '_')?;
        Some(Token::Word(word.to_ascii_uppercase()))
    }

    fn scan_symbol(&mut self) -> Option<Token> {
        self.next_if(|_| true).map(Token::Symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::{find_phrase, match_phrase, skip_ignorable, Lexer, ScanCursor, ScanState, Token};

    #[test]
    fn test_cursor_quotes_and_comments() {
        let sql = "SELECT 'a;b', \"c\\\"d\" /* ; */ -- ;\n;";
        let mut cursor = ScanCursor::new(sql, 0);
        cursor.advance_to(sql.find(";b").unwrap());
        assert_eq!(cursor.state(), ScanState::Quoted(b'\''));

        let mut cursor = ScanCursor::new(sql, 0);
        cursor.advance_to(sql.find("/*").unwrap() + 3);
        assert_eq!(cursor.state(), ScanState::BlockComment);

        let mut cursor = ScanCursor::new(sql, 0);
        cursor.advance_to(sql.rfind(" ;").unwrap());
        assert_eq!(cursor.state(), ScanState::LineComment);

        let mut cursor = ScanCursor::new(sql, 0);
        cursor.advance_to(sql.len() - 1);
        assert!(cursor.in_code());
    }

    #[test]
    fn test_match_phrase() {
        assert_eq!(match_phrase("create   TABLE t", "CREATE TABLE"), Some(14));
        assert_eq!(match_phrase("create\n\ttable t", "CREATE TABLE"), Some(13));
        assert_eq!(match_phrase("DROP TABLE t", "DO"), None);
        assert_eq!(match_phrase("DO SLEEP(1)", "DO"), Some(2));
        assert_eq!(match_phrase("CREATETABLE", "CREATE TABLE"), None);
        assert_eq!(match_phrase("end;", "END"), Some(3));
    }

    #[test]
    fn test_find_phrase() {
        let text = "select backend; end if; end";
        assert_eq!(find_phrase(text, "END", 0), Some(16));
        assert_eq!(find_phrase(text, "END", 17), Some(24));
        assert_eq!(find_phrase(text, "END IF", 0), Some(16));
        assert_eq!(find_phrase(text, "LOOP", 0), None);
    }

    #[test]
    fn test_skip_ignorable() {
        assert_eq!(skip_ignorable("  /* x */ -- y\n # z\n SELECT 1"), Some(21));
        assert_eq!(skip_ignorable("SELECT"), Some(0));
        assert_eq!(skip_ignorable("  \n "), None);
        assert_eq!(skip_ignorable("/* never closed"), None);
        assert_eq!(skip_ignorable("/*/ SELECT"), None);
        assert_eq!(skip_ignorable("-- trailing"), None);
    }

    #[test]
    fn test_lexer_routine_tokens() {
        let tokens = Lexer::new("begin\n  set x = 'it''s END';\nend if")
            .map(|l| (l.token, l.line))
            .collect::<Vec<_>>();
        assert_eq!(
            tokens,
            vec![
                (Token::Word("BEGIN".into()), 1),
                (Token::Word("SET".into()), 2),
                (Token::Word("X".into()), 2),
                (Token::Symbol('='), 2),
                (Token::String("it's END".into()), 2),
                (Token::Symbol(';'), 2),
                (Token::Word("END".into()), 3),
                (Token::Word("IF".into()), 3),
            ]
        );
    }

    #[test]
    fn test_lexer_offsets() {
        let text = "BEGIN END;";
        let ends = Lexer::new(text).map(|l| l.end).collect::<Vec<_>>();
        assert_eq!(ends, vec![5, 9, 10]);
    }
}
