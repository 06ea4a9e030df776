//! Isolating stored routine definitions and CREATE TABLE statements from
//! free-form submissions.

use std::{fmt::Display, iter::Peekable};

use tracing::debug;

use crate::error::{Error, Result};

use super::{
    comment::remove_comments,
    lexer::{find_phrase, Lexeme, Lexer, Token},
    segment::{boundary_for, segment},
};

/// Kind of stored routine to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Procedure,
    Function,
    Trigger,
}

impl RoutineKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Trigger => "TRIGGER",
        }
    }
}

/// An open control block inside a routine body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlFrame {
    Case,
    If,
    Loop,
    While,
    Repeat,
    Begin,
}

impl ControlFrame {
    /// The frame closed by `END <word>`
    fn closed_by(word: &str) -> Option<Self> {
        Some(match word {
            "CASE" => Self::Case,
            "IF" => Self::If,
            "LOOP" => Self::Loop,
            "WHILE" => Self::While,
            "REPEAT" => Self::Repeat,
            _ => return None,
        })
    }

    /// The frame opened by `word`, given the token before it.
    ///
    /// `IF` and `REPEAT` double as functions (`IF(a, b, c)`, `REPEAT(s, n)`),
    /// so they only open a block where a statement can start.
    fn opened_by(word: &str, prev: Option<&Token>) -> Option<Self> {
        let frame = match word {
            "BEGIN" => Self::Begin,
            "CASE" => Self::Case,
            "LOOP" => Self::Loop,
            "WHILE" => Self::While,
            "IF" => Self::If,
            "REPEAT" => Self::Repeat,
            _ => return None,
        };
        if matches!(frame, Self::If | Self::Repeat) && !starts_statement(prev) {
            return None;
        }
        Some(frame)
    }
}

impl Display for ControlFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ControlFrame::Case => "CASE",
            ControlFrame::If => "IF",
            ControlFrame::Loop => "LOOP",
            ControlFrame::While => "WHILE",
            ControlFrame::Repeat => "REPEAT",
            ControlFrame::Begin => "BEGIN",
        })
    }
}

fn starts_statement(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(Token::Symbol(c)) => matches!(c, ';' | ':'),
        Some(Token::Word(w)) => matches!(w.as_str(), "THEN" | "ELSE" | "DO" | "BEGIN" | "LOOP" | "REPEAT"),
        Some(Token::String(_)) => false,
    }
}

/// Consumes the word after `END` when it names a control block
fn take_closer<'a>(lexemes: &mut Peekable<Lexer<'a>>) -> Option<(ControlFrame, Lexeme)> {
    let frame = match &lexemes.peek()?.token {
        Token::Word(word) => ControlFrame::closed_by(word)?,
        _ => return None,
    };
    lexemes.next().map(|lexeme| (frame, lexeme))
}

/// Extracts one routine definition from `sql`.
///
/// Comments are stripped, everything before `CREATE [OR REPLACE] <kind>` is
/// discarded, and the returned text runs through the `END` that closes the
/// routine's outermost `BEGIN`. Control keywords are balanced in the order
/// they appear, so a block may open and close on the same line. A bare
/// `END` also closes a `CASE` expression.
pub fn extract_routine(sql: &str, kind: RoutineKind) -> Result<String> {
    let stripped = remove_comments(sql);
    let create = [
        format!("CREATE {}", kind.keyword()),
        format!("CREATE OR REPLACE {}", kind.keyword()),
    ]
    .iter()
    .filter_map(|phrase| find_phrase(&stripped, phrase, 0))
    .min()
    .ok_or_else(|| {
        Error::MalformedRoutine(format!(
            "neither CREATE {0} nor CREATE OR REPLACE {0} found",
            kind.keyword()
        ))
    })?;

    let text = &stripped[create..];
    let mut lexemes = Lexer::new(text).peekable();
    let mut stack: Vec<ControlFrame> = Vec::new();
    let mut started = false;
    let mut prev: Option<Token> = None;

    while let Some(lexeme) = lexemes.next() {
        let Token::Word(word) = &lexeme.token else {
            prev = Some(lexeme.token);
            continue;
        };

        // The header (name, parameters, RETURNS clause) is copied as is.
        if !started {
            if word == "BEGIN" {
                stack.push(ControlFrame::Begin);
                started = true;
            }
            prev = Some(lexeme.token);
            continue;
        }

        if word == "END" {
            let closer = take_closer(&mut lexemes);
            let closing = closer.as_ref().map_or(ControlFrame::Begin, |(frame, _)| *frame);
            let end = closer.as_ref().map_or(lexeme.end, |(_, l)| l.end);

            match stack.pop() {
                Some(top) if top == closing => {}
                Some(ControlFrame::Case) if closer.is_none() => {}
                Some(top) => {
                    let label = match &closer {
                        Some((frame, _)) => format!("END {}", frame),
                        None => "END".to_string(),
                    };
                    return Err(Error::MalformedRoutine(format!(
                        "line {}: {} does not close the open {}",
                        lexeme.line, label, top
                    )));
                }
                None => unreachable!("scan stops as soon as the stack empties"),
            }

            if stack.is_empty() {
                debug!(kind = kind.keyword(), line = lexeme.line, "routine body closed");
                return Ok(text[..end].to_string());
            }
            prev = Some(closer.map_or(lexeme.token, |(_, l)| l.token));
            continue;
        }

        if let Some(frame) = ControlFrame::opened_by(word, prev.as_ref()) {
            stack.push(frame);
        }
        prev = Some(lexeme.token);
    }

    if !started {
        return Err(Error::MalformedRoutine(format!(
            "CREATE {} has no BEGIN",
            kind.keyword()
        )));
    }
    Err(Error::MalformedRoutine(format!(
        "input ended with unclosed blocks: {}",
        stack.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
    )))
}

/// Keeps only the CREATE TABLE statements of a submission, each terminated
/// by `;`.
pub fn extract_create_tables(sql: &str) -> Vec<String> {
    let stripped = remove_comments(sql);
    segment(&stripped)
        .into_iter()
        .filter(|statement| {
            boundary_for(statement).is_some_and(|rule| {
                matches!(rule.keyword, "CREATE TABLE" | "CREATE TEMPORARY TABLE")
            })
        })
        .map(|statement| format!("{};", statement))
        .collect()
}
