//! Error types for parsing

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            ParseError::Syntax { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };

                let written = Report::build(ReportKind::Error, filename, span.start)
                    .with_message(message)
                    .with_label(
                        Label::new((filename, span.clone()))
                            .with_message(format!("{}{}", message, expected_str))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(source)), &mut buf);
                if written.is_err() {
                    return self.to_string();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::parser::lexer::Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, crate::parser::lexer::Token>) -> Self {
        use chumsky::error::RichReason;

        let found_token = err.found().cloned();

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => match found_token.as_ref() {
                // Keywords used where a name was expected get a dedicated hint
                Some(tok) if keyword_text(tok).is_some() && expects_identifier(&err) => {
                    format!(
                        "Cannot use '{}' as a name - it's a reserved keyword",
                        keyword_text(tok).unwrap_or_default()
                    )
                }
                _ => {
                    let found_str = match found {
                        Some(tok) => format_token(tok),
                        None => "end of input".to_string(),
                    };
                    format!("Unexpected {}", found_str)
                }
            },
            RichReason::Custom(msg) => msg.to_string(),
        };

        // Format expected tokens nicely
        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Whether the parser would have accepted a name at the error position
fn expects_identifier(err: &chumsky::error::Rich<'_, crate::parser::lexer::Token>) -> bool {
    err.expected().any(|e| {
        matches!(e, chumsky::error::RichPattern::SomethingElse)
            || matches!(e, chumsky::error::RichPattern::Label(l) if l.contains("identifier"))
    })
}

/// Source text of a reserved keyword, if the token is one
fn keyword_text(tok: &crate::parser::lexer::Token) -> Option<&'static str> {
    use crate::parser::lexer::Token;
    Some(match tok {
        Token::Cell => "cell",
        Token::Rect => "rect",
        Token::Inst => "inst",
        Token::On => "on",
        Token::Of => "of",
        Token::At => "at",
        Token::As => "as",
        Token::Solve => "solve",
        Token::Freeze => "freeze",
        Token::Unfreeze => "unfreeze",
        Token::Copy => "copy",
        Token::Constrain => "constrain",
        Token::RightOf => "right_of",
        Token::LeftOf => "left_of",
        Token::Above => "above",
        Token::Below => "below",
        Token::Inside => "inside",
        Token::SameSize => "same_size",
        _ => return None,
    })
}

/// Format a token for human-readable error messages
fn format_token(tok: &crate::parser::lexer::Token) -> String {
    use crate::parser::lexer::Token;
    if let Some(keyword) = keyword_text(tok) {
        return format!("keyword '{}'", keyword);
    }
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::GreaterOrEqual => "'>='".to_string(),
        Token::LessOrEqual => "'<='".to_string(),
        Token::Equals => "'='".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Dot => "'.'".to_string(),
        _ => format!("{:?}", tok),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_includes_message() {
        let errors = crate::parser::parse("cell c { rect }").unwrap_err();
        let rendered = errors[0].format("cell c { rect }", "test.cell");
        assert!(rendered.contains("test.cell"));
    }

    #[test]
    fn test_unexpected_token_message() {
        let errors = crate::parser::parse("cell { }").unwrap_err();
        let ParseError::Syntax { message, .. } = &errors[0];
        assert_eq!(message, "Unexpected '{'");
    }
}
