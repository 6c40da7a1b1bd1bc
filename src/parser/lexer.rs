//! Lexer for the cell layout language using logos

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Declaration keywords
    #[token("cell")]
    Cell,
    #[token("rect")]
    Rect,
    #[token("inst")]
    Inst,
    #[token("on")]
    On,
    #[token("of")]
    Of,
    #[token("at")]
    At,
    #[token("as")]
    As,

    // Action keywords
    #[token("solve")]
    Solve,
    #[token("freeze")]
    Freeze,
    #[token("unfreeze")]
    Unfreeze,
    #[token("copy")]
    Copy,

    // Constraint keywords
    #[token("constrain")]
    Constrain,
    #[token("right_of")]
    RightOf,
    #[token("left_of")]
    LeftOf,
    #[token("above")]
    Above,
    #[token("below")]
    Below,
    #[token("inside")]
    Inside,
    #[token("same_size")]
    SameSize,

    // Arithmetic
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,

    // Comparison operators (longer first)
    #[token(">=")]
    GreaterOrEqual,
    #[token("<=")]
    LessOrEqual,
    #[token("=")]
    Equals,

    // Delimiters
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_$?][a-zA-Z0-9_$?]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    String(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,
}

/// Lex input string into tokens with spans.
///
/// Every run of unrecognized input is reported, not just the first.
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, Vec<ParseError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for (tok, span) in Token::lexer(input).spanned() {
        match tok {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => errors.push(ParseError::Syntax {
                message: format!(
                    "Unrecognized input '{}'",
                    input.get(span.clone()).unwrap_or_default()
                ),
                span,
                expected: Vec::new(),
            }),
        }
    }
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_declaration_keywords() {
        assert_eq!(
            tokens("cell rect inst on of at as"),
            vec![
                Token::Cell,
                Token::Rect,
                Token::Inst,
                Token::On,
                Token::Of,
                Token::At,
                Token::As
            ]
        );
    }

    #[test]
    fn test_action_keywords() {
        assert_eq!(
            tokens("solve freeze unfreeze copy"),
            vec![Token::Solve, Token::Freeze, Token::Unfreeze, Token::Copy]
        );
    }

    #[test]
    fn test_relation_keywords() {
        assert_eq!(
            tokens("right_of left_of above below inside same_size"),
            vec![
                Token::RightOf,
                Token::LeftOf,
                Token::Above,
                Token::Below,
                Token::Inside,
                Token::SameSize
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        // Identifiers that merely start with a keyword stay identifiers
        assert_eq!(
            tokens("cells inverter onward"),
            vec![
                Token::Ident("cells".to_string()),
                Token::Ident("inverter".to_string()),
                Token::Ident("onward".to_string())
            ]
        );
    }

    #[test]
    fn test_slot_reference() {
        assert_eq!(
            tokens("a.x2 + 5 = b.x1"),
            vec![
                Token::Ident("a".to_string()),
                Token::Dot,
                Token::Ident("x2".to_string()),
                Token::Plus,
                Token::Number(5.0),
                Token::Equals,
                Token::Ident("b".to_string()),
                Token::Dot,
                Token::Ident("x1".to_string()),
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            tokens(">= <= ="),
            vec![Token::GreaterOrEqual, Token::LessOrEqual, Token::Equals]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 2.5 -10"),
            vec![
                Token::Number(42.0),
                Token::Number(2.5),
                Token::Minus,
                Token::Number(10.0)
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("rect // comment\ncell /* block */ inst"),
            vec![Token::Rect, Token::Cell, Token::Inst]
        );
    }

    #[test]
    fn test_layer_string() {
        assert_eq!(
            tokens(r#"on "metal 1""#),
            vec![Token::On, Token::String("metal 1".to_string())]
        );
    }

    #[test]
    fn test_unrecognized_input_is_reported() {
        let errors = lex("cell a { @ rect b on m1 # }").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].span(), &(9..10));
        match &errors[1] {
            ParseError::Syntax { message, .. } => assert_eq!(message, "Unrecognized input '#'"),
        }
    }
}
