//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::Token;

/// Helper enum for a single parsed term of a linear expression
#[derive(Debug, Clone)]
enum TermKind {
    Constant(f64),
    Slot(f64, SlotPath),
}

/// Value inside a `[key: value]` modifier block
#[derive(Debug, Clone)]
enum ModifierValue {
    Number(f64),
    Word(String),
}

type Modifiers = Vec<(String, ModifierValue)>;

/// Parse a layout script into an AST
pub fn parse(input: &str) -> Result<Document, Vec<crate::ParseError>> {
    let len = input.len();

    // Lex up front so unrecognized characters surface as errors of their own
    let tokens = crate::parser::lexer::lex(input)?;
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    document_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Parse a single constraint expression such as `a.x2 + 5 = b.x1`
pub fn parse_constraint(input: &str) -> Result<Constraint, Vec<crate::ParseError>> {
    let len = input.len();
    let tokens = crate::parser::lexer::lex(input)?;
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));
    let token_stream =
        Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    constraint_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// Reject modifier keys that the construct does not understand
fn check_modifier_keys<'a>(
    mods: &Modifiers,
    allowed: &[&str],
    span: SimpleSpan,
) -> Result<(), Rich<'a, Token>> {
    for (key, _) in mods {
        if !allowed.contains(&key.as_str()) {
            return Err(Rich::custom(
                span,
                format!(
                    "unknown modifier '{}'. Expected one of: {}",
                    key,
                    allowed.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

fn number_modifier<'a>(
    mods: &Modifiers,
    key: &str,
    span: SimpleSpan,
) -> Result<Option<f64>, Rich<'a, Token>> {
    match mods.iter().find(|(k, _)| k == key) {
        Some((_, ModifierValue::Number(n))) => Ok(Some(*n)),
        Some((_, ModifierValue::Word(w))) => Err(Rich::custom(
            span,
            format!("modifier '{}' expects a number, found '{}'", key, w),
        )),
        None => Ok(None),
    }
}

fn word_modifier<'a>(
    mods: &Modifiers,
    key: &str,
    span: SimpleSpan,
) -> Result<Option<String>, Rich<'a, Token>> {
    match mods.iter().find(|(k, _)| k == key) {
        Some((_, ModifierValue::Word(w))) => Ok(Some(w.clone())),
        Some((_, ModifierValue::Number(n))) => Err(Rich::custom(
            span,
            format!("modifier '{}' expects a keyword, found {}", key, n),
        )),
        None => Ok(None),
    }
}

fn modifier_block_parser<'a, I>(
) -> impl Parser<'a, I, Modifiers, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! { Token::Ident(s) => s };
    let number = select! { Token::Number(n) => n };

    let value = choice((
        just(Token::Minus)
            .or_not()
            .then(number)
            .map(|(neg, n)| ModifierValue::Number(if neg.is_some() { -n } else { n })),
        identifier.map(ModifierValue::Word),
    ));

    identifier
        .then_ignore(just(Token::Colon))
        .then(value)
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
}

fn constraint_parser<'a, I>() -> impl Parser<'a, I, Constraint, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! { Token::Ident(s) => s };
    let number = select! { Token::Number(n) => n };
    let modifiers = modifier_block_parser();

    // Element path: identifier { "." identifier }
    let element_path = identifier
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<String>>()
        .map(|segments| ElementPath { segments });

    // Slot path: element path followed by a property as the last segment
    let slot_path = identifier
        .separated_by(just(Token::Dot))
        .at_least(2)
        .collect::<Vec<String>>()
        .try_map(|segments, span: SimpleSpan| {
            let Some((last, path)) = segments.split_last() else {
                return Err(Rich::custom(span, "expected a slot reference"));
            };
            match Property::from_str(last) {
                Some(property) => Ok(SlotPath {
                    element: ElementPath {
                        segments: path.to_vec(),
                    },
                    property,
                }),
                None => Err(Rich::custom(
                    span,
                    format!(
                        "'{}' is not a valid property. Expected one of: x1, y1, x2, y2, width, height, cx, cy",
                        last
                    ),
                )),
            }
        });

    // Term: `3`, `3 * a.x1`, `a.x1`, `a.x1 * 3`
    let term = choice((
        number
            .then(just(Token::Star).ignore_then(slot_path.clone()).or_not())
            .map(|(n, slot)| match slot {
                Some(slot) => TermKind::Slot(n, slot),
                None => TermKind::Constant(n),
            }),
        slot_path
            .clone()
            .then(just(Token::Star).ignore_then(number).or_not())
            .map(|(slot, n)| TermKind::Slot(n.unwrap_or(1.0), slot)),
    ));

    let sign = choice((just(Token::Plus).to(1.0), just(Token::Minus).to(-1.0)));

    let expr = just(Token::Minus)
        .or_not()
        .then(term.clone())
        .then(sign.then(term).repeated().collect::<Vec<_>>())
        .map(|((neg, first), rest)| {
            let mut expr = LinearExpr::default();
            let first_sign = if neg.is_some() { -1.0 } else { 1.0 };
            for (sign, term) in std::iter::once((first_sign, first)).chain(rest) {
                match term {
                    TermKind::Constant(n) => expr.constant += sign * n,
                    TermKind::Slot(c, slot) => {
                        expr.terms.push(Term {
                            coefficient: sign * c,
                            slot,
                        });
                    }
                }
            }
            expr
        });

    let relation = choice((
        just(Token::Equals).to(Relation::Eq),
        just(Token::LessOrEqual).to(Relation::Le),
        just(Token::GreaterOrEqual).to(Relation::Ge),
    ));

    let linear = expr
        .clone()
        .then(relation)
        .then(expr)
        .map(|((lhs, relation), rhs)| Constraint::Linear { lhs, relation, rhs });

    let side_keyword = choice((
        just(Token::RightOf).to(Side::Right),
        just(Token::LeftOf).to(Side::Left),
        just(Token::Above).to(Side::Top),
        just(Token::Below).to(Side::Bottom),
    ));

    // b right_of a [gap: 3]
    let beside = element_path
        .clone()
        .then(side_keyword)
        .then(element_path.clone())
        .then(modifiers.clone().or_not())
        .try_map(|(((subject, side), anchor), mods), span: SimpleSpan| {
            let mods = mods.unwrap_or_default();
            check_modifier_keys(&mods, &["gap"], span)?;
            let gap = number_modifier(&mods, "gap", span)?.unwrap_or(0.0);
            Ok(Constraint::Beside {
                subject,
                anchor,
                side,
                gap,
            })
        });

    // a inside self [margin: 1]
    let inside = element_path
        .clone()
        .then_ignore(just(Token::Inside))
        .then(element_path.clone())
        .then(modifiers.clone().or_not())
        .try_map(|((inner, outer), mods), span: SimpleSpan| {
            let mods = mods.unwrap_or_default();
            check_modifier_keys(&mods, &["margin"], span)?;
            let margin = number_modifier(&mods, "margin", span)?.unwrap_or(0.0);
            Ok(Constraint::Inside {
                inner,
                outer,
                margin,
            })
        });

    // a same_size b
    let same_size = element_path
        .clone()
        .then_ignore(just(Token::SameSize))
        .then(element_path.clone())
        .map(|(a, b)| Constraint::SameSize { a, b });

    // c = a - b [side: right]
    let subtract = element_path
        .clone()
        .then_ignore(just(Token::Equals))
        .then(element_path.clone())
        .then_ignore(just(Token::Minus))
        .then(element_path)
        .then(modifiers.or_not())
        .try_map(|(((target, minuend), subtrahend), mods), span: SimpleSpan| {
            let mods = mods.unwrap_or_default();
            check_modifier_keys(&mods, &["side"], span)?;
            let side = match word_modifier(&mods, "side", span)? {
                Some(word) => Side::from_str(&word).ok_or_else(|| {
                    Rich::custom(
                        span,
                        format!(
                            "'{}' is not a side. Expected one of: left, right, top, bottom",
                            word
                        ),
                    )
                })?,
                None => Side::Left,
            };
            Ok(Constraint::Subtract {
                target,
                minuend,
                subtrahend,
                side,
            })
        });

    // Order matters: keyword relations first, then linear, then the bare-path subtract form
    choice((beside, inside, same_size, linear, subtract))
}

fn document_parser<'a, I>() -> impl Parser<'a, I, Document, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    let number = select! { Token::Number(n) => n };
    let signed_number = just(Token::Minus)
        .or_not()
        .then(number)
        .map(|(neg, n)| if neg.is_some() { -n } else { n });

    // Layer tags are opaque: either a bare identifier or a quoted string
    let layer = select! {
        Token::Ident(s) => s,
        Token::String(s) => s,
    }
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    // rect a on m1 [x1: 0, y1: 0]
    let rect_decl = just(Token::Rect)
        .ignore_then(identifier.clone())
        .then_ignore(just(Token::On))
        .then(layer)
        .then(modifier_block_parser().or_not())
        .try_map(|((name, layer), mods), span: SimpleSpan| {
            let mut coords = Vec::new();
            for (key, value) in mods.unwrap_or_default() {
                let coord = Coord::from_str(&key).ok_or_else(|| {
                    Rich::custom(
                        span,
                        format!(
                            "'{}' is not a coordinate. Expected one of: x1, y1, x2, y2",
                            key
                        ),
                    )
                })?;
                match value {
                    ModifierValue::Number(n) => coords.push((coord, n)),
                    ModifierValue::Word(w) => {
                        return Err(Rich::custom(
                            span,
                            format!("coordinate '{}' expects a number, found '{}'", key, w),
                        ))
                    }
                }
            }
            Ok(RectDecl {
                name,
                layer,
                coords,
            })
        });

    // inst u1 of inv at 10, 0
    let inst_decl = just(Token::Inst)
        .ignore_then(identifier.clone())
        .then_ignore(just(Token::Of))
        .then(identifier.clone())
        .then(
            just(Token::At)
                .ignore_then(signed_number.clone())
                .then_ignore(just(Token::Comma))
                .then(signed_number)
                .or_not(),
        )
        .map(|((name, template), at)| InstDecl { name, template, at });

    let constrain_decl = just(Token::Constrain).ignore_then(constraint_parser());

    let cell_item = choice((
        rect_decl.map(CellItem::Rect),
        inst_decl.map(CellItem::Inst),
        constrain_decl.map(CellItem::Constrain),
    ))
    .map_with(|item, e| Spanned::new(item, span_range(&e.span())));

    let cell_decl = just(Token::Cell)
        .ignore_then(identifier.clone())
        .then(
            cell_item
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BraceOpen), just(Token::BraceClose)),
        )
        .map(|(name, items)| CellDecl { name, items });

    let statement = choice((
        cell_decl.map(Statement::Cell),
        just(Token::Solve)
            .ignore_then(identifier.clone())
            .map(Statement::Solve),
        just(Token::Freeze)
            .ignore_then(identifier.clone())
            .map(Statement::Freeze),
        just(Token::Unfreeze)
            .ignore_then(identifier.clone())
            .map(Statement::Unfreeze),
        just(Token::Copy)
            .ignore_then(identifier.clone())
            .then_ignore(just(Token::As))
            .then(identifier)
            .map(|(source, target)| Statement::Copy { source, target }),
    ))
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    // Document is a list of statements
    statement
        .repeated()
        .collect()
        .then_ignore(end())
        .map(|statements| Document { statements })
}
