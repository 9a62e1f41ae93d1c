//! Rule DSL parser.
//!
//! Parsing runs in two passes. The lexer splits the text into words and
//! punctuation, and a small recursive descent pass builds a generic call
//! tree (`NAME(arg, ...)` or a bare word). Lowering then walks that tree and
//! turns it into a [`Rule`] or [`Operand`], checking names, arity and
//! numeric ranges. Every error carries the byte offset of the offending
//! token so callers can point at it with [`ParseError::display_with_context`].

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorType;
use crate::domain::regime::Regime;
use crate::domain::rule::{IndicatorField, IndicatorRef, Operand, Rule};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok<'a> {
    Word(&'a str),
    Open,
    Close,
    Comma,
    End,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: Tok<'a>,
    pos: usize,
}

impl Token<'_> {
    fn describe(&self) -> String {
        match self.kind {
            Tok::Word(w) => format!("'{w}'"),
            Tok::Open => "'('".into(),
            Tok::Close => "')'".into(),
            Tok::Comma => "','".into(),
            Tok::End => "end of input".into(),
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | ',')
}

/// Words run until whitespace or punctuation, so `BTC/USDT` and `-1.5`
/// each come out as a single token. Always ends with `Tok::End`.
fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        let kind = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => Tok::Open,
            ')' => Tok::Close,
            ',' => Tok::Comma,
            _ => {
                let mut end = input.len();
                while let Some(&(i, c)) = chars.peek() {
                    if is_delimiter(c) {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                tokens.push(Token {
                    kind: Tok::Word(&input[pos..end]),
                    pos,
                });
                continue;
            }
        };
        chars.next();
        tokens.push(Token { kind, pos });
    }

    tokens.push(Token {
        kind: Tok::End,
        pos: input.len(),
    });
    tokens
}

#[derive(Debug)]
struct Atom<'a> {
    text: &'a str,
    pos: usize,
}

#[derive(Debug)]
struct Call<'a> {
    name: &'a str,
    pos: usize,
    args: Vec<Node<'a>>,
}

#[derive(Debug)]
enum Node<'a> {
    Atom(Atom<'a>),
    Call(Call<'a>),
}

impl Node<'_> {
    fn pos(&self) -> usize {
        match self {
            Node::Atom(a) => a.pos,
            Node::Call(c) => c.pos,
        }
    }

    fn text(&self) -> &str {
        match self {
            Node::Atom(a) => a.text,
            Node::Call(c) => c.name,
        }
    }
}

fn error(message: impl Into<String>, position: usize) -> ParseError {
    ParseError {
        message: message.into(),
        position,
    }
}

struct TokenStream<'a> {
    tokens: Vec<Token<'a>>,
    next: usize,
}

impl<'a> TokenStream<'a> {
    fn peek(&self) -> Token<'a> {
        self.tokens[self.next.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token<'a> {
        let token = self.peek();
        if token.kind != Tok::End {
            self.next += 1;
        }
        token
    }

    /// `what` names the thing expected here, for the error message.
    fn node(&mut self, what: &str) -> Result<Node<'a>, ParseError> {
        let head = self.bump();
        let Tok::Word(name) = head.kind else {
            return Err(error(
                format!("expected {what}, found {}", head.describe()),
                head.pos,
            ));
        };
        if self.peek().kind != Tok::Open {
            return Ok(Node::Atom(Atom {
                text: name,
                pos: head.pos,
            }));
        }
        self.bump();

        let mut args = Vec::new();
        if self.peek().kind == Tok::Close {
            self.bump();
        } else {
            loop {
                args.push(self.node("argument")?);
                let sep = self.bump();
                match sep.kind {
                    Tok::Comma => {}
                    Tok::Close => break,
                    _ => {
                        return Err(error(
                            format!("expected ',' or ')', found {}", sep.describe()),
                            sep.pos,
                        ));
                    }
                }
            }
        }

        Ok(Node::Call(Call {
            name,
            pos: head.pos,
            args,
        }))
    }
}

fn parse_tree<'a>(input: &'a str, what: &str) -> Result<Node<'a>, ParseError> {
    let mut stream = TokenStream {
        tokens: tokenize(input),
        next: 0,
    };
    let node = stream.node(what)?;
    let rest = stream.peek();
    if rest.kind != Tok::End {
        return Err(error(
            format!("unexpected input after {what}: {}", rest.describe()),
            rest.pos,
        ));
    }
    Ok(node)
}

impl<'a> Call<'a> {
    fn exact<const N: usize>(&self) -> Result<&[Node<'a>; N], ParseError> {
        <&[Node<'a>; N]>::try_from(self.args.as_slice()).map_err(|_| {
            error(
                format!(
                    "{} expects {} argument{}, found {}",
                    self.name,
                    N,
                    if N == 1 { "" } else { "s" },
                    self.args.len()
                ),
                self.pos,
            )
        })
    }
}

fn atom<'n, 'a>(node: &'n Node<'a>, what: &str) -> Result<&'n Atom<'a>, ParseError> {
    match node {
        Node::Atom(a) => Ok(a),
        Node::Call(c) => Err(error(format!("expected {what}, found '{}'", c.name), c.pos)),
    }
}

fn finite(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn number(node: &Node, what: &str) -> Result<f64, ParseError> {
    let a = atom(node, what)?;
    finite(a.text).ok_or_else(|| error(format!("expected {what}, found '{}'", a.text), a.pos))
}

fn integer(node: &Node, what: &str) -> Result<usize, ParseError> {
    let a = atom(node, what)?;
    a.text
        .parse::<usize>()
        .map_err(|_| error(format!("expected {what}, found '{}'", a.text), a.pos))
}

fn period(node: &Node) -> Result<usize, ParseError> {
    match integer(node, "period")? {
        0 => Err(error("period must be at least 1", node.pos())),
        n => Ok(n),
    }
}

/// Stored ×100 so the indicator type stays hashable.
fn multiplier(node: &Node) -> Result<u32, ParseError> {
    let k = number(node, "standard deviation multiplier")?;
    if k <= 0.0 {
        return Err(error(
            "standard deviation multiplier must be positive",
            node.pos(),
        ));
    }
    Ok((k * 100.0).round() as u32)
}

/// Stored ×1000.
fn quantile(node: &Node) -> Result<u32, ParseError> {
    let q = number(node, "quantile")?;
    if !(0.0..=1.0).contains(&q) {
        return Err(error("quantile must be between 0 and 1", node.pos()));
    }
    Ok((q * 1000.0).round() as u32)
}

fn price_field(word: &str) -> Option<Operand> {
    Some(match word {
        "open" => Operand::Open,
        "high" => Operand::High,
        "low" => Operand::Low,
        "close" => Operand::Close,
        "volume" => Operand::Volume,
        _ => return None,
    })
}

fn lower_indicator(call: &Call) -> Result<IndicatorRef, ParseError> {
    let (indicator_type, field) = match call.name {
        "SMA" | "EMA" | "RSI" | "ATR" | "ADX" | "VOLUME_MEAN" => {
            let [n] = call.exact::<1>()?;
            let n = period(n)?;
            let t = match call.name {
                "SMA" => IndicatorType::Sma(n),
                "EMA" => IndicatorType::Ema(n),
                "RSI" => IndicatorType::Rsi(n),
                "ATR" => IndicatorType::Atr(n),
                "ADX" => IndicatorType::Adx(n),
                _ => IndicatorType::VolumeMean(n),
            };
            (t, IndicatorField::Value)
        }
        "BOLLINGER_UPPER" | "BOLLINGER_MIDDLE" | "BOLLINGER_LOWER" => {
            let [n, k] = call.exact::<2>()?;
            let t = IndicatorType::Bollinger {
                period: period(n)?,
                stddev_mult_x100: multiplier(k)?,
            };
            let field = match call.name {
                "BOLLINGER_UPPER" => IndicatorField::BollingerUpper,
                "BOLLINGER_MIDDLE" => IndicatorField::BollingerMiddle,
                _ => IndicatorField::BollingerLower,
            };
            (t, field)
        }
        "BB_WIDTH" => {
            let [n, k] = call.exact::<2>()?;
            let t = IndicatorType::BollingerWidth {
                period: period(n)?,
                stddev_mult_x100: multiplier(k)?,
            };
            (t, IndicatorField::Value)
        }
        "BB_WIDTH_MEAN" => {
            let [n, k, w] = call.exact::<3>()?;
            let t = IndicatorType::BollingerWidthMean {
                period: period(n)?,
                stddev_mult_x100: multiplier(k)?,
                window: period(w)?,
            };
            (t, IndicatorField::Value)
        }
        "BB_WIDTH_QUANTILE" => {
            let [n, k, w, q] = call.exact::<4>()?;
            let t = IndicatorType::BollingerWidthQuantile {
                period: period(n)?,
                stddev_mult_x100: multiplier(k)?,
                window: period(w)?,
                quantile_x1000: quantile(q)?,
            };
            (t, IndicatorField::Value)
        }
        other => {
            return Err(error(
                format!("expected indicator, found '{other}'"),
                call.pos,
            ));
        }
    };
    Ok(IndicatorRef {
        indicator_type,
        field,
    })
}

fn lower_operand(node: &Node) -> Result<Operand, ParseError> {
    match node {
        Node::Atom(a) => price_field(a.text)
            .or_else(|| finite(a.text).map(Operand::Constant))
            .ok_or_else(|| error(format!("expected operand, found '{}'", a.text), a.pos)),
        Node::Call(call) => match call.name {
            "PREV" => {
                let [inner] = call.exact::<1>()?;
                Ok(Operand::Prev(Box::new(lower_operand(inner)?)))
            }
            "MUL" => {
                let [inner, k] = call.exact::<2>()?;
                Ok(Operand::Scaled {
                    operand: Box::new(lower_operand(inner)?),
                    factor: number(k, "number")?,
                })
            }
            _ => lower_indicator(call).map(Operand::Indicator),
        },
    }
}

fn lower_rule(node: &Node) -> Result<Rule, ParseError> {
    let call = match node {
        Node::Call(call) => call,
        Node::Atom(a) => {
            return Err(error(format!("expected rule, found '{}'", a.text), a.pos));
        }
    };

    match call.name {
        "CROSS_ABOVE" | "CROSS_BELOW" | "ABOVE" | "BELOW" | "EQUALS" => {
            let [l, r] = call.exact::<2>()?;
            let left = lower_operand(l)?;
            let right = lower_operand(r)?;
            Ok(match call.name {
                "CROSS_ABOVE" => Rule::CrossAbove { left, right },
                "CROSS_BELOW" => Rule::CrossBelow { left, right },
                "ABOVE" => Rule::Above { left, right },
                "BELOW" => Rule::Below { left, right },
                _ => Rule::Equals { left, right },
            })
        }
        "BETWEEN" => {
            let [op, lo, hi] = call.exact::<3>()?;
            Ok(Rule::Between {
                operand: lower_operand(op)?,
                lower: number(lo, "number")?,
                upper: number(hi, "number")?,
            })
        }
        "AND" | "OR" => {
            if call.args.len() < 2 {
                return Err(error(
                    format!("{} requires at least 2 rules", call.name),
                    call.pos,
                ));
            }
            let rules = call
                .args
                .iter()
                .map(lower_rule)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if call.name == "AND" {
                Rule::And(rules)
            } else {
                Rule::Or(rules)
            })
        }
        "NOT" => {
            let [inner] = call.exact::<1>()?;
            Ok(Rule::Not(Box::new(lower_rule(inner)?)))
        }
        "CONSECUTIVE" | "ANY_OF" => {
            let [inner, n] = call.exact::<2>()?;
            let rule = Box::new(lower_rule(inner)?);
            let count = integer(n, "bar count")?;
            if count == 0 {
                return Err(error(
                    format!("{} requires a bar count of at least 1", call.name),
                    n.pos(),
                ));
            }
            Ok(if call.name == "CONSECUTIVE" {
                Rule::Consecutive { rule, count }
            } else {
                Rule::AnyOf { rule, count }
            })
        }
        "REGIME" => {
            let [label] = call.exact::<1>()?;
            match label.text() {
                "TREND" => Ok(Rule::Regime(Regime::Trend)),
                "RANGE" => Ok(Rule::Regime(Regime::Range)),
                other => Err(error(
                    format!("expected TREND or RANGE, found '{other}'"),
                    label.pos(),
                )),
            }
        }
        "PAIR" => {
            if call.args.is_empty() {
                return Err(error("PAIR requires an instrument symbol", call.pos));
            }
            let [symbol] = call.exact::<1>()?;
            let symbol = atom(symbol, "instrument symbol")?;
            Ok(Rule::Pair(symbol.text.to_string()))
        }
        other => Err(error(format!("expected rule, found '{other}'"), call.pos)),
    }
}

pub fn parse(input: &str) -> Result<Rule, ParseError> {
    lower_rule(&parse_tree(input, "rule")?)
}

/// Parse a standalone operand such as `ADX(14)` or `MUL(ATR(14), 2)`.
pub fn parse_operand(input: &str) -> Result<Operand, ParseError> {
    lower_operand(&parse_tree(input, "operand")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ind(indicator_type: IndicatorType) -> Operand {
        Operand::Indicator(IndicatorRef {
            indicator_type,
            field: IndicatorField::Value,
        })
    }

    fn band(field: IndicatorField, period: usize, stddev_mult_x100: u32) -> Operand {
        Operand::Indicator(IndicatorRef {
            indicator_type: IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            },
            field,
        })
    }

    fn above(left: Operand, right: Operand) -> Rule {
        Rule::Above { left, right }
    }

    #[test]
    fn lexer_keeps_symbols_and_signed_numbers_whole() {
        let kinds: Vec<Tok> = tokenize(" PAIR(1000SHIB/USDT),-2.5 ")
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                Tok::Word("PAIR"),
                Tok::Open,
                Tok::Word("1000SHIB/USDT"),
                Tok::Close,
                Tok::Comma,
                Tok::Word("-2.5"),
                Tok::End,
            ]
        );
        assert_eq!(tokenize("ab  (").last().map(|t| t.pos), Some(5));
    }

    #[test]
    fn accepted_rules() {
        let cases = vec![
            ("ABOVE(close, 100)", above(Operand::Close, Operand::Constant(100.0))),
            (
                "  BELOW ( SMA(20) ,EMA(50) ) ",
                Rule::Below {
                    left: ind(IndicatorType::Sma(20)),
                    right: ind(IndicatorType::Ema(50)),
                },
            ),
            (
                "CROSS_ABOVE(RSI(14), PREV(RSI(14)))",
                Rule::CrossAbove {
                    left: ind(IndicatorType::Rsi(14)),
                    right: Operand::Prev(Box::new(ind(IndicatorType::Rsi(14)))),
                },
            ),
            (
                "CROSS_BELOW(close, MUL(ATR(14), -1.5))",
                Rule::CrossBelow {
                    left: Operand::Close,
                    right: Operand::Scaled {
                        operand: Box::new(ind(IndicatorType::Atr(14))),
                        factor: -1.5,
                    },
                },
            ),
            (
                "EQUALS(volume, 0)",
                Rule::Equals {
                    left: Operand::Volume,
                    right: Operand::Constant(0.0),
                },
            ),
            (
                "BETWEEN(ADX(14), 10.5, 99.99)",
                Rule::Between {
                    operand: ind(IndicatorType::Adx(14)),
                    lower: 10.5,
                    upper: 99.99,
                },
            ),
            ("NOT(REGIME(RANGE))", Rule::Not(Box::new(Rule::Regime(Regime::Range)))),
            (
                "ANY_OF(PAIR(BTC/USDT), 5)",
                Rule::AnyOf {
                    rule: Box::new(Rule::Pair("BTC/USDT".into())),
                    count: 5,
                },
            ),
            (
                "CONSECUTIVE(ABOVE(open, low), 3)",
                Rule::Consecutive {
                    rule: Box::new(above(Operand::Open, Operand::Low)),
                    count: 3,
                },
            ),
            (
                "OR(REGIME( TREND ), BELOW(high, VOLUME_MEAN(30)), ABOVE(close, BOLLINGER_LOWER(20, 2)))",
                Rule::Or(vec![
                    Rule::Regime(Regime::Trend),
                    Rule::Below {
                        left: Operand::High,
                        right: ind(IndicatorType::VolumeMean(30)),
                    },
                    above(
                        Operand::Close,
                        band(IndicatorField::BollingerLower, 20, 200),
                    ),
                ]),
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(parse(input).unwrap(), expected, "input: {input}");
        }
    }

    #[test]
    fn bollinger_parameters_are_scaled() {
        assert_eq!(
            parse_operand("BOLLINGER_UPPER(20, 2.5)").unwrap(),
            band(IndicatorField::BollingerUpper, 20, 250)
        );
        assert_eq!(
            parse_operand("BOLLINGER_MIDDLE(10,1)").unwrap(),
            band(IndicatorField::BollingerMiddle, 10, 100)
        );
        assert_eq!(
            parse_operand("BB_WIDTH(23, 2.12)").unwrap(),
            ind(IndicatorType::BollingerWidth {
                period: 23,
                stddev_mult_x100: 212,
            })
        );
        assert_eq!(
            parse_operand("BB_WIDTH_MEAN(20, 2, 50)").unwrap(),
            ind(IndicatorType::BollingerWidthMean {
                period: 20,
                stddev_mult_x100: 200,
                window: 50,
            })
        );
        assert_eq!(
            parse_operand("BB_WIDTH_QUANTILE(23, 2.12, 20, 0.372)").unwrap(),
            ind(IndicatorType::BollingerWidthQuantile {
                period: 23,
                stddev_mult_x100: 212,
                window: 20,
                quantile_x1000: 372,
            })
        );
    }

    #[test]
    fn standalone_operands() {
        assert_eq!(parse_operand(" ADX(14) ").unwrap(), ind(IndicatorType::Adx(14)));
        assert_eq!(parse_operand("close").unwrap(), Operand::Close);
        assert_eq!(parse_operand("-3").unwrap(), Operand::Constant(-3.0));

        let err = parse_operand("ATR(14) extra").unwrap_err();
        assert_eq!(err.message, "unexpected input after operand: 'extra'");
        assert_eq!(err.position, 8);
    }

    #[test]
    fn rejected_rules() {
        let cases = [
            ("", "expected rule, found end of input", 0),
            ("   ", "expected rule, found end of input", 3),
            ("above(close, 100)", "expected rule, found 'above'", 0),
            ("close", "expected rule, found 'close'", 0),
            ("ABOVE((close), 1)", "expected argument, found '('", 6),
            ("ABOVE(close, )", "expected argument, found ')'", 13),
            ("ABOVE(close 1)", "expected ',' or ')', found '1'", 12),
            ("ABOVE(close, 100", "expected ',' or ')', found end of input", 16),
            ("ABOVE(close, 100) garbage", "unexpected input after rule: 'garbage'", 18),
            ("ABOVE(close)", "ABOVE expects 2 arguments, found 1", 0),
            ("NOT(ABOVE(close, 1), ABOVE(close, 2))", "NOT expects 1 argument, found 2", 0),
            ("AND(ABOVE(close, 100))", "AND requires at least 2 rules", 0),
            ("OR(ABOVE(close, 100))", "OR requires at least 2 rules", 0),
            ("ABOVE(SMA(0), 1)", "period must be at least 1", 10),
            ("ABOVE(SMA(2.5), 1)", "expected period, found '2.5'", 10),
            ("ABOVE(close, NaN)", "expected operand, found 'NaN'", 13),
            (
                "ABOVE(MACD_LINE(12, 26, 9), 0)",
                "expected indicator, found 'MACD_LINE'",
                6,
            ),
            (
                "ABOVE(BOLLINGER_UPPER(20, 0), 1)",
                "standard deviation multiplier must be positive",
                26,
            ),
            (
                "ABOVE(BB_WIDTH_QUANTILE(20, 2, 20, 1.5), 0)",
                "quantile must be between 0 and 1",
                35,
            ),
            (
                "CONSECUTIVE(ABOVE(close, 1), 0)",
                "CONSECUTIVE requires a bar count of at least 1",
                29,
            ),
            ("REGIME(SIDEWAYS)", "expected TREND or RANGE, found 'SIDEWAYS'", 7),
            ("PAIR()", "PAIR requires an instrument symbol", 0),
        ];

        for (input, message, position) in cases {
            let err = parse(input).unwrap_err();
            assert_eq!(err.message, message, "input: {input:?}");
            assert_eq!(err.position, position, "input: {input:?}");
        }
    }

    #[test]
    fn context_display_points_at_offending_token() {
        let input = "CROSS_ABOVE(SMA(20), , SMA(50))";
        let err = parse(input).unwrap_err();
        let ctx = err.display_with_context(input);
        let caret_line = ctx.lines().nth(1).unwrap();
        assert_eq!(caret_line, format!("{}^", " ".repeat(21)));
        assert!(ctx.contains("position 21"));
    }
}
