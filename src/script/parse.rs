//! pest grammar front-end: source text to [`Program`] / [`Expr`]

use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::{
    BinOp, CmpOp, Expr, FStringPart, Program, ScriptError, ScriptResult, Stmt, UnaryOp, Value,
};

#[derive(Parser)]
#[grammar = "script/script.pest"]
struct ScriptParser;

/// Deepest syntax tree a snippet may produce. Evaluation recurses once per level.
const MAX_EXPR_DEPTH: usize = 200;

/// Bracket nesting or `**` chain length accepted before handing text to pest
const MAX_NESTING: usize = 50;

impl From<pest::error::Error<Rule>> for ScriptError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        ScriptError::syntax(format!("invalid syntax at line {}, column {}", line, column))
    }
}

/// Parse a statement block (actions)
pub fn parse_program(source: &str) -> ScriptResult<Program> {
    check_nesting(source)?;
    let mut pairs = ScriptParser::parse(Rule::program, source)?;
    let program = next_pair(&mut pairs)?;

    let mut statements = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() != Rule::EOI {
            statements.push(build_statement(pair)?);
        }
    }

    Ok(Program { statements })
}

/// Parse a single expression (guards)
pub fn parse_condition(source: &str) -> ScriptResult<Expr> {
    check_nesting(source)?;
    let mut pairs = ScriptParser::parse(Rule::condition, source)?;
    let condition = next_pair(&mut pairs)?;
    build_expr(next_pair(&mut condition.into_inner())?, 0)
}

fn too_deep() -> ScriptError {
    ScriptError::syntax("expression is too deeply nested")
}

/// Reject bracket nesting and `**` chains that would recurse too deeply
/// inside the grammar. String literals and comments are skipped.
fn check_nesting(source: &str) -> ScriptResult<()> {
    let mut chars = source.chars().peekable();
    let mut depth = 0usize;
    let mut powers = 0usize;
    let mut quote = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            match c {
                '\\' => {
                    chars.next();
                }
                '\n' => quote = None,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => {
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            '(' | '[' | '{' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(too_deep());
                }
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '*' if chars.next_if_eq(&'*').is_some() => {
                powers += 1;
                if powers > MAX_NESTING {
                    return Err(too_deep());
                }
            }
            '\n' | ';' => powers = 0,
            _ => {}
        }
    }
    Ok(())
}

/// Depth of a child node, failing once the tree would exceed [`MAX_EXPR_DEPTH`]
fn deeper(depth: usize, levels: usize) -> ScriptResult<usize> {
    let depth = depth + levels;
    if depth > MAX_EXPR_DEPTH {
        Err(too_deep())
    } else {
        Ok(depth)
    }
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>) -> ScriptResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ScriptError::syntax("unexpected end of input"))
}

fn unexpected(pair: &Pair<Rule>) -> ScriptError {
    ScriptError::syntax(format!("unexpected '{}'", pair.as_str()))
}

fn build_statement(pair: Pair<Rule>) -> ScriptResult<Stmt> {
    match pair.as_rule() {
        Rule::pass_stmt => Ok(Stmt::Pass),
        Rule::assignment => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner)?.as_str().to_string();
            let value = build_expr(next_pair(&mut inner)?, 0)?;
            Ok(Stmt::Assign { name, value })
        }
        Rule::aug_assignment => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner)?.as_str().to_string();
            let op_pair = next_pair(&mut inner)?;
            let op = match op_pair.as_str() {
                "+=" => BinOp::Add,
                "-=" => BinOp::Sub,
                "*=" => BinOp::Mul,
                "/=" => BinOp::Div,
                "//=" => BinOp::FloorDiv,
                "%=" => BinOp::Mod,
                _ => return Err(unexpected(&op_pair)),
            };
            let value = build_expr(next_pair(&mut inner)?, 0)?;
            Ok(Stmt::AugAssign { name, op, value })
        }
        Rule::expr_stmt => Ok(Stmt::Expr(build_expr(next_pair(&mut pair.into_inner())?, 0)?)),
        _ => Err(unexpected(&pair)),
    }
}

/// Build the node for `pair`, which sits `depth` levels below the snippet root
fn build_expr(pair: Pair<Rule>, depth: usize) -> ScriptResult<Expr> {
    match pair.as_rule() {
        Rule::expr => build_expr(next_pair(&mut pair.into_inner())?, depth),
        Rule::or_expr => fold_binary(pair, depth, |_, lhs, rhs| {
            Ok(Expr::Or(Box::new(lhs), Box::new(rhs)))
        }),
        Rule::and_expr => fold_binary(pair, depth, |_, lhs, rhs| {
            Ok(Expr::And(Box::new(lhs), Box::new(rhs)))
        }),
        Rule::not_expr => {
            let inner: Vec<_> = pair.into_inner().collect();
            let negations = inner.iter().filter(|p| p.as_rule() == Rule::not_op).count();
            let operand_depth = deeper(depth, negations)?;
            let mut operand = None;
            for inner in inner {
                if inner.as_rule() != Rule::not_op {
                    operand = Some(build_expr(inner, operand_depth)?);
                }
            }
            let mut expr = operand.ok_or_else(|| ScriptError::syntax("expected an expression after 'not'"))?;
            for _ in 0..negations {
                expr = Expr::Unary(UnaryOp::Not, Box::new(expr));
            }
            Ok(expr)
        }
        Rule::comparison => {
            let mut inner = pair.into_inner();
            let first_pair = next_pair(&mut inner)?;
            if inner.peek().is_none() {
                return build_expr(first_pair, depth);
            }
            let child = deeper(depth, 1)?;
            let first = build_expr(first_pair, child)?;
            let mut rest = Vec::new();
            while let Some(op_pair) = inner.next() {
                let op = match op_pair.as_str() {
                    "==" => CmpOp::Eq,
                    "!=" => CmpOp::Ne,
                    "<" => CmpOp::Lt,
                    "<=" => CmpOp::Le,
                    ">" => CmpOp::Gt,
                    ">=" => CmpOp::Ge,
                    _ => return Err(unexpected(&op_pair)),
                };
                rest.push((op, build_expr(next_pair(&mut inner)?, child)?));
            }
            Ok(Expr::Compare(Box::new(first), rest))
        }
        Rule::sum | Rule::product => fold_binary(pair, depth, |op, lhs, rhs| {
            let op = match op {
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "//" => BinOp::FloorDiv,
                "%" => BinOp::Mod,
                other => return Err(ScriptError::syntax(format!("unknown operator '{}'", other))),
            };
            Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
        }),
        Rule::unary => {
            let inner: Vec<_> = pair.into_inner().collect();
            let sign_count = inner.iter().filter(|p| p.as_rule() == Rule::sign_op).count();
            let operand_depth = deeper(depth, sign_count)?;
            let mut signs = Vec::new();
            let mut operand = None;
            for inner in inner {
                match inner.as_rule() {
                    Rule::sign_op if inner.as_str() == "-" => signs.push(UnaryOp::Neg),
                    Rule::sign_op => signs.push(UnaryOp::Pos),
                    _ => operand = Some(build_expr(inner, operand_depth)?),
                }
            }
            let mut expr = operand.ok_or_else(|| ScriptError::syntax("expected an operand"))?;
            for op in signs.into_iter().rev() {
                expr = Expr::Unary(op, Box::new(expr));
            }
            Ok(expr)
        }
        Rule::power => {
            let mut inner = pair.into_inner();
            let base_pair = next_pair(&mut inner)?;
            match inner.next() {
                None => build_expr(base_pair, depth),
                Some(_pow_op) => {
                    let child = deeper(depth, 1)?;
                    let base = build_expr(base_pair, child)?;
                    let exponent = build_expr(next_pair(&mut inner)?, child)?;
                    Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)))
                }
            }
        }
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner)?.as_str().to_string();
            let args = build_arguments(inner.next(), depth)?;
            Ok(Expr::Call(name, args))
        }
        Rule::method_call => {
            let mut inner = pair.into_inner();
            let object = next_pair(&mut inner)?.as_str().to_string();
            let method = next_pair(&mut inner)?.as_str().to_string();
            let args = build_arguments(inner.next(), depth)?;
            Ok(Expr::MethodCall {
                object,
                method,
                args,
            })
        }
        Rule::identifier => Ok(Expr::Name(pair.as_str().to_string())),
        Rule::integer => pair
            .as_str()
            .parse::<i64>()
            .map(|i| Expr::Literal(Value::Int(i)))
            .map_err(|_| ScriptError::syntax(format!("integer literal too large: {}", pair.as_str()))),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(|f| Expr::Literal(Value::Float(f)))
            .map_err(|_| ScriptError::syntax(format!("invalid float literal: {}", pair.as_str()))),
        Rule::string => {
            let body = next_pair(&mut pair.into_inner())?;
            Ok(Expr::Literal(Value::Str(unescape(body.as_str()))))
        }
        Rule::fstring => {
            let body = next_pair(&mut pair.into_inner())?;
            Ok(Expr::FString(fstring_parts(&unescape(body.as_str()))?))
        }
        Rule::true_lit => Ok(Expr::Literal(Value::Bool(true))),
        Rule::false_lit => Ok(Expr::Literal(Value::Bool(false))),
        Rule::none_lit => Ok(Expr::Literal(Value::None)),
        _ => Err(unexpected(&pair)),
    }
}

/// Left-fold `operand (op operand)*`. A chain of n operators nests the
/// leftmost operand n levels deep, so the whole chain is sized up front.
fn fold_binary<F>(pair: Pair<Rule>, depth: usize, combine: F) -> ScriptResult<Expr>
where
    F: Fn(&str, Expr, Expr) -> ScriptResult<Expr>,
{
    let operators = pair.clone().into_inner().count() / 2;
    let mut inner = pair.into_inner();
    let mut acc_depth = deeper(depth, operators)?;
    let mut acc = build_expr(next_pair(&mut inner)?, acc_depth)?;
    while let Some(op) = inner.next() {
        let rhs = build_expr(next_pair(&mut inner)?, acc_depth)?;
        acc = combine(op.as_str(), acc, rhs)?;
        acc_depth = acc_depth.saturating_sub(1);
    }
    Ok(acc)
}

fn build_arguments(pair: Option<Pair<Rule>>, depth: usize) -> ScriptResult<Vec<Expr>> {
    let child = deeper(depth, 1)?;
    match pair {
        None => Ok(Vec::new()),
        Some(args) => args.into_inner().map(|arg| build_expr(arg, child)).collect(),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split an f-string body into text runs and `{name}` placeholders
fn fstring_parts(body: &str) -> ScriptResult<Vec<FStringPart>> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(ScriptError::syntax("f-string: expecting '}'")),
                    }
                }
                let name = name.trim();
                if !is_identifier(name) {
                    return Err(ScriptError::syntax(format!(
                        "f-string placeholder '{}' must be a variable name",
                        name
                    )));
                }
                if !text.is_empty() {
                    parts.push(FStringPart::Text(std::mem::take(&mut text)));
                }
                parts.push(FStringPart::Name(name.to_string()));
            }
            '}' => return Err(ScriptError::syntax("f-string: single '}' is not allowed")),
            _ => text.push(c),
        }
    }

    if !text.is_empty() {
        parts.push(FStringPart::Text(text));
    }
    Ok(parts)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
