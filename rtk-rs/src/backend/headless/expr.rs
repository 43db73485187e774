//! The `expr` mini-language: tokenize, build a tree, evaluate.
//!
//! Operands are substituted lazily at evaluation time so `&&`, `||` and
//! `?:` short-circuit the way Tcl's do (`[info exists x] && $x > 0`).

use super::parser::matching_brace;
use super::{Flow, HeadlessInterp};
use crate::decode::{format_double, parse_bool, parse_double, parse_int};

/// Evaluate `text` and format the value as Tcl would.
pub(super) fn eval_expr(interp: &HeadlessInterp, text: &str) -> Result<String, Flow> {
    Ok(evaluate(interp, text)?.into_text())
}

/// Evaluate `text` as a condition (`if`, `while`, `for`).
pub(super) fn eval_cond(interp: &HeadlessInterp, text: &str) -> Result<bool, Flow> {
    evaluate(interp, text)?.truthy()
}

fn evaluate(interp: &HeadlessInterp, text: &str) -> Result<Value, Flow> {
    let toks = tokenize(text)?;
    let mut parser = Parser { toks, pos: 0, src: text };
    let tree = parser.ternary()?;
    if parser.pos != parser.toks.len() {
        return Err(parser.syntax());
    }
    eval(interp, &tree)
}

// ── Values ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Double(f64),
    Str(String),
}

impl Value {
    fn from_text(text: String) -> Self {
        if let Ok(n) = parse_int(&text) {
            Value::Int(n)
        } else if let Ok(x) = parse_double(&text) {
            Value::Double(x)
        } else {
            Value::Str(text)
        }
    }

    fn into_text(self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Double(x) => format_double(x),
            Value::Str(s) => s,
        }
    }

    fn truthy(&self) -> Result<bool, Flow> {
        match self {
            Value::Int(n) => Ok(*n != 0),
            Value::Double(x) => Ok(*x != 0.0),
            Value::Str(s) => parse_bool(s).map_err(Flow::from),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Value::Int(n) => *n as f64,
            Value::Double(x) => *x,
            Value::Str(_) => f64::NAN,
        }
    }

    fn numeric(self, op: &str) -> Result<Value, Flow> {
        match self {
            Value::Str(s) if s.is_empty() => {
                Err(Flow::Error(format!("can't use empty string as operand of \"{op}\"")))
            }
            Value::Str(s) => Err(Flow::Error(format!(
                "can't use non-numeric string \"{s}\" as operand of \"{op}\""
            ))),
            v => Ok(v),
        }
    }
}

fn boolean(b: bool) -> Value {
    Value::Int(i64::from(b))
}

// ── Tokens ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Node {
    /// Literal text, classified as a number or string when evaluated.
    Lit(String),
    /// `$var`, `[cmd]` or `"…"` source, substituted when evaluated.
    Subst(String),
    Unary(&'static str, Box<Node>),
    Binary(&'static str, Box<Node>, Box<Node>),
    Ternary(Box<Node>, Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
}

#[derive(Debug, Clone)]
enum Tok {
    Operand(Node),
    Op(&'static str),
    Func(String),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "~", "?", ":",
];

fn tokenize(text: &str) -> Result<Vec<Tok>, Flow> {
    let chars: Vec<char> = text.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '{' => {
                let end = matching_brace(&chars, i)?;
                toks.push(Tok::Operand(Node::Lit(chars[i + 1..end].iter().collect())));
                i = end + 1;
            }
            '"' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j] != '"' {
                    if chars[j] == '\\' {
                        j += 1;
                    }
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(Flow::error("missing \""));
                }
                toks.push(Tok::Operand(Node::Subst(chars[i + 1..j].iter().collect())));
                i = j + 1;
            }
            '$' => {
                let end = var_end(&chars, i)?;
                toks.push(Tok::Operand(Node::Subst(chars[i..end].iter().collect())));
                i = end;
            }
            '[' => {
                let end = bracket_end(&chars, i)?;
                toks.push(Tok::Operand(Node::Subst(chars[i..end].iter().collect())));
                i = end;
            }
            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                let hex = chars.get(i + 1).is_some_and(|x| *x == 'x' || *x == 'X');
                while i < chars.len() {
                    let d = chars[i];
                    let exp_sign = (d == '+' || d == '-')
                        && !hex
                        && matches!(chars[i - 1], 'e' | 'E');
                    if d.is_ascii_alphanumeric() || d == '.' || exp_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Operand(Node::Lit(chars[start..i].iter().collect())));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let next = chars[i..].iter().find(|c| !c.is_whitespace());
                match word.as_str() {
                    "eq" => toks.push(Tok::Op("eq")),
                    "ne" => toks.push(Tok::Op("ne")),
                    _ if next == Some(&'(') => toks.push(Tok::Func(word)),
                    _ if parse_bool(&word).is_ok() => toks.push(Tok::Operand(Node::Lit(word))),
                    _ => return Err(Flow::Error(format!("invalid bareword \"{word}\""))),
                }
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(*op))
                    .ok_or_else(|| Flow::Error(format!("syntax error in expression \"{text}\"")))?;
                toks.push(Tok::Op(*op));
                i += op.chars().count();
            }
        }
    }
    Ok(toks)
}

/// End (exclusive) of the variable reference at `chars[i] == '$'`.
fn var_end(chars: &[char], i: usize) -> Result<usize, Flow> {
    if chars.get(i + 1) == Some(&'{') {
        return chars[i + 2..]
            .iter()
            .position(|&c| c == '}')
            .map(|p| i + 3 + p)
            .ok_or_else(|| Flow::error("missing close-brace for variable name"));
    }
    let mut j = i + 1;
    while j < chars.len() {
        if chars[j].is_alphanumeric() || chars[j] == '_' {
            j += 1;
        } else if chars[j] == ':' && chars.get(j + 1) == Some(&':') {
            j += 2;
        } else {
            break;
        }
    }
    Ok(j)
}

/// End (exclusive) of the command substitution at `chars[i] == '['`.
fn bracket_end(chars: &[char], i: usize) -> Result<usize, Flow> {
    let mut depth = 0;
    let mut j = i;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 1,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(j + 1);
                }
            }
            _ => {}
        }
        j += 1;
    }
    Err(Flow::error("missing close-bracket"))
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Binary operators from lowest to highest precedence.
const LEVELS: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["==", "!=", "eq", "ne"],
    &["<", ">", "<=", ">="],
    &["+", "-"],
    &["*", "/", "%"],
];

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    src: &'a str,
}

impl Parser<'_> {
    fn syntax(&self) -> Flow {
        Flow::Error(format!("syntax error in expression \"{}\"", self.src))
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.toks.get(self.pos) {
            Some(Tok::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn ternary(&mut self) -> Result<Node, Flow> {
        let cond = self.level(0)?;
        if self.peek_op() != Some("?") {
            return Ok(cond);
        }
        self.pos += 1;
        let then = self.ternary()?;
        if self.peek_op() != Some(":") {
            return Err(self.syntax());
        }
        self.pos += 1;
        let otherwise = self.ternary()?;
        Ok(Node::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn level(&mut self, n: usize) -> Result<Node, Flow> {
        if n == LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.level(n + 1)?;
        while let Some(op) = self.peek_op().filter(|op| LEVELS[n].contains(op)) {
            self.pos += 1;
            let rhs = self.level(n + 1)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, Flow> {
        match self.peek_op() {
            Some(op @ ("-" | "+" | "!" | "~")) => {
                self.pos += 1;
                Ok(Node::Unary(op, Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node, Flow> {
        let tok = self.toks.get(self.pos).cloned().ok_or_else(|| self.syntax())?;
        self.pos += 1;
        match tok {
            Tok::Operand(node) => Ok(node),
            Tok::LParen => {
                let inner = self.ternary()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Tok::Func(name) => {
                if !matches!(self.toks.get(self.pos), Some(Tok::LParen)) {
                    return Err(self.syntax());
                }
                self.pos += 1;
                let mut args = Vec::new();
                if matches!(self.toks.get(self.pos), Some(Tok::RParen)) {
                    self.pos += 1;
                    return Ok(Node::Call(name, args));
                }
                loop {
                    args.push(self.ternary()?);
                    match self.toks.get(self.pos) {
                        Some(Tok::Comma) => self.pos += 1,
                        Some(Tok::RParen) => {
                            self.pos += 1;
                            return Ok(Node::Call(name, args));
                        }
                        _ => return Err(self.syntax()),
                    }
                }
            }
            _ => Err(self.syntax()),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), Flow> {
        match self.toks.get(self.pos) {
            Some(Tok::RParen) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.syntax()),
        }
    }
}

// ── Evaluation ────────────────────────────────────────────────────────────────

fn eval(interp: &HeadlessInterp, node: &Node) -> Result<Value, Flow> {
    match node {
        Node::Lit(text) => Ok(Value::from_text(text.clone())),
        Node::Subst(src) => Ok(Value::from_text(interp.subst_text(src)?)),
        Node::Unary(op, operand) => unary(op, eval(interp, operand)?),
        Node::Binary("&&", a, b) => {
            Ok(boolean(eval(interp, a)?.truthy()? && eval(interp, b)?.truthy()?))
        }
        Node::Binary("||", a, b) => {
            Ok(boolean(eval(interp, a)?.truthy()? || eval(interp, b)?.truthy()?))
        }
        Node::Binary(op, a, b) => binary(op, eval(interp, a)?, eval(interp, b)?),
        Node::Ternary(cond, then, otherwise) => {
            if eval(interp, cond)?.truthy()? {
                eval(interp, then)
            } else {
                eval(interp, otherwise)
            }
        }
        Node::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval(interp, a))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, values)
        }
    }
}

fn unary(op: &str, v: Value) -> Result<Value, Flow> {
    if op == "!" {
        return Ok(boolean(!v.truthy()?));
    }
    match (op, v.numeric(op)?) {
        ("-", Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        ("-", Value::Double(x)) => Ok(Value::Double(-x)),
        ("~", Value::Int(n)) => Ok(Value::Int(!n)),
        ("~", _) => Err(Flow::error("can't use floating-point value as operand of \"~\"")),
        (_, v) => Ok(v),
    }
}

fn binary(op: &str, a: Value, b: Value) -> Result<Value, Flow> {
    match op {
        "eq" => return Ok(boolean(a.into_text() == b.into_text())),
        "ne" => return Ok(boolean(a.into_text() != b.into_text())),
        "==" | "!=" | "<" | ">" | "<=" | ">=" => return Ok(boolean(compare(op, a, b))),
        _ => {}
    }
    match (a.numeric(op)?, b.numeric(op)?) {
        (Value::Int(x), Value::Int(y)) => match op {
            "+" => Ok(Value::Int(x.wrapping_add(y))),
            "-" => Ok(Value::Int(x.wrapping_sub(y))),
            "*" => Ok(Value::Int(x.wrapping_mul(y))),
            "/" | "%" if y == 0 => Err(Flow::error("divide by zero")),
            "/" => Ok(Value::Int(floor_div(x, y))),
            _ => Ok(Value::Int(floor_mod(x, y))),
        },
        (x, y) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            match op {
                "+" => Ok(Value::Double(x + y)),
                "-" => Ok(Value::Double(x - y)),
                "*" => Ok(Value::Double(x * y)),
                "/" if y == 0.0 => Err(Flow::error("divide by zero")),
                "/" => Ok(Value::Double(x / y)),
                _ => Err(Flow::error("can't use floating-point value as operand of \"%\"")),
            }
        }
    }
}

/// Numeric comparison when both sides are numbers, string order otherwise.
fn compare(op: &str, a: Value, b: Value) -> bool {
    use std::cmp::Ordering;
    let ord = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Str(_), _) | (_, Value::Str(_)) => a.into_text().cmp(&b.into_text()),
        _ => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Less),
    };
    match op {
        "==" => ord == Ordering::Equal,
        "!=" => ord != Ordering::Equal,
        "<" => ord == Ordering::Less,
        ">" => ord == Ordering::Greater,
        "<=" => ord != Ordering::Greater,
        _ => ord != Ordering::Less,
    }
}

fn floor_div(x: i64, y: i64) -> i64 {
    let q = x.wrapping_div(y);
    if x.wrapping_rem(y) != 0 && ((x < 0) != (y < 0)) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && ((r < 0) != (y < 0)) {
        r + y
    } else {
        r
    }
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, Flow> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(Flow::Error(format!(
                "too {} arguments for math function \"{name}\"",
                if args.len() < n { "few" } else { "many" }
            )))
        }
    };
    let first = |args: &[Value]| -> Result<Value, Flow> {
        args.first().cloned().ok_or_else(|| Flow::error("missing argument"))?.numeric(name)
    };
    match name {
        "abs" => {
            arity(1)?;
            Ok(match first(&args)? {
                Value::Int(n) => Value::Int(n.wrapping_abs()),
                v => Value::Double(v.as_f64().abs()),
            })
        }
        "int" => {
            arity(1)?;
            Ok(Value::Int(first(&args)?.as_f64().trunc() as i64))
        }
        "double" => {
            arity(1)?;
            Ok(Value::Double(first(&args)?.as_f64()))
        }
        "round" => {
            arity(1)?;
            Ok(match first(&args)? {
                Value::Int(n) => Value::Int(n),
                v => Value::Int(v.as_f64().round() as i64),
            })
        }
        "sqrt" => {
            arity(1)?;
            Ok(Value::Double(first(&args)?.as_f64().sqrt()))
        }
        "min" | "max" => {
            let mut best: Option<Value> = None;
            for v in args {
                let v = v.numeric(name)?;
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let keep_b = if name == "min" {
                            b.as_f64() <= v.as_f64()
                        } else {
                            b.as_f64() >= v.as_f64()
                        };
                        if keep_b {
                            b
                        } else {
                            v
                        }
                    }
                });
            }
            best.ok_or_else(|| {
                Flow::Error(format!("too few arguments for math function \"{name}\""))
            })
        }
        _ => Err(Flow::Error(format!("unknown math function \"{name}\""))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
