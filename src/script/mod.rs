//! Action Language Module
//! A small, closed interpreter for entry/during/exit actions and transition guards.
//!
//! Snippets use a Python-flavoured expression syntax (assignments, arithmetic,
//! comparisons, `and`/`or`/`not`, f-strings, a handful of builtins and
//! `sm.send("event")`). The language has no loops, imports, attribute access
//! or definitions. Code is vetted by [`crate::safety`] before it gets here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod eval;
mod parse;


pub use eval::Interpreter;
pub use parse::{parse_condition, parse_program};

/// Variable store shared by every snippet of a simulation run
pub type Variables = BTreeMap<String, Value>;

// ============================================================================
// VALUES
// ============================================================================

/// A runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Python-style truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
        }
    }

    /// Representation used in logs: strings are quoted, everything else
    /// prints as with `Display`.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    /// Convert a JSON scalar. Arrays and objects have no counterpart.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => Some(Value::None),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        let text = if x > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Category of a runtime or syntax failure, named after the Python exception
/// a user of the action language would expect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    Syntax,
    Name,
    Type,
    ZeroDivision,
    Value,
    Overflow,
    Attribute,
}

impl ScriptErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptErrorKind::Syntax => "SyntaxError",
            ScriptErrorKind::Name => "NameError",
            ScriptErrorKind::Type => "TypeError",
            ScriptErrorKind::ZeroDivision => "ZeroDivisionError",
            ScriptErrorKind::Value => "ValueError",
            ScriptErrorKind::Overflow => "OverflowError",
            ScriptErrorKind::Attribute => "AttributeError",
        }
    }
}

impl fmt::Display for ScriptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Syntax, message)
    }

    pub(crate) fn name(name: &str) -> Self {
        Self::new(ScriptErrorKind::Name, format!("name '{}' is not defined", name))
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Type, message)
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;

// ============================================================================
// HOST
// ============================================================================

/// What a running snippet can see and touch.
///
/// The simulator implements this over its variable store, internal event queue
/// and log buffer.
pub trait ScriptHost {
    /// Read a variable
    fn variable(&self, name: &str) -> Option<Value>;
    /// Create or overwrite a variable
    fn set_variable(&mut self, name: &str, value: Value);
    /// Current simulation tick, readable as `current_tick`
    fn tick(&self) -> u64;
    /// `sm.send(event)`: queue an internal event
    fn send(&mut self, event: &str);
    /// `print(...)`: already formatted output
    fn print(&mut self, text: &str);
}

// ============================================================================
// SYNTAX TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Pass,
    Assign { name: String, value: Expr },
    AugAssign { name: String, op: BinOp, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    FString(Vec<FStringPart>),
    Name(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` compares pairwise and short-circuits like Python
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    MethodCall {
        object: String,
        method: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Parse and run a statement block against `host`
pub fn execute(code: &str, host: &mut dyn ScriptHost) -> ScriptResult<()> {
    let program = parse_program(code)?;
    Interpreter::new(host).run(&program)
}

/// Parse and evaluate a single guard expression against `host`
pub fn evaluate(code: &str, host: &mut dyn ScriptHost) -> ScriptResult<Value> {
    let expr = parse_condition(code)?;
    Interpreter::new(host).eval(&expr)
}
