//! Tree-walking evaluator with Python-like numeric semantics

use std::cmp::Ordering;

use super::{
    BinOp, CmpOp, Expr, FStringPart, Program, ScriptError, ScriptErrorKind, ScriptHost,
    ScriptResult, Stmt, UnaryOp, Value,
};

/// Longest string `*` repetition may produce
const MAX_REPEAT_LEN: usize = 1 << 20;

/// Name of the one object snippets may call methods on
const MACHINE_OBJECT: &str = "sm";

pub struct Interpreter<'h> {
    host: &'h mut dyn ScriptHost,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h mut dyn ScriptHost) -> Self {
        Self { host }
    }

    pub fn run(&mut self, program: &Program) -> ScriptResult<()> {
        for stmt in &program.statements {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> ScriptResult<()> {
        match stmt {
            Stmt::Pass => {}
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.host.set_variable(name, value);
            }
            Stmt::AugAssign { name, op, value } => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let updated = binary(*op, &current, &rhs)?;
                self.host.set_variable(name, updated);
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    pub fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup(name),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Text(text) => out.push_str(text),
                        FStringPart::Name(name) => out.push_str(&self.lookup(name)?.to_string()),
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, &value)
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, &lhs, &rhs)
            }
            Expr::Compare(first, rest) => {
                let mut lhs = self.eval(first)?;
                for (op, rhs_expr) in rest {
                    let rhs = self.eval(rhs_expr)?;
                    if !compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.is_truthy() {
                    self.eval(rhs)
                } else {
                    Ok(lhs)
                }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.is_truthy() {
                    Ok(lhs)
                } else {
                    self.eval(rhs)
                }
            }
            Expr::Call(name, args) => {
                let args = self.eval_args(args)?;
                self.call(name, args)
            }
            Expr::MethodCall {
                object,
                method,
                args,
            } => {
                let args = self.eval_args(args)?;
                self.call_method(object, method, args)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> ScriptResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    /// Variables shadow the built-in `current_tick`
    fn lookup(&self, name: &str) -> ScriptResult<Value> {
        if let Some(value) = self.host.variable(name) {
            return Ok(value);
        }
        match name {
            "current_tick" => Ok(Value::Int(i64::try_from(self.host.tick()).unwrap_or(i64::MAX))),
            MACHINE_OBJECT => Err(ScriptError::type_error(
                "'sm' can only be used to call its methods, e.g. sm.send('event')",
            )),
            _ => Err(ScriptError::name(name)),
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        match name {
            "print" => {
                let text: Vec<String> = args.iter().map(Value::to_string).collect();
                self.host.print(&text.join(" "));
                Ok(Value::None)
            }
            "abs" => {
                let [value] = exact_args::<1>(name, args)?;
                match value {
                    Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
                    Value::Bool(b) => Ok(Value::Int(b as i64)),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    other => Err(ScriptError::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                }
            }
            "min" | "max" => {
                if args.len() < 2 {
                    return Err(ScriptError::type_error(format!(
                        "{}() expects at least 2 arguments, got {}",
                        name,
                        args.len()
                    )));
                }
                let wanted = if name == "min" { CmpOp::Lt } else { CmpOp::Gt };
                let mut best = args[0].clone();
                for candidate in &args[1..] {
                    if compare(wanted, candidate, &best)? {
                        best = candidate.clone();
                    }
                }
                Ok(best)
            }
            "int" => {
                let [value] = exact_args::<1>(name, args)?;
                to_int(&value).map(Value::Int)
            }
            "float" => {
                let [value] = exact_args::<1>(name, args)?;
                to_float(&value).map(Value::Float)
            }
            "str" => {
                let [value] = exact_args::<1>(name, args)?;
                Ok(Value::Str(value.to_string()))
            }
            "bool" => {
                let [value] = exact_args::<1>(name, args)?;
                Ok(Value::Bool(value.is_truthy()))
            }
            "len" => {
                let [value] = exact_args::<1>(name, args)?;
                match value {
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    other => Err(ScriptError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    ))),
                }
            }
            "round" => match args.len() {
                1 => {
                    let [value] = exact_args::<1>(name, args)?;
                    match value {
                        Value::Int(_) | Value::Bool(_) => to_int(&value).map(Value::Int),
                        _ => {
                            let rounded = as_float(&value, "round")?.round_ties_even();
                            if rounded.is_finite() && rounded.abs() < 9.2e18 {
                                Ok(Value::Int(rounded as i64))
                            } else {
                                Err(overflow())
                            }
                        }
                    }
                }
                _ => {
                    let [value, digits] = exact_args::<2>(name, args)?;
                    let digits = match digits {
                        Value::Int(d) => i32::try_from(d).map_err(|_| overflow())?,
                        other => {
                            return Err(ScriptError::type_error(format!(
                                "'{}' object cannot be interpreted as an integer",
                                other.type_name()
                            )))
                        }
                    };
                    let value = as_float(&value, "round")?;
                    let scale = 10f64.powi(digits);
                    if scale == 0.0 {
                        return Ok(Value::Float(0.0f64.copysign(value)));
                    }
                    let scaled = value * scale;
                    if !scaled.is_finite() {
                        // more digits than an f64 holds
                        return Ok(Value::Float(value));
                    }
                    Ok(Value::Float(scaled.round_ties_even() / scale))
                }
            },
            _ => Err(ScriptError::name(name)),
        }
    }

    fn call_method(&mut self, object: &str, method: &str, args: Vec<Value>) -> ScriptResult<Value> {
        if object != MACHINE_OBJECT || self.host.variable(object).is_some() {
            let value = self.lookup(object)?;
            return Err(ScriptError::new(
                ScriptErrorKind::Attribute,
                format!("'{}' object has no attribute '{}'", value.type_name(), method),
            ));
        }

        match method {
            "send" => {
                let [event] = exact_args::<1>("send", args)?;
                match event {
                    Value::Str(event) => {
                        self.host.send(&event);
                        Ok(Value::None)
                    }
                    other => Err(ScriptError::type_error(format!(
                        "send() expects an event name string, got '{}'",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(ScriptError::new(
                ScriptErrorKind::Attribute,
                format!("'sm' object has no attribute '{}'", method),
            )),
        }
    }
}

fn exact_args<const N: usize>(name: &str, args: Vec<Value>) -> ScriptResult<[Value; N]> {
    let given = args.len();
    args.try_into().map_err(|_| {
        ScriptError::type_error(format!(
            "{}() takes {} argument{} but {} were given",
            name,
            N,
            if N == 1 { "" } else { "s" },
            given
        ))
    })
}

fn overflow() -> ScriptError {
    ScriptError::new(ScriptErrorKind::Overflow, "integer result out of range")
}

fn zero_division(message: &str) -> ScriptError {
    ScriptError::new(ScriptErrorKind::ZeroDivision, message)
}

// ============================================================================
// OPERATORS
// ============================================================================

/// Numeric view of a value: bools count as ints
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        Value::None | Value::Str(_) => None,
    }
}

fn as_float(value: &Value, context: &str) -> ScriptResult<f64> {
    match as_num(value) {
        Some(Num::Int(i)) => Ok(i as f64),
        Some(Num::Float(f)) => Ok(f),
        None => Err(ScriptError::type_error(format!(
            "{}() argument must be a number, not '{}'",
            context,
            value.type_name()
        ))),
    }
}

fn to_int(value: &Value) -> ScriptResult<i64> {
    match value {
        Value::Bool(b) => Ok(*b as i64),
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Ok(f.trunc() as i64),
        Value::Float(_) => Err(ScriptError::new(
            ScriptErrorKind::Overflow,
            "cannot convert float infinity or NaN to integer",
        )),
        Value::Str(s) => s.trim().parse::<i64>().map_err(|_| {
            ScriptError::new(
                ScriptErrorKind::Value,
                format!("invalid literal for int() with base 10: '{}'", s),
            )
        }),
        Value::None => Err(ScriptError::type_error(
            "int() argument must be a string or a number, not 'NoneType'",
        )),
    }
}

fn to_float(value: &Value) -> ScriptResult<f64> {
    match value {
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            ScriptError::new(
                ScriptErrorKind::Value,
                format!("could not convert string to float: '{}'", s),
            )
        }),
        other => as_float(other, "float"),
    }
}

fn unary(op: UnaryOp, value: &Value) -> ScriptResult<Value> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!value.is_truthy()));
    }
    match (op, as_num(value)) {
        (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        _ => Err(ScriptError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> ScriptResult<Value> {
    match (op, lhs, rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
        (BinOp::Mul, Value::Str(s), count) | (BinOp::Mul, count, Value::Str(s))
            if matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            return repeat(s, count);
        }
        _ => {}
    }

    let unsupported = || {
        ScriptError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))
    };
    let (a, b) = match (as_num(lhs), as_num(rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(unsupported()),
    };

    match (a, b) {
        (Num::Int(a), Num::Int(b)) => int_binary(op, a, b),
        (a, b) => {
            let a = match a {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            let b = match b {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            float_binary(op, a, b)
        }
    }
}

fn repeat(s: &str, count: &Value) -> ScriptResult<Value> {
    let count = to_int(count)?;
    if count <= 0 {
        return Ok(Value::Str(String::new()));
    }
    let count = usize::try_from(count).map_err(|_| overflow())?;
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::Str(s.repeat(count))),
        _ => Err(ScriptError::new(
            ScriptErrorKind::Value,
            "repeated string would be too long",
        )),
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> ScriptResult<Value> {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            a.checked_rem(b)
                .map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
    };
    result.map(Value::Int).ok_or_else(overflow)
}

fn float_binary(op: BinOp, a: f64, b: f64) -> ScriptResult<Value> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(result))
}

/// Equality never fails; ordering needs two numbers or two strings
fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> ScriptResult<bool> {
    match op {
        CmpOp::Eq => return Ok(values_equal(lhs, rhs)),
        CmpOp::Ne => return Ok(!values_equal(lhs, rhs)),
        _ => {}
    }

    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (as_num(lhs), as_num(rhs)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => {
                let a = match a {
                    Num::Int(i) => i as f64,
                    Num::Float(f) => f,
                };
                let b = match b {
                    Num::Int(i) => i as f64,
                    Num::Float(f) => f,
                };
                match a.partial_cmp(&b) {
                    Some(ordering) => Some(ordering),
                    // NaN compares false with everything
                    None => return Ok(false),
                }
            }
            _ => None,
        },
    };

    let Some(ordering) = ordering else {
        return Err(ScriptError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        )));
    };

    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    })
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => match (as_num(lhs), as_num(rhs)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(Num::Float(a)), Some(Num::Float(b))) => a == b,
            (Some(Num::Int(a)), Some(Num::Float(b))) | (Some(Num::Float(b)), Some(Num::Int(a))) => {
                a as f64 == b
            }
            _ => false,
        },
    }
}
