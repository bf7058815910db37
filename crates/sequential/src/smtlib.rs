//! SMT-LIB2 solver backend.
//!
//! Every check writes the session as an SMT-LIB2 script to an external
//! solver process (`z3 -in -smt2` by default) and reads back `check-sat`
//! and `get-value` answers. Real values come back as exact rationals when
//! they fit `i64`.

use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

use seqarrange_core::session::{AssertionStack, CheckResult, ModelValue};
use seqarrange_core::{
    Error, Formula, LinExpr, Rational, Relation, Result, SolverBackend, SolverSession, Sort, VarId,
};
use thiserror::Error;

/// Malformed solver output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmtParseError {
    /// Parentheses do not balance.
    #[error("unbalanced parentheses in solver output")]
    Unbalanced,
    /// A token that cannot start a value.
    #[error("unexpected token `{0}`")]
    Unexpected(String),
    /// A value that is not a numeral or boolean.
    #[error("malformed value `{0}`")]
    Malformed(String),
    /// The solver reported an error.
    #[error("solver error: {0}")]
    Solver(String),
}

impl From<SmtParseError> for Error {
    fn from(e: SmtParseError) -> Self {
        Error::Backend(e.to_string())
    }
}

/// Backend launching an SMT-LIB2 solver process per check.
#[derive(Debug, Clone)]
pub struct SmtLibBackend {
    program: String,
    args: Vec<String>,
}

impl Default for SmtLibBackend {
    fn default() -> Self {
        Self {
            program: "z3".into(),
            args: vec!["-in".into(), "-smt2".into()],
        }
    }
}

impl SmtLibBackend {
    /// z3 reading scripts from standard input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Any solver reading SMT-LIB2 from standard input.
    pub fn with_command(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the solver binary can be launched.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl SolverBackend for SmtLibBackend {
    type Session = SmtLibSession;

    fn name(&self) -> &'static str {
        "smtlib"
    }

    fn open_session(&self, timeout_ms: u64) -> Result<SmtLibSession> {
        Ok(SmtLibSession {
            stack: AssertionStack::new(),
            program: self.program.clone(),
            args: self.args.clone(),
            timeout_ms,
            model: HashMap::new(),
        })
    }
}

/// Session replaying its assertion stack into a solver process.
#[derive(Debug)]
pub struct SmtLibSession {
    stack: AssertionStack,
    program: String,
    args: Vec<String>,
    timeout_ms: u64,
    model: HashMap<VarId, ModelValue>,
}

impl SmtLibSession {
    /// Full script for a check under `assumptions`.
    pub fn script(&self, assumptions: &[Formula]) -> String {
        let decls = self.stack.declarations();
        let mut out = String::new();
        out.push_str("(set-option :produce-models true)\n");
        out.push_str(&format!("(set-option :timeout {})\n", self.timeout_ms));
        for decl in decls {
            let sort = match decl.sort {
                Sort::Real => "Real",
                Sort::Bool => "Bool",
            };
            out.push_str(&format!("(declare-const {} {})\n", decl.name, sort));
            if let Some(lower) = decl.lower {
                out.push_str(&format!("(assert (<= {} {}))\n", rational_term(lower), decl.name));
            }
            if let Some(upper) = decl.upper {
                out.push_str(&format!("(assert (<= {} {}))\n", decl.name, rational_term(upper)));
            }
        }
        for formula in self.stack.assertions().iter().chain(assumptions) {
            out.push_str(&format!("(assert {})\n", self.formula_term(formula)));
        }
        out.push_str("(check-sat)\n");
        if !decls.is_empty() {
            let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
            out.push_str(&format!("(get-value ({}))\n", names.join(" ")));
        }
        out
    }

    fn name_of(&self, var: VarId) -> &str {
        self.stack
            .declaration(var)
            .map(|d| d.name.as_str())
            .unwrap_or("undeclared")
    }

    fn expr_term(&self, expr: &LinExpr) -> String {
        let mut parts: Vec<String> = expr
            .terms()
            .iter()
            .filter(|(_, c)| !c.is_zero())
            .map(|(v, c)| {
                if *c == Rational::ONE {
                    self.name_of(*v).to_string()
                } else {
                    format!("(* {} {})", rational_term(*c), self.name_of(*v))
                }
            })
            .collect();
        let constant = expr.constant_part();
        if !constant.is_zero() || parts.is_empty() {
            parts.push(rational_term(constant));
        }
        if parts.len() == 1 {
            parts.pop().unwrap_or_default()
        } else {
            format!("(+ {})", parts.join(" "))
        }
    }

    /// SMT-LIB2 term of a formula.
    pub fn formula_term(&self, formula: &Formula) -> String {
        match formula {
            Formula::Const(true) => "true".into(),
            Formula::Const(false) => "false".into(),
            Formula::Atom(expr, relation) => {
                let op = match relation {
                    Relation::Lt => "<",
                    Relation::Le => "<=",
                    Relation::Eq => "=",
                    Relation::Ge => ">=",
                    Relation::Gt => ">",
                };
                format!("({} {} 0.0)", op, self.expr_term(expr))
            }
            Formula::Bool(v) => self.name_of(*v).to_string(),
            Formula::Not(inner) => format!("(not {})", self.formula_term(inner)),
            Formula::And(parts) => self.nary("and", "true", parts),
            Formula::Or(parts) => self.nary("or", "false", parts),
            Formula::Implies(a, b) => {
                format!("(=> {} {})", self.formula_term(a), self.formula_term(b))
            }
        }
    }

    fn nary(&self, op: &str, empty: &str, parts: &[Formula]) -> String {
        match parts {
            [] => empty.to_string(),
            [single] => self.formula_term(single),
            _ => {
                let inner: Vec<String> = parts.iter().map(|p| self.formula_term(p)).collect();
                format!("({} {})", op, inner.join(" "))
            }
        }
    }

    fn run(&self, script: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Backend(format!(
                "{} produced no answer ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

impl SolverSession for SmtLibSession {
    fn declare_real(&mut self, name: &str, lower: Rational, upper: Rational) -> Result<VarId> {
        self.stack.declare(name, Sort::Real, Some(lower), Some(upper))
    }

    fn declare_bool(&mut self, name: &str) -> Result<VarId> {
        self.stack.declare(name, Sort::Bool, None, None)
    }

    fn lookup(&self, name: &str) -> Option<VarId> {
        self.stack.lookup(name)
    }

    fn assert(&mut self, formula: Formula) {
        self.stack.assert(formula);
    }

    fn push(&mut self) {
        self.stack.push();
    }

    fn pop(&mut self) -> Result<()> {
        self.stack.pop()
    }

    fn check_assuming(&mut self, assumptions: &[Formula]) -> Result<CheckResult> {
        self.model.clear();
        let output = self.run(&self.script(assumptions))?;
        let (status, rest) = split_status(&output);
        match status {
            "sat" => {
                for (name, value) in parse_values(rest)? {
                    if let Some(var) = self.stack.lookup(&name) {
                        self.model.insert(var, value);
                    }
                }
                Ok(CheckResult::Sat)
            }
            "unsat" => Ok(CheckResult::Unsat),
            "unknown" | "timeout" => Ok(CheckResult::Unknown),
            other => Err(SmtParseError::Solver(other.to_string()).into()),
        }
    }

    fn model_value(&self, var: VarId) -> Option<ModelValue> {
        self.model.get(&var).copied()
    }

    fn assertion_count(&self) -> usize {
        self.stack.assertions().len()
    }
}

/// `n.0`, `(- n.0)` or `(/ n.0 d.0)`.
fn rational_term(value: Rational) -> String {
    let r = value.reduced();
    let magnitude = if r.denominator == 1 {
        format!("{}.0", r.numerator.unsigned_abs())
    } else {
        format!("(/ {}.0 {}.0)", r.numerator.unsigned_abs(), r.denominator)
    };
    if r.is_negative() {
        format!("(- {})", magnitude)
    } else {
        magnitude
    }
}

fn split_status(output: &str) -> (&str, &str) {
    let trimmed = output.trim_start();
    let end = trimmed.find('\n').unwrap_or(trimmed.len());
    (trimmed[..end].trim(), &trimmed[end..])
}

#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    fn render(&self) -> String {
        match self {
            Sexp::Atom(a) => a.clone(),
            Sexp::List(items) => {
                let inner: Vec<String> = items.iter().map(Sexp::render).collect();
                format!("({})", inner.join(" "))
            }
        }
    }
}

fn parse_sexps(input: &str) -> std::result::Result<Vec<Sexp>, SmtParseError> {
    let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
    let mut atom = String::new();
    let flush = |atom: &mut String, stack: &mut Vec<Vec<Sexp>>| {
        if !atom.is_empty() {
            if let Some(top) = stack.last_mut() {
                top.push(Sexp::Atom(std::mem::take(atom)));
            }
        }
    };
    for c in input.chars() {
        match c {
            '(' => {
                flush(&mut atom, &mut stack);
                stack.push(Vec::new());
            }
            ')' => {
                flush(&mut atom, &mut stack);
                let list = stack.pop().ok_or(SmtParseError::Unbalanced)?;
                stack
                    .last_mut()
                    .ok_or(SmtParseError::Unbalanced)?
                    .push(Sexp::List(list));
            }
            c if c.is_whitespace() => flush(&mut atom, &mut stack),
            c => atom.push(c),
        }
    }
    flush(&mut atom, &mut stack);
    if stack.len() != 1 {
        return Err(SmtParseError::Unbalanced);
    }
    Ok(stack.pop().unwrap_or_default())
}

/// Parses a `get-value` answer `((name value) ...)`.
fn parse_values(output: &str) -> std::result::Result<Vec<(String, ModelValue)>, SmtParseError> {
    let mut values = Vec::new();
    for sexp in parse_sexps(output)? {
        let Sexp::List(pairs) = sexp else {
            return Err(SmtParseError::Unexpected(sexp.render()));
        };
        if let [Sexp::Atom(head), rest @ ..] = pairs.as_slice() {
            if head == "error" {
                let message: Vec<String> = rest.iter().map(Sexp::render).collect();
                return Err(SmtParseError::Solver(message.join(" ")));
            }
        }
        for pair in pairs {
            match pair {
                Sexp::List(items) => match items.as_slice() {
                    [Sexp::Atom(name), value] => values.push((name.clone(), parse_value(value)?)),
                    _ => return Err(SmtParseError::Malformed(Sexp::List(items).render())),
                },
                other => return Err(SmtParseError::Unexpected(other.render())),
            }
        }
    }
    Ok(values)
}

#[derive(Debug, Clone, Copy)]
enum Numeral {
    Exact(i128, i128),
    Approximate(f64),
}

impl Numeral {
    fn negate(self) -> Self {
        match self {
            Numeral::Exact(n, d) => Numeral::Exact(-n, d),
            Numeral::Approximate(v) => Numeral::Approximate(-v),
        }
    }

    fn divide(self, other: Numeral) -> Self {
        match (self, other) {
            (Numeral::Exact(a, b), Numeral::Exact(c, d)) if c != 0 => {
                match (a.checked_mul(d), b.checked_mul(c)) {
                    (Some(n), Some(m)) => Numeral::Exact(n, m),
                    _ => Numeral::Approximate(a as f64 / b as f64 / (c as f64 / d as f64)),
                }
            }
            (a, b) => Numeral::Approximate(a.as_f64() / b.as_f64()),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Numeral::Exact(n, d) => n as f64 / d as f64,
            Numeral::Approximate(v) => v,
        }
    }

    fn into_model_value(self) -> ModelValue {
        if let Numeral::Exact(n, d) = self {
            let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };
            let g = gcd(n.unsigned_abs(), d.unsigned_abs()).max(1) as i128;
            if let (Ok(numerator), Ok(denominator)) = (i64::try_from(n / g), i64::try_from(d / g)) {
                return ModelValue::Exact {
                    numerator,
                    denominator,
                };
            }
        }
        ModelValue::Approximate(self.as_f64())
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn parse_value(sexp: &Sexp) -> std::result::Result<ModelValue, SmtParseError> {
    match sexp {
        Sexp::Atom(a) if a == "true" => Ok(ModelValue::Bool(true)),
        Sexp::Atom(a) if a == "false" => Ok(ModelValue::Bool(false)),
        other => Ok(parse_numeral(other)?.into_model_value()),
    }
}

fn parse_numeral(sexp: &Sexp) -> std::result::Result<Numeral, SmtParseError> {
    match sexp {
        Sexp::Atom(a) => parse_decimal(a),
        Sexp::List(items) => match items.as_slice() {
            [Sexp::Atom(op), x] if op == "-" => Ok(parse_numeral(x)?.negate()),
            [Sexp::Atom(op), a, b] if op == "/" => Ok(parse_numeral(a)?.divide(parse_numeral(b)?)),
            _ => Err(SmtParseError::Malformed(sexp.render())),
        },
    }
}

fn parse_decimal(token: &str) -> std::result::Result<Numeral, SmtParseError> {
    let malformed = || SmtParseError::Malformed(token.to_string());
    let (int_part, frac_part) = match token.split_once('.') {
        Some((i, f)) => (i, f),
        None => (token, ""),
    };
    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(malformed());
    }
    let digits = format!("{}{}", int_part, frac_part);
    let exact = u32::try_from(frac_part.len())
        .ok()
        .and_then(|len| 10_i128.checked_pow(len))
        .and_then(|d| digits.parse::<i128>().ok().map(|n| (n, d)));
    match exact {
        Some((n, d)) => Ok(Numeral::Exact(n, d)),
        None => token.parse::<f64>().map(Numeral::Approximate).map_err(|_| malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SmtLibSession {
        SmtLibBackend::new().open_session(2000).unwrap()
    }

    #[test]
    fn test_rational_terms() {
        assert_eq!(rational_term(Rational::from_integer(3)), "3.0");
        assert_eq!(rational_term(Rational::from_integer(-3)), "(- 3.0)");
        assert_eq!(rational_term(Rational::new(2, 6)), "(/ 1.0 3.0)");
        assert_eq!(rational_term(Rational::new(-1, 4)), "(- (/ 1.0 4.0))");
    }

    #[test]
    fn test_formula_terms() {
        let mut s = session();
        let x = s
            .declare_real("X_0", Rational::ZERO, Rational::from_integer(10))
            .unwrap();
        let o = s.declare_bool("O_0_1").unwrap();
        let atom = Formula::lt(LinExpr::var(x) * Rational::from_integer(2), Rational::from_integer(4));
        assert_eq!(s.formula_term(&atom), "(< (+ (* 2.0 X_0) (- 4.0)) 0.0)");

        let guarded = Formula::implies(Formula::Bool(o), Formula::ge(x, Rational::ZERO));
        assert_eq!(s.formula_term(&guarded), "(=> O_0_1 (>= X_0 0.0))");

        let neg = Formula::negate(Formula::Bool(o));
        assert_eq!(s.formula_term(&neg), "(not O_0_1)");
    }

    #[test]
    fn test_script_layout() {
        let mut s = session();
        let x = s
            .declare_real("X_0", Rational::ZERO, Rational::from_integer(10))
            .unwrap();
        s.assert(Formula::gt(x, Rational::from_integer(1)));
        let script = s.script(&[Formula::lt(x, Rational::from_integer(5))]);
        assert!(script.contains("(set-option :timeout 2000)"));
        assert!(script.contains("(declare-const X_0 Real)"));
        assert!(script.contains("(assert (<= 0.0 X_0))"));
        assert!(script.contains("(assert (<= X_0 10.0))"));
        assert!(script.contains("(assert (> (+ X_0 (- 1.0)) 0.0))"));
        assert!(script.contains("(assert (< (+ X_0 (- 5.0)) 0.0))"));
        assert!(script.trim_end().ends_with("(get-value (X_0))"));
    }

    #[test]
    fn test_parse_values() {
        let output = "((X_0 (/ 1.0 3.0))\n (Y_0 (- 2.5))\n (T_0 48.0)\n (O_0_1 true))";
        let values = parse_values(output).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(
            values[0],
            (
                "X_0".to_string(),
                ModelValue::Exact {
                    numerator: 1,
                    denominator: 3
                }
            )
        );
        assert_eq!(
            values[1].1,
            ModelValue::Exact {
                numerator: -5,
                denominator: 2
            }
        );
        assert_eq!(
            values[2].1,
            ModelValue::Exact {
                numerator: 48,
                denominator: 1
            }
        );
        assert_eq!(values[3].1, ModelValue::Bool(true));
    }

    #[test]
    fn test_parse_huge_value_is_approximate() {
        let output = "((X_0 (/ 1.0 300000000000000000000000.0)))";
        let values = parse_values(output).unwrap();
        assert!(matches!(values[0].1, ModelValue::Approximate(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_values("((X_0 1.0)"), Err(SmtParseError::Unbalanced));
        assert!(matches!(
            parse_values("((X_0 abc))"),
            Err(SmtParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_values("(error \"line 3: unknown constant\")"),
            Err(SmtParseError::Solver(_))
        ));
        let err: Error = SmtParseError::Unbalanced.into();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn test_split_status() {
        let (status, rest) = split_status("\nsat\n((X_0 1.0))\n");
        assert_eq!(status, "sat");
        assert_eq!(rest.trim(), "((X_0 1.0))");
    }

    #[test]
    fn test_live_solver() {
        let backend = SmtLibBackend::new();
        if !backend.is_available() {
            return;
        }
        let mut s = backend.open_session(5000).unwrap();
        let x = s
            .declare_real("X_0", Rational::ZERO, Rational::from_integer(10))
            .unwrap();
        s.assert(Formula::any([
            Formula::lt(x, Rational::new(1, 3)),
            Formula::gt(x, Rational::from_integer(20)),
        ]));
        assert_eq!(s.check().unwrap(), CheckResult::Sat);
        let value = Rational::from_model_value(&s.model_value(x).unwrap());
        assert!(value < Rational::new(1, 3));

        s.push();
        s.assert(Formula::gt(x, Rational::ONE));
        assert_eq!(s.check().unwrap(), CheckResult::Unsat);
        s.pop().unwrap();
        assert_eq!(s.check().unwrap(), CheckResult::Sat);
    }
}
