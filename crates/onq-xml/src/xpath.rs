//! Namespace-aware XPath 1.0 subset used by the rule DSL, the schematron
//! engine and the field scorers.
//!
//! Supported: absolute/relative location paths with child (`/`) and
//! descendant (`//`) axes, `.` and `..` steps, attribute steps (`@name`,
//! final step only), `*` name tests, predicates (boolean or positional),
//! `and`/`or`, the six comparison operators, `+`/`-`, `|` union, string and
//! number literals, and the core function library (`count`, `not`,
//! `boolean`, `string`, `number`, `string-length`, `normalize-space`,
//! `contains`, `starts-with`, `concat`, `local-name`, `true`, `false`).
//! `position()`/`last()` are not supported; use numeric predicates.
//! Numeric predicates index the per-context candidate list, so under `//`
//! they count across all matching descendants of each context node rather
//! than restarting per parent as full XPath 1.0 does.
//! Unknown functions are offered to an [`ExtFunctions`] hook before failing.

use std::collections::BTreeMap;

use roxmltree::Node;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XPathError {
    #[error("xpath parse error in '{expr}': {message}")]
    Parse { expr: String, message: String },
    #[error("unknown namespace prefix '{0}'")]
    UnknownPrefix(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' called with {got} argument(s)")]
    Arity { name: String, got: usize },
    #[error("unsupported xpath construct: {0}")]
    Unsupported(String),
}

/// Prefix -> namespace URI bindings for qualified name tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceMap {
    bindings: BTreeMap<String, String>,
}

impl NamespaceMap {
    pub fn empty() -> Self {
        NamespaceMap::default()
    }

    pub fn with_binding(mut self, prefix: &str, uri: &str) -> Self {
        self.bindings.insert(prefix.to_string(), uri.to_string());
        self
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Extension function hook. Extension functions are predicates over
/// string-converted arguments; return `None` for an unhandled name.
pub trait ExtFunctions {
    fn call(&self, name: &str, args: &[String]) -> Option<bool>;
}

/// The default hook: no extension functions.
pub struct NoExtFunctions;

impl ExtFunctions for NoExtFunctions {
    fn call(&self, _name: &str, _args: &[String]) -> Option<bool> {
        None
    }
}

/// Result of evaluating an expression.
#[derive(Clone, Debug)]
pub enum Value<'a, 'i> {
    Nodes(Vec<Node<'a, 'i>>),
    /// Attribute selections: one string per context node carrying the attribute.
    Strings(Vec<String>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl<'a, 'i> Value<'a, 'i> {
    /// Truthiness contract: non-empty node-set, non-empty trimmed string,
    /// non-zero number, native boolean.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nodes(ns) => !ns.is_empty(),
            Value::Strings(ss) => !ss.is_empty(),
            Value::Str(s) => !s.trim().is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    /// XPath string conversion (first node's string-value for node-sets).
    pub fn string_value(&self) -> String {
        match self {
            Value::Nodes(ns) => ns.first().map(|n| crate::node_string(*n)).unwrap_or_default(),
            Value::Strings(ss) => ss.first().cloned().unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => if *b { "true".into() } else { "false".into() },
        }
    }

    pub fn number_value(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            other => other.string_value().trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// --- lexer -----------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Dot,
    DotDot,
    Star,
    Comma,
    Pipe,
    Plus,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Number(f64),
    Literal(String),
    Name(String),
}

fn lex(expr: &str) -> Result<Vec<Tok>, XPathError> {
    let err = |message: &str| XPathError::Parse { expr: expr.to_string(), message: message.to_string() };
    let chars: Vec<char> = expr.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    toks.push(Tok::DoubleSlash);
                    i += 2;
                } else {
                    toks.push(Tok::Slash);
                    i += 1;
                }
            }
            '[' => { toks.push(Tok::LBracket); i += 1; }
            ']' => { toks.push(Tok::RBracket); i += 1; }
            '(' => { toks.push(Tok::LParen); i += 1; }
            ')' => { toks.push(Tok::RParen); i += 1; }
            '@' => { toks.push(Tok::At); i += 1; }
            ',' => { toks.push(Tok::Comma); i += 1; }
            '|' => { toks.push(Tok::Pipe); i += 1; }
            '+' => { toks.push(Tok::Plus); i += 1; }
            '-' => { toks.push(Tok::Minus); i += 1; }
            '*' => { toks.push(Tok::Star); i += 1; }
            '=' => { toks.push(Tok::Eq); i += 1; }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Ne);
                    i += 2;
                } else {
                    return Err(err("unexpected '!'"));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Le);
                    i += 2;
                } else {
                    toks.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Ge);
                    i += 2;
                } else {
                    toks.push(Tok::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut j = i + 1;
                let mut s = String::new();
                while j < chars.len() && chars[j] != quote {
                    s.push(chars[j]);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(err("unterminated string literal"));
                }
                toks.push(Tok::Literal(s));
                i = j + 1;
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    toks.push(Tok::DotDot);
                    i += 2;
                } else if chars.get(i + 1).map_or(false, |d| d.is_ascii_digit()) {
                    let (n, next) = lex_number(&chars, i);
                    toks.push(Tok::Number(n));
                    i = next;
                } else {
                    toks.push(Tok::Dot);
                    i += 1;
                }
            }
            _ if c.is_ascii_digit() => {
                let (n, next) = lex_number(&chars, i);
                toks.push(Tok::Number(n));
                i = next;
            }
            _ if is_name_start(c) => {
                let mut j = i + 1;
                let mut name = String::new();
                name.push(c);
                while j < chars.len() {
                    let d = chars[j];
                    if is_name_char(d) {
                        name.push(d);
                        j += 1;
                    } else if d == '-' && chars.get(j + 1).map_or(false, |e| is_name_char(*e)) {
                        // '-' continues a name only when glued to name chars,
                        // per XPath lexing ("string-length" vs "a - b").
                        name.push(d);
                        j += 1;
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Name(name));
                i = j;
            }
            _ => return Err(err(&format!("unexpected character '{}'", c))),
        }
    }
    Ok(toks)
}

fn lex_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut j = start;
    let mut s = String::new();
    let mut seen_dot = false;
    while j < chars.len() {
        let c = chars[j];
        if c.is_ascii_digit() {
            s.push(c);
            j += 1;
        } else if c == '.' && !seen_dot && chars.get(j + 1) != Some(&'.') {
            seen_dot = true;
            s.push(c);
            j += 1;
        } else {
            break;
        }
    }
    (s.parse().unwrap_or(f64::NAN), j)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == ':'
}

// --- parser ----------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Add(bool, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path(Path),
    Literal(String),
    Number(f64),
    Call(String, Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Start {
    Context,
    Root,
    RootDescendant,
}

#[derive(Clone, Debug)]
struct Path {
    start: Start,
    steps: Vec<Step>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
    Parent,
    Attribute,
}

#[derive(Clone, Debug)]
enum NameTest {
    Any,
    Named { prefix: Option<String>, local: String },
}

#[derive(Clone, Debug)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Expr>,
}

struct Parser<'e> {
    expr: &'e str,
    toks: Vec<Tok>,
    pos: usize,
}

impl<'e> Parser<'e> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Tok) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: Tok) -> Result<(), XPathError> {
        if self.eat(&t) {
            Ok(())
        } else {
            Err(self.err(&format!("expected {:?}", t)))
        }
    }

    fn err(&self, message: &str) -> XPathError {
        XPathError::Parse { expr: self.expr.to_string(), message: message.to_string() }
    }

    fn parse_expr(&mut self) -> Result<Expr, XPathError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Tok::Name("or".to_string())) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_compare()?;
        while self.peek() == Some(&Tok::Name("and".to_string())) {
            self.pos += 1;
            let right = self.parse_compare()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr, XPathError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Tok::Eq) => CmpOp::Eq,
            Some(Tok::Ne) => CmpOp::Ne,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::Le) => CmpOp::Le,
            Some(Tok::Gt) => CmpOp::Gt,
            Some(Tok::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_unary()?;
        loop {
            let subtract = match self.peek() {
                Some(Tok::Plus) => false,
                Some(Tok::Minus) => true,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Add(subtract, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Tok::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_primary()?;
        while self.eat(&Tok::Pipe) {
            let right = self.parse_primary()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Some(Tok::Literal(_)) => {
                if let Some(Tok::Literal(s)) = self.next() {
                    Ok(Expr::Literal(s))
                } else {
                    unreachable!()
                }
            }
            Some(Tok::Number(_)) => {
                if let Some(Tok::Number(n)) = self.next() {
                    Ok(Expr::Number(n))
                } else {
                    unreachable!()
                }
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Name(_)) if self.toks.get(self.pos + 1) == Some(&Tok::LParen) => {
                let name = match self.next() {
                    Some(Tok::Name(n)) => n,
                    _ => unreachable!(),
                };
                self.expect(Tok::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.eat(&Tok::Comma) {
                            continue;
                        }
                        self.expect(Tok::RParen)?;
                        break;
                    }
                }
                Ok(Expr::Call(name, args))
            }
            _ => self.parse_path().map(Expr::Path),
        }
    }

    fn parse_path(&mut self) -> Result<Path, XPathError> {
        let start = if self.eat(&Tok::DoubleSlash) {
            Start::RootDescendant
        } else if self.eat(&Tok::Slash) {
            Start::Root
        } else {
            Start::Context
        };

        let mut steps = Vec::new();
        let mut axis = match start {
            Start::RootDescendant => Axis::Descendant,
            _ => Axis::Child,
        };

        loop {
            let step = match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    Step { axis: Axis::SelfNode, test: NameTest::Any, predicates: Vec::new() }
                }
                Some(Tok::DotDot) => {
                    self.pos += 1;
                    Step { axis: Axis::Parent, test: NameTest::Any, predicates: Vec::new() }
                }
                Some(Tok::At) => {
                    self.pos += 1;
                    let test = self.parse_name_test()?;
                    Step { axis: Axis::Attribute, test, predicates: Vec::new() }
                }
                Some(Tok::Star) | Some(Tok::Name(_)) => {
                    let test = self.parse_name_test()?;
                    let mut predicates = Vec::new();
                    while self.eat(&Tok::LBracket) {
                        predicates.push(self.parse_expr()?);
                        self.expect(Tok::RBracket)?;
                    }
                    Step { axis, test, predicates }
                }
                _ => {
                    if steps.is_empty() && start == Start::Context {
                        return Err(self.err("expected a path step"));
                    }
                    break;
                }
            };

            let was_attribute = step.axis == Axis::Attribute;
            steps.push(step);

            if self.eat(&Tok::Slash) {
                axis = Axis::Child;
            } else if self.eat(&Tok::DoubleSlash) {
                axis = Axis::Descendant;
            } else {
                break;
            }
            if was_attribute {
                return Err(self.err("attribute step must be the last step"));
            }
        }

        if steps.is_empty() && start == Start::Context {
            return Err(self.err("empty expression"));
        }
        Ok(Path { start, steps })
    }

    fn parse_name_test(&mut self) -> Result<NameTest, XPathError> {
        match self.next() {
            Some(Tok::Star) => Ok(NameTest::Any),
            Some(Tok::Name(n)) => {
                if let Some((prefix, local)) = n.split_once(':') {
                    Ok(NameTest::Named { prefix: Some(prefix.to_string()), local: local.to_string() })
                } else {
                    Ok(NameTest::Named { prefix: None, local: n })
                }
            }
            _ => Err(self.err("expected a name test")),
        }
    }
}

/// A compiled XPath expression, reusable across documents.
#[derive(Clone, Debug)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn compile(expr: &str) -> Result<XPath, XPathError> {
        let toks = lex(expr)?;
        let mut parser = Parser { expr, toks, pos: 0 };
        let parsed = parser.parse_expr()?;
        if parser.pos != parser.toks.len() {
            return Err(parser.err("trailing tokens"));
        }
        Ok(XPath { source: expr.to_string(), expr: parsed })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate<'a, 'i>(
        &self,
        ctx: Node<'a, 'i>,
        ns: &NamespaceMap,
        ext: &dyn ExtFunctions,
    ) -> Result<Value<'a, 'i>, XPathError> {
        eval_expr(&self.expr, ctx, ns, ext)
    }

    /// Evaluate and reduce to the truthiness contract.
    pub fn matches(&self, ctx: Node, ns: &NamespaceMap, ext: &dyn ExtFunctions) -> Result<bool, XPathError> {
        Ok(self.evaluate(ctx, ns, ext)?.truthy())
    }

    /// Evaluate expecting a node-set; scalar results yield an empty set.
    pub fn select_nodes<'a, 'i>(
        &self,
        ctx: Node<'a, 'i>,
        ns: &NamespaceMap,
        ext: &dyn ExtFunctions,
    ) -> Result<Vec<Node<'a, 'i>>, XPathError> {
        match self.evaluate(ctx, ns, ext)? {
            Value::Nodes(nodes) => Ok(nodes),
            _ => Ok(Vec::new()),
        }
    }
}

/// One-shot convenience for static expressions.
pub fn evaluate<'a, 'i>(
    expr: &str,
    ctx: Node<'a, 'i>,
    ns: &NamespaceMap,
    ext: &dyn ExtFunctions,
) -> Result<Value<'a, 'i>, XPathError> {
    XPath::compile(expr)?.evaluate(ctx, ns, ext)
}

// --- evaluation ------------------------------------------------------------

fn eval_expr<'a, 'i>(
    expr: &Expr,
    ctx: Node<'a, 'i>,
    ns: &NamespaceMap,
    ext: &dyn ExtFunctions,
) -> Result<Value<'a, 'i>, XPathError> {
    match expr {
        Expr::Literal(s) => Ok(Value::Str(s.clone())),
        Expr::Number(n) => Ok(Value::Num(*n)),
        Expr::Or(l, r) => {
            if eval_expr(l, ctx, ns, ext)?.truthy() {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(eval_expr(r, ctx, ns, ext)?.truthy()))
            }
        }
        Expr::And(l, r) => {
            if !eval_expr(l, ctx, ns, ext)?.truthy() {
                Ok(Value::Bool(false))
            } else {
                Ok(Value::Bool(eval_expr(r, ctx, ns, ext)?.truthy()))
            }
        }
        Expr::Compare(op, l, r) => {
            let lv = eval_expr(l, ctx, ns, ext)?;
            let rv = eval_expr(r, ctx, ns, ext)?;
            Ok(Value::Bool(compare(*op, &lv, &rv)))
        }
        Expr::Add(subtract, l, r) => {
            let lv = eval_expr(l, ctx, ns, ext)?.number_value();
            let rv = eval_expr(r, ctx, ns, ext)?.number_value();
            Ok(Value::Num(if *subtract { lv - rv } else { lv + rv }))
        }
        Expr::Neg(inner) => Ok(Value::Num(-eval_expr(inner, ctx, ns, ext)?.number_value())),
        Expr::Union(l, r) => {
            let mut nodes = match eval_expr(l, ctx, ns, ext)? {
                Value::Nodes(n) => n,
                _ => return Err(XPathError::Unsupported("union of non-node values".into())),
            };
            match eval_expr(r, ctx, ns, ext)? {
                Value::Nodes(more) => {
                    for n in more {
                        if !nodes.contains(&n) {
                            nodes.push(n);
                        }
                    }
                }
                _ => return Err(XPathError::Unsupported("union of non-node values".into())),
            }
            Ok(Value::Nodes(nodes))
        }
        Expr::Path(path) => eval_path(path, ctx, ns, ext),
        Expr::Call(name, args) => eval_call(name, args, ctx, ns, ext),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    use CmpOp::*;
    match op {
        Eq | Ne => {
            let eq = set_aware_eq(left, right);
            if op == Eq { eq } else { !eq }
        }
        Lt | Le | Gt | Ge => {
            // Node-sets compare existentially by number.
            let lhs = candidate_numbers(left);
            let rhs = candidate_numbers(right);
            lhs.iter().any(|l| {
                rhs.iter().any(|r| match op {
                    Lt => l < r,
                    Le => l <= r,
                    Gt => l > r,
                    Ge => l >= r,
                    _ => unreachable!(),
                })
            })
        }
    }
}

fn candidate_strings(v: &Value) -> Vec<String> {
    match v {
        Value::Nodes(ns) => ns.iter().map(|n| crate::node_string(*n)).collect(),
        Value::Strings(ss) => ss.clone(),
        other => vec![other.string_value()],
    }
}

fn candidate_numbers(v: &Value) -> Vec<f64> {
    candidate_strings(v)
        .into_iter()
        .map(|s| s.trim().parse::<f64>().unwrap_or(f64::NAN))
        .collect()
}

fn set_aware_eq(left: &Value, right: &Value) -> bool {
    let left_is_set = matches!(left, Value::Nodes(_) | Value::Strings(_));
    let right_is_set = matches!(right, Value::Nodes(_) | Value::Strings(_));
    if left_is_set || right_is_set {
        let lhs = candidate_strings(left);
        let rhs = candidate_strings(right);
        return lhs.iter().any(|l| rhs.iter().any(|r| l == r));
    }
    match (left, right) {
        (Value::Bool(_), _) | (_, Value::Bool(_)) => left.truthy() == right.truthy(),
        (Value::Num(_), _) | (_, Value::Num(_)) => left.number_value() == right.number_value(),
        _ => left.string_value() == right.string_value(),
    }
}

fn eval_path<'a, 'i>(
    path: &Path,
    ctx: Node<'a, 'i>,
    ns: &NamespaceMap,
    ext: &dyn ExtFunctions,
) -> Result<Value<'a, 'i>, XPathError> {
    let mut current: Vec<Node<'a, 'i>> = match path.start {
        Start::Context => vec![ctx],
        Start::Root | Start::RootDescendant => vec![ctx.document().root()],
    };

    for (idx, step) in path.steps.iter().enumerate() {
        if step.axis == Axis::Attribute {
            // Final step by construction; yields strings, not nodes.
            let local = match &step.test {
                NameTest::Named { prefix: None, local } => local.clone(),
                NameTest::Named { prefix: Some(p), .. } => {
                    return Err(XPathError::Unsupported(format!(
                        "prefixed attribute test '@{}:...'",
                        p
                    )))
                }
                NameTest::Any => {
                    return Err(XPathError::Unsupported("'@*' attribute test".into()))
                }
            };
            debug_assert_eq!(idx, path.steps.len() - 1);
            let values: Vec<String> = current
                .iter()
                .filter_map(|n| n.attribute(local.as_str()).map(|v| v.to_string()))
                .collect();
            return Ok(Value::Strings(values));
        }

        let mut next: Vec<Node<'a, 'i>> = Vec::new();
        for node in &current {
            let candidates: Vec<Node<'a, 'i>> = match step.axis {
                Axis::Child => node
                    .children()
                    .filter(|c| c.is_element() && name_matches(*c, &step.test, ns).unwrap_or(false))
                    .collect(),
                Axis::Descendant => node
                    .descendants()
                    .filter(|c| {
                        *c != *node
                            && c.is_element()
                            && name_matches(*c, &step.test, ns).unwrap_or(false)
                    })
                    .collect(),
                Axis::SelfNode => vec![*node],
                Axis::Parent => node.parent().into_iter().collect(),
                Axis::Attribute => unreachable!(),
            };
            // Resolve prefix errors eagerly rather than silently matching nothing.
            if let NameTest::Named { prefix: Some(p), .. } = &step.test {
                if ns.resolve(p).is_none() {
                    return Err(XPathError::UnknownPrefix(p.clone()));
                }
            }

            let filtered = apply_predicates(candidates, &step.predicates, ns, ext)?;
            for n in filtered {
                if !next.contains(&n) {
                    next.push(n);
                }
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }

    Ok(Value::Nodes(current))
}

fn apply_predicates<'a, 'i>(
    candidates: Vec<Node<'a, 'i>>,
    predicates: &[Expr],
    ns: &NamespaceMap,
    ext: &dyn ExtFunctions,
) -> Result<Vec<Node<'a, 'i>>, XPathError> {
    let mut current = candidates;
    for pred in predicates {
        let mut kept = Vec::new();
        for (i, node) in current.iter().enumerate() {
            let keep = match eval_expr(pred, *node, ns, ext)? {
                // A numeric predicate is a 1-based position test.
                Value::Num(k) => (i + 1) as f64 == k,
                other => other.truthy(),
            };
            if keep {
                kept.push(*node);
            }
        }
        current = kept;
    }
    Ok(current)
}

fn name_matches(node: Node, test: &NameTest, ns: &NamespaceMap) -> Result<bool, XPathError> {
    match test {
        NameTest::Any => Ok(true),
        NameTest::Named { prefix, local } => {
            if node.tag_name().name() != local {
                return Ok(false);
            }
            match prefix {
                Some(p) => {
                    let uri = ns.resolve(p).ok_or_else(|| XPathError::UnknownPrefix(p.clone()))?;
                    Ok(node.tag_name().namespace() == Some(uri))
                }
                None => Ok(node.tag_name().namespace().is_none()),
            }
        }
    }
}

fn eval_call<'a, 'i>(
    name: &str,
    args: &[Expr],
    ctx: Node<'a, 'i>,
    ns: &NamespaceMap,
    ext: &dyn ExtFunctions,
) -> Result<Value<'a, 'i>, XPathError> {
    let mut values: Vec<Value<'a, 'i>> = Vec::with_capacity(args.len());
    for a in args {
        values.push(eval_expr(a, ctx, ns, ext)?);
    }
    let arity = |expected: usize| -> Result<(), XPathError> {
        if values.len() == expected {
            Ok(())
        } else {
            Err(XPathError::Arity { name: name.to_string(), got: values.len() })
        }
    };
    let arg_or_context_string = |values: &[Value]| -> String {
        values.first().map(|v| v.string_value()).unwrap_or_else(|| crate::node_string(ctx))
    };

    match name {
        "count" => {
            arity(1)?;
            let n = match &values[0] {
                Value::Nodes(ns) => ns.len(),
                Value::Strings(ss) => ss.len(),
                _ => return Err(XPathError::Unsupported("count() of a scalar".into())),
            };
            Ok(Value::Num(n as f64))
        }
        "not" => {
            arity(1)?;
            Ok(Value::Bool(!values[0].truthy()))
        }
        "boolean" => {
            arity(1)?;
            Ok(Value::Bool(values[0].truthy()))
        }
        "string" => {
            if values.len() > 1 {
                return Err(XPathError::Arity { name: name.into(), got: values.len() });
            }
            Ok(Value::Str(arg_or_context_string(&values)))
        }
        "number" => {
            if values.len() > 1 {
                return Err(XPathError::Arity { name: name.into(), got: values.len() });
            }
            let s = arg_or_context_string(&values);
            Ok(Value::Num(s.trim().parse().unwrap_or(f64::NAN)))
        }
        "string-length" => {
            if values.len() > 1 {
                return Err(XPathError::Arity { name: name.into(), got: values.len() });
            }
            Ok(Value::Num(arg_or_context_string(&values).chars().count() as f64))
        }
        "normalize-space" => {
            if values.len() > 1 {
                return Err(XPathError::Arity { name: name.into(), got: values.len() });
            }
            let s = arg_or_context_string(&values);
            Ok(Value::Str(s.split_whitespace().collect::<Vec<_>>().join(" ")))
        }
        "contains" => {
            arity(2)?;
            Ok(Value::Bool(values[0].string_value().contains(&values[1].string_value())))
        }
        "starts-with" => {
            arity(2)?;
            Ok(Value::Bool(values[0].string_value().starts_with(&values[1].string_value())))
        }
        "concat" => {
            if values.len() < 2 {
                return Err(XPathError::Arity { name: name.into(), got: values.len() });
            }
            Ok(Value::Str(values.iter().map(|v| v.string_value()).collect()))
        }
        "local-name" => {
            if values.len() > 1 {
                return Err(XPathError::Arity { name: name.into(), got: values.len() });
            }
            let n = match values.first() {
                Some(Value::Nodes(nodes)) => {
                    nodes.first().map(|n| n.tag_name().name().to_string()).unwrap_or_default()
                }
                Some(_) => return Err(XPathError::Unsupported("local-name() of a scalar".into())),
                None => ctx.tag_name().name().to_string(),
            };
            Ok(Value::Str(n))
        }
        "true" => {
            arity(0)?;
            Ok(Value::Bool(true))
        }
        "false" => {
            arity(0)?;
            Ok(Value::Bool(false))
        }
        other => {
            let strings: Vec<String> = values.iter().map(|v| v.string_value()).collect();
            match ext.call(other, &strings) {
                Some(b) => Ok(Value::Bool(b)),
                None => Err(XPathError::UnknownFunction(other.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    const DOC: &str = r#"<ONIX>
  <Product>
    <RecordReference>rr-1</RecordReference>
    <ProductIdentifier><ProductIDType>15</ProductIDType><IDValue>9781234567890</IDValue></ProductIdentifier>
    <Price><PriceAmount>9.99</PriceAmount></Price>
  </Product>
  <Product>
    <RecordReference>rr-2</RecordReference>
  </Product>
</ONIX>"#;

    fn doc() -> Document<'static> {
        Document::parse(DOC).unwrap()
    }

    fn eval_ok<'a, 'i>(expr: &str, ctx: Node<'a, 'i>) -> Value<'a, 'i> {
        evaluate(expr, ctx, &NamespaceMap::empty(), &NoExtFunctions).unwrap()
    }

    #[test]
    fn descendant_path_selects_all() {
        let d = doc();
        let v = eval_ok("//Product", d.root_element());
        match v {
            Value::Nodes(ns) => assert_eq!(ns.len(), 2),
            other => panic!("expected nodes, got {:?}", other),
        }
    }

    #[test]
    fn child_path_with_value_predicate() {
        let d = doc();
        let v = eval_ok(".//ProductIdentifier[ProductIDType='15']/IDValue", d.root_element());
        assert_eq!(v.string_value(), "9781234567890");
    }

    #[test]
    fn positional_predicate() {
        let d = doc();
        let v = eval_ok("/ONIX/Product[2]/RecordReference", d.root_element());
        assert_eq!(v.string_value(), "rr-2");
    }

    #[test]
    fn descendant_positional_predicate_counts_across_parents() {
        // Each Product holds one RecordReference; positions index the
        // flattened descendant list per context node.
        let d = doc();
        let v = eval_ok("//RecordReference[2]", d.root_element());
        assert_eq!(v.string_value(), "rr-2");
    }

    #[test]
    fn paths_parse_in_every_operand_position() {
        let d = doc();
        let root = d.root_element();
        assert!(eval_ok("//Product/RecordReference", root).truthy());
        assert!(eval_ok("count(.//Product) = 2", root).truthy());
        assert!(eval_ok("//Product[ProductIdentifier] and //Price", root).truthy());
        assert!(eval_ok("(//Price/PriceAmount) > 1", root).truthy());
    }

    #[test]
    fn numeric_comparison_on_node_set() {
        let d = doc();
        assert!(eval_ok(".//Price/PriceAmount > 0", d.root_element()).truthy());
        assert!(!eval_ok(".//Price/PriceAmount > 100", d.root_element()).truthy());
    }

    #[test]
    fn core_functions() {
        let d = doc();
        let root = d.root_element();
        assert_eq!(eval_ok("count(//Product)", root).number_value(), 2.0);
        assert!(eval_ok("string-length(.//RecordReference) = 4", root).truthy());
        assert!(eval_ok("contains('abcdef', 'cde')", root).truthy());
        assert!(eval_ok("not(//Missing)", root).truthy());
        assert!(eval_ok("starts-with(.//IDValue, '978')", root).truthy());
        assert_eq!(eval_ok("normalize-space('  a   b ')", root).string_value(), "a b");
    }

    #[test]
    fn truthiness_contract() {
        let d = doc();
        let root = d.root_element();
        assert!(!eval_ok("//Missing", root).truthy());
        assert!(!eval_ok("''", root).truthy());
        assert!(!eval_ok("'   '", root).truthy());
        assert!(eval_ok("'x'", root).truthy());
        assert!(!eval_ok("0", root).truthy());
        assert!(eval_ok("3", root).truthy());
    }

    #[test]
    fn namespaced_name_tests() {
        let text = r#"<o:ONIXMessage xmlns:o="http://ns.editeur.org/onix/3.0/reference"><o:Product/></o:ONIXMessage>"#;
        let d = Document::parse(text).unwrap();
        let ns = NamespaceMap::empty().with_binding("onix", "http://ns.editeur.org/onix/3.0/reference");
        let v = evaluate("//onix:Product", d.root_element(), &ns, &NoExtFunctions).unwrap();
        match v {
            Value::Nodes(nodes) => assert_eq!(nodes.len(), 1),
            other => panic!("expected nodes, got {:?}", other),
        }
        // Unprefixed test does not match namespaced elements.
        let v = evaluate("//Product", d.root_element(), &ns, &NoExtFunctions).unwrap();
        assert!(!v.truthy());
    }

    #[test]
    fn unknown_prefix_is_an_error() {
        let d = doc();
        let err = evaluate("//bogus:Product", d.root_element(), &NamespaceMap::empty(), &NoExtFunctions);
        assert!(matches!(err, Err(XPathError::UnknownPrefix(_))));
    }

    #[test]
    fn malformed_expression_is_an_error() {
        assert!(XPath::compile("//Product[").is_err());
        assert!(XPath::compile("///").is_err());
        assert!(XPath::compile("").is_err());
    }

    #[test]
    fn attribute_step_yields_strings() {
        let d = Document::parse(r#"<r><a role="warn"/><a/></r>"#).unwrap();
        let v = eval_ok("//a/@role", d.root_element());
        match v {
            Value::Strings(ss) => assert_eq!(ss, vec!["warn"]),
            other => panic!("expected strings, got {:?}", other),
        }
        assert!(eval_ok("//a[@role='warn']", d.root_element()).truthy());
        assert!(!eval_ok("//a[@role='error']", d.root_element()).truthy());
    }

    #[test]
    fn extension_function_hook() {
        struct Always;
        impl ExtFunctions for Always {
            fn call(&self, name: &str, _args: &[String]) -> Option<bool> {
                (name == "in-codelist").then_some(true)
            }
        }
        let d = doc();
        let v = evaluate("in-codelist('5', '01')", d.root_element(), &NamespaceMap::empty(), &Always).unwrap();
        assert!(v.truthy());
        let err = evaluate("no-such-fn('x')", d.root_element(), &NamespaceMap::empty(), &Always);
        assert!(matches!(err, Err(XPathError::UnknownFunction(_))));
    }

    #[test]
    fn union_merges_without_duplicates() {
        let d = doc();
        let v = eval_ok("//RecordReference | //Product/RecordReference", d.root_element());
        match v {
            Value::Nodes(ns) => assert_eq!(ns.len(), 2),
            other => panic!("expected nodes, got {:?}", other),
        }
    }
}
