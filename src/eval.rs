use std::cell::RefCell;
use std::collections::HashMap;

use tracing::{trace, warn};

use crate::ast::*;
use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::filters;
use crate::value::{Mapping, Value};

/// Walks a node forest against a read-only [`Context`].
///
/// `set` and loop bindings live in a stack of local scopes layered over
/// the context. A `for` iteration pushes a scope and pops it when the
/// body is done, so loop variables never leak and outer bindings they
/// shadow come back untouched. The template itself is never mutated.
///
/// A callable bound directly in the context is invoked the first time
/// its bare name is referenced; later references in the same render
/// reuse that result.
pub struct Evaluator<'a> {
    globals: &'a Context,
    config: &'a Config,
    scopes: Vec<HashMap<String, Value>>,
    /// Results of context callables referenced by bare name.
    resolved: RefCell<HashMap<String, Value>>,
    depth: usize,
    iterations: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(globals: &'a Context, config: &'a Config) -> Self {
        Self {
            globals,
            config,
            scopes: vec![HashMap::new()],
            resolved: RefCell::new(HashMap::new()),
            depth: 0,
            iterations: 0,
        }
    }

    fn get_var(&self, name: &str) -> Option<&Value> {
        self.local(name).or_else(|| self.globals.get(name))
    }

    fn local(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Value of a bare variable reference. Context callables run once.
    fn variable(&self, name: &str) -> Result<Value> {
        if let Some(v) = self.local(name) {
            return match v {
                Value::Callable(f) => f.call(&[]),
                v => Ok(v.clone()),
            };
        }
        match self.globals.get(name) {
            Some(Value::Callable(f)) => {
                if let Some(v) = self.resolved.borrow().get(name) {
                    return Ok(v.clone());
                }
                let v = f.call(&[])?;
                self.resolved.borrow_mut().insert(name.to_string(), v.clone());
                Ok(v)
            }
            Some(v) => Ok(v.clone()),
            None => Ok(Value::Null),
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind in the current scope.
    fn set_local(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// `set`: overwrite the nearest local binding of `name` if there is
    /// one, otherwise bind in the current scope.
    fn assign(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.iter_mut().rev().find(|s| s.contains_key(name)) {
            scope.insert(name.to_string(), value);
            return;
        }
        self.set_local(name, value);
    }

    pub fn render(&mut self, nodes: &[Node]) -> Result<String> {
        let mut output = String::new();
        self.render_into(nodes, &mut output)?;
        Ok(output)
    }

    fn render_into(&mut self, nodes: &[Node], output: &mut String) -> Result<()> {
        if self.depth >= self.config.max_depth {
            warn!(max_depth = self.config.max_depth, "render depth budget exhausted");
            return Err(Error::eval(format!(
                "block nesting exceeds max depth {}",
                self.config.max_depth
            )));
        }
        self.depth += 1;
        let result = self.render_nodes(nodes, output);
        self.depth -= 1;
        result
    }

    fn render_nodes(&mut self, nodes: &[Node], output: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(s) => output.push_str(s),
                Node::Output(expr) => {
                    let val = self.eval_expr(expr)?;
                    output.push_str(&val.to_string());
                }
                Node::Set { name, value } => {
                    let val = self.eval_expr(value)?;
                    self.assign(name, val);
                }
                Node::SetBlock { name, body } => {
                    let mut captured = String::new();
                    self.render_into(body, &mut captured)?;
                    self.assign(name, Value::String(captured));
                }
                Node::For {
                    key,
                    value,
                    iterable,
                    body,
                    else_body,
                } => {
                    self.render_for(key.as_deref(), value, iterable, body, else_body.as_deref(), output)?;
                }
                Node::If { branches, else_body } => {
                    let mut matched = false;
                    for (cond, body) in branches {
                        if self.eval_expr(cond)?.is_truthy() {
                            self.render_into(body, output)?;
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        if let Some(body) = else_body {
                            self.render_into(body, output)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn render_for(
        &mut self,
        key: Option<&str>,
        value: &str,
        iterable: &Expr,
        body: &[Node],
        else_body: Option<&[Node]>,
        output: &mut String,
    ) -> Result<()> {
        let items: Vec<(Value, Value)> = match self.eval_expr(iterable)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Mapping(m) => m.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            // Anything else iterates zero times.
            _ => Vec::new(),
        };

        if items.is_empty() {
            if let Some(body) = else_body {
                self.render_into(body, output)?;
            }
            return Ok(());
        }

        let length = items.len();
        trace!(length, "for loop");
        for (i, (k, item)) in items.into_iter().enumerate() {
            self.iterations += 1;
            if self.iterations > self.config.max_iterations {
                warn!(max_iterations = self.config.max_iterations, "loop budget exhausted");
                return Err(Error::eval(format!(
                    "more than {} loop iterations",
                    self.config.max_iterations
                )));
            }

            self.push_scope();
            if let Some(key) = key {
                self.set_local(key, k);
            }
            self.set_local(value, item);
            self.set_local("loop", loop_info(i, length));
            let result = self.render_into(body, output);
            self.pop_scope();
            result?;
        }
        Ok(())
    }

    pub fn eval_expr(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Variable(name) => self.variable(name),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Unary { op, operand } => {
                let v = self.eval_expr(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!v.is_truthy()),
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                })
            }
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval_expr(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Expr::Mapping(entries) => {
                let mut m = Mapping::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = self.eval_expr(k)?.to_string();
                    let val = self.eval_expr(v)?;
                    m.insert(key, val);
                }
                Ok(Value::Mapping(m))
            }
            Expr::Member { object, key, .. } => {
                let obj = self.eval_expr(object)?;
                let key = self.eval_expr(key)?;
                match obj.get(&key) {
                    Some(Value::Callable(f)) => f.call(&[]),
                    Some(v) => Ok(v.clone()),
                    None => Ok(Value::Null),
                }
            }
            Expr::Filter { input, name, args } => {
                let input = self.eval_expr(input)?;
                let args = self.eval_args(args)?;
                filters::apply(name, input, &args, self.config)
            }
            Expr::Call { name, args } => {
                let args = self.eval_args(args)?;
                if let Some(Value::Callable(f)) = self.get_var(name) {
                    return f.call(&args);
                }
                let (input, rest) = match args.split_first() {
                    Some((first, rest)) => (first.clone(), rest),
                    None => (Value::Null, &[][..]),
                };
                filters::apply(name, input, rest, self.config)
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval_expr(test)?.is_truthy() {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(otherwise)
                }
            }
        }
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    fn eval_binary(&self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value> {
        let l = self.eval_expr(left)?;
        match op {
            BinOp::And if !l.is_truthy() => return Ok(Value::Bool(false)),
            BinOp::Or if l.is_truthy() => return Ok(Value::Bool(true)),
            _ => {}
        }
        let r = self.eval_expr(right)?;
        Ok(binary(op, &l, &r))
    }
}

/// Operator semantics on already-evaluated operands.
pub fn binary(op: BinOp, l: &Value, r: &Value) -> Value {
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        BinOp::Or | BinOp::And => Value::Bool(r.is_truthy()),
        BinOp::Eq => Value::Bool(l.loose_eq(r)),
        BinOp::NotEq => Value::Bool(!l.loose_eq(r)),
        BinOp::Lt => Value::Bool(a < b),
        BinOp::LtEq => Value::Bool(a <= b),
        BinOp::Gt => Value::Bool(a > b),
        BinOp::GtEq => Value::Bool(a >= b),
        BinOp::Add => Value::Number(a + b),
        BinOp::Sub => Value::Number(a - b),
        BinOp::Mul => Value::Number(a * b),
        BinOp::Div => Value::Number(a / b),
        BinOp::Rem => Value::Number(a % b),
        BinOp::Concat => Value::String(format!("{l}{r}")),
    }
}

fn loop_info(index: usize, length: usize) -> Value {
    let mut m = Mapping::new();
    m.insert("index".to_string(), Value::from(index + 1));
    m.insert("index0".to_string(), Value::from(index));
    m.insert("revindex".to_string(), Value::from(length - index));
    m.insert("revindex0".to_string(), Value::from(length - index - 1));
    m.insert("first".to_string(), Value::Bool(index == 0));
    m.insert("last".to_string(), Value::Bool(index + 1 == length));
    m.insert("length".to_string(), Value::from(length));
    Value::Mapping(m)
}

/// Render `nodes` against `context`.
pub fn render(nodes: &[Node], context: &Context, config: &Config) -> Result<String> {
    Evaluator::new(context, config).render(nodes)
}
