//! shimmytwig: a small Twig-style template engine.
//!
//! Templates are compiled once into an immutable node tree and then
//! rendered any number of times, from any number of threads, against a
//! caller-supplied [`Context`].
//!
//! Supported surface:
//! - Output tags `{{ expr }}`, logic tags `{% ... %}`, comments `{# ... #}`.
//! - Literals: numbers, `'single'`/`"double"` strings with backslash
//!   escapes, `true`/`false`/`null`, arrays `[a, b]`, mappings `{"k": v}`.
//! - Operators, loosest first: `? :`, `||`, `&&`, `== !=`, `< <= > >=`,
//!   `+ - ~`, `* / %`, unary `! -`, then member access (`a.b`, `a["b"]`)
//!   and filters (`a|f`, `a|f(x)`).
//! - Tags: `set` (inline and block form), `for [key,] value in expr`
//!   with an optional `else`, `if`/`elseif`/`else`.
//! - Filters: `upper`, `lower`, `capitalize`, `title`, `length`, `sort`,
//!   `reverse`, `keys`, `merge`, `join`, `default`, `url_encode`,
//!   `json_encode`, `date`.
//!
//! Missing variables and keys are not errors; they evaluate to `null`,
//! which prints as nothing and pairs with the `default` filter.
//!
//! Not supported:
//! - Template inheritance, macros, includes.
//! - Custom filters or tags.
//! - Auto-escaping.
//!
//! ```
//! use shimmytwig::{compile, Context};
//!
//! let template = compile("{% for n in nums %}{{ n * 2 }} {% endfor %}").unwrap();
//! let ctx = Context::new().with("nums", vec![1, 2, 3]);
//! assert_eq!(template.render(&ctx).unwrap(), "2 4 6 ");
//! ```

pub mod ast;
pub mod config;
pub mod context;
pub mod date;
pub mod error;
pub mod eval;
pub mod filters;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod tags;
pub mod value;

use tracing::debug;

pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use registry::Registry;
pub use value::{Callable, Mapping, Value};

use ast::Node;

/// A compiled template. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
    config: Config,
}

impl Template {
    /// Compile with the default [`Config`].
    pub fn compile(source: &str) -> Result<Self> {
        Self::compile_with(source, Config::default())
    }

    /// Compile with `config`; the same config is used when rendering.
    pub fn compile_with(source: &str, config: Config) -> Result<Self> {
        let nodes = tags::parse_template(source, &config)?;
        debug!(source_len = source.len(), nodes = nodes.len(), "compiled template");
        Ok(Self { nodes, config })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn render(&self, context: &Context) -> Result<String> {
        self.render_with(context, &self.config)
    }

    /// Render with a different config (budgets, date timezone).
    pub fn render_with(&self, context: &Context, config: &Config) -> Result<String> {
        let output = eval::render(&self.nodes, context, config)?;
        debug!(output_len = output.len(), "rendered template");
        Ok(output)
    }
}

/// Compile template source. No I/O is performed.
pub fn compile(source: &str) -> Result<Template> {
    Template::compile(source)
}

/// Render a compiled template against `context`.
pub fn render(template: &Template, context: &Context) -> Result<String> {
    template.render(context)
}

/// Compile and render in one call.
pub fn render_str(source: &str, context: &Context) -> Result<String> {
    compile(source)?.render(context)
}
