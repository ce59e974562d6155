//! Expression evaluation and `{% tag %}` template rendering.
//!
//! ```
//! use tagplate::{render_template, Context};
//!
//! let mut context = Context::new();
//! context.insert("items", vec![1, 2, 3]);
//!
//! let output = render_template("{% for x in items %}{{ x * 2 }}{% endfor %}", &context).unwrap();
//! assert_eq!(output, "246");
//! ```

#[macro_use]
mod tracing_macros;

mod ast;
mod builtins;
mod engine;
mod error;
mod eval;
mod interface;
mod literal;
mod operator;
mod parser;
mod tag;
mod template;
mod value;

// Public exports.
pub use ast::{Expression, Identifier, Token};
pub use engine::{evaluate_expression, render_template, tokenize, Engine, EngineOptions};
pub use error::{SyntaxError, SyntaxErrorKind, TemplateError, TemplateResult};
pub use interface::{Context, FileSystemLoader, MemoryLoader, TemplateLoader};
pub use literal::{Literal, LiteralKind, LiteralRegistry, LiteralDef};
pub use operator::Operator;
pub use tag::{validate_args_len, BlockContents, BlockTagFn, InlineTagFn, SubTag, TagCall, TagRegistry};
pub use value::Value;
