use std::sync::OnceLock;

use crate::ast::Expression;
use crate::builtins::builtin_tags;
use crate::error::{TemplateError, TemplateResult};
use crate::eval::evaluate;
use crate::interface::{Context, MemoryLoader, TemplateLoader};
use crate::literal::{LiteralKind, LiteralRegistry};
use crate::parser::tokenize_with;
use crate::tag::{BlockTagFn, InlineTagFn, SubTag, TagRegistry};
use crate::template::Renderer;
use crate::value::Value;

/// Tunables for an [`Engine`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineOptions {
    /// How deeply block bodies and included templates may nest inside a
    /// single render.
    pub recursion_limit: usize,
    /// Trim the whitespace around block contents before handing them to
    /// block handlers.
    pub strip_block_contents: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            recursion_limit: 32,
            strip_block_contents: true,
        }
    }
}

impl EngineOptions {
    pub const fn with_recursion_limit(mut self, recursion_limit: usize) -> Self {
        self.recursion_limit = recursion_limit;
        self
    }

    pub const fn with_strip_block_contents(mut self, strip_block_contents: bool) -> Self {
        self.strip_block_contents = strip_block_contents;
        self
    }
}

/// `Engine` owns the literal and tag registries, the named templates and the
/// options every render uses.
///
/// Registries are only changed through `&mut self`, so once an engine is
/// shared it is read-only and may serve many threads at once.
///
/// # Examples
///
/// ```
/// use tagplate::{Context, Engine};
///
/// let mut engine = Engine::new();
/// engine
///     .add_template("greeting", "Hello, {{ name }}!{% if admin %} (admin){% endif %}")
///     .unwrap();
///
/// let mut context = Context::new();
/// context.insert("name", "World").insert("admin", false);
///
/// let output = engine.render("greeting", &context).unwrap();
/// assert_eq!(output, "Hello, World!");
/// ```
pub struct Engine {
    literals: LiteralRegistry,
    tags: TagRegistry,
    templates: MemoryLoader,
    loader: Option<Box<dyn TemplateLoader>>,
    options: EngineOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_options(EngineOptions::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("literals", &self.literals)
            .field("tags", &self.tags)
            .field("templates", &self.templates)
            .field("has_loader", &self.loader.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Engine {
    /// An engine with the built-in literals and tags and default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            literals: LiteralRegistry::default(),
            tags: builtin_tags(),
            templates: MemoryLoader::new(),
            loader: None,
            options,
        }
    }

    /// Consults `loader` for any template not added with `add_template`.
    #[must_use]
    pub fn with_loader<L: TemplateLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub const fn literals(&self) -> &LiteralRegistry {
        &self.literals
    }

    pub const fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// # Errors
    /// - `LiteralCharacterAlreadyInUse`, `LiteralEndCharacterNotDefined`,
    ///   `MismatchedLiteralDelimiters` or `UnknownLiteralType`, see
    ///   [`LiteralRegistry::register`].
    pub fn register_literal(
        &mut self,
        start: &str,
        end: Option<&str>,
        kind: LiteralKind,
        escape: Option<char>,
    ) -> TemplateResult<()> {
        self.literals.register(start, end, kind, escape)
    }

    /// # Errors
    /// - `TagAlreadyRegistered` if the name is taken.
    pub fn register_inline_tag<N: Into<String>>(&mut self, name: N, handler: InlineTagFn) -> TemplateResult<()> {
        self.tags.register_inline(name, handler)
    }

    /// # Errors
    /// - `TagAlreadyRegistered` if the name is taken.
    pub fn register_block_tag<N: Into<String>, E: Into<String>>(
        &mut self,
        name: N,
        end: E,
        sub_tags: Vec<SubTag>,
        handler: BlockTagFn,
    ) -> TemplateResult<()> {
        self.tags.register_block(name, end, sub_tags, handler)
    }

    /// Adds a named template for `render` and `{% include %}`.
    ///
    /// # Errors
    /// - `TemplateExists` if a template with this name was already added.
    pub fn add_template<N: AsRef<str>, C: Into<String>>(&mut self, name: N, content: C) -> TemplateResult<()> {
        self.templates.add(name, content)
    }

    /// Looks a template up among the added templates, then in the loader.
    pub(crate) fn load(&self, name: &str) -> TemplateResult<Option<String>> {
        if let Some(source) = self.templates.load(name)? {
            return Ok(Some(source));
        }
        match &self.loader {
            Some(loader) => loader.load(name),
            None => Ok(None),
        }
    }

    /// Renders the named template.
    ///
    /// # Errors
    /// - `MissingTemplate` if no template has this name.
    /// - Any error raised while rendering it.
    pub fn render(&self, name: &str, context: &Context) -> TemplateResult<String> {
        let source = self.load(name)?.ok_or_else(|| TemplateError::MissingTemplate {
            template_name: name.to_string(),
        })?;
        self.render_template(&source, context)
    }

    /// Renders template source directly.
    ///
    /// # Errors
    /// - Any error raised while rendering, see [`TemplateError`].
    pub fn render_template(&self, source: &str, context: &Context) -> TemplateResult<String> {
        Renderer::new(self).render(source, context)
    }

    /// # Errors
    /// - `UnknownOperator` or `ExpressionSyntax` for malformed expressions.
    pub fn tokenize(&self, expression: &str) -> TemplateResult<Expression> {
        tokenize_with(expression, &self.literals)
    }

    /// Tokenizes and evaluates `expression` against `context`.
    ///
    /// # Errors
    /// - Any tokenizing error, plus `UnsupportedOperand` and `DivisionByZero`
    ///   from the operators.
    pub fn evaluate_expression(&self, context: &Context, expression: &str) -> TemplateResult<Value> {
        evaluate(&self.tokenize(expression)?, context)
    }
}

fn default_engine() -> &'static Engine {
    static ENGINE: OnceLock<Engine> = OnceLock::new();
    ENGINE.get_or_init(Engine::new)
}

/// Evaluates `expression` against `context` with the built-in literals.
///
/// # Errors
/// - See [`Engine::evaluate_expression`].
pub fn evaluate_expression(context: &Context, expression: &str) -> TemplateResult<Value> {
    default_engine().evaluate_expression(context, expression)
}

/// Renders `source` against `context` with the built-in tags.
///
/// # Errors
/// - See [`Engine::render_template`].
pub fn render_template(source: &str, context: &Context) -> TemplateResult<String> {
    default_engine().render_template(source, context)
}

/// # Errors
/// - See [`Engine::tokenize`].
pub fn tokenize(expression: &str) -> TemplateResult<Expression> {
    default_engine().tokenize(expression)
}
