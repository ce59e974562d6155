use std::collections::HashMap;

use crate::ast::Expression;
use crate::error::{TemplateError, TemplateResult};
use crate::eval::evaluate;
use crate::interface::Context;
use crate::template::Renderer;
use crate::value::Value;

/// Produces the text an inline tag is replaced with. The text is spliced
/// into the output as is; use [`TagCall::render`] to render template source.
pub type InlineTagFn = fn(&TagCall<'_>) -> TemplateResult<String>;

/// Handles one section of a block tag. `None` means "no output", which lets
/// the renderer fall through to the block's next sub-tag.
///
/// Output is spliced as is, so handlers render the section with
/// [`BlockContents::render`].
pub type BlockTagFn = fn(&TagCall<'_>, &BlockContents<'_>) -> TemplateResult<Option<String>>;

/// A tag that may appear between a block's start and end tags, such as
/// `elif` inside `if`.
#[derive(Debug, Clone)]
pub struct SubTag {
    pub name: String,
    /// Replaces the block's handler for this sub-tag's section.
    pub handler: Option<BlockTagFn>,
}

impl SubTag {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            handler: None,
        }
    }

    pub fn with_handler<N: Into<String>>(name: N, handler: BlockTagFn) -> Self {
        Self {
            name: name.into(),
            handler: Some(handler),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Tag {
    Inline(InlineTagFn),
    Block {
        handler: BlockTagFn,
        end: String,
        sub_tags: Vec<SubTag>,
    },
}

/// The tags a template may use, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Tag>,
}

impl TagRegistry {
    /// An empty registry. `Engine::new` starts from the built-in tags instead.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_free(&self, name: &str) -> TemplateResult<()> {
        if self.tags.contains_key(name) {
            return Err(TemplateError::TagAlreadyRegistered {
                tag: name.to_string(),
            });
        }
        Ok(())
    }

    /// # Errors
    /// - `TagAlreadyRegistered` if `name` is taken.
    pub fn register_inline<N: Into<String>>(&mut self, name: N, handler: InlineTagFn) -> TemplateResult<()> {
        let name = name.into();
        self.ensure_free(&name)?;
        debug!("registered inline tag {}", name);
        self.tags.insert(name, Tag::Inline(handler));
        Ok(())
    }

    /// Registers a block tag closed by `end`, with `sub_tags` tried in order
    /// whenever a section produces no output.
    ///
    /// # Errors
    /// - `TagAlreadyRegistered` if `name` is taken.
    pub fn register_block<N: Into<String>, E: Into<String>>(
        &mut self,
        name: N,
        end: E,
        sub_tags: Vec<SubTag>,
        handler: BlockTagFn,
    ) -> TemplateResult<()> {
        let name = name.into();
        self.ensure_free(&name)?;
        debug!("registered block tag {}", name);
        self.tags.insert(
            name,
            Tag::Block {
                handler,
                end: end.into(),
                sub_tags,
            },
        );
        Ok(())
    }

    pub fn is_inline(&self, name: &str) -> bool {
        matches!(self.tags.get(name), Some(Tag::Inline(_)))
    }

    pub fn is_block(&self, name: &str) -> bool {
        matches!(self.tags.get(name), Some(Tag::Block { .. }))
    }

    pub(crate) fn insert(&mut self, name: &str, tag: Tag) {
        self.tags.insert(name.to_string(), tag);
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }
}

/// Everything a tag handler is called with.
pub struct TagCall<'a> {
    pub(crate) name: &'a str,
    pub(crate) args: Expression,
    pub(crate) context: &'a Context,
    pub(crate) renderer: &'a Renderer<'a>,
}

impl TagCall<'_> {
    /// The name the tag was invoked by. For a block this is the start tag or
    /// the sub-tag governing the current section.
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn args(&self) -> &Expression {
        &self.args
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    /// Evaluates the whole argument expression against the call's context.
    ///
    /// # Errors
    /// - Any error raised while evaluating the expression.
    pub fn evaluate(&self) -> TemplateResult<Value> {
        evaluate(&self.args, self.context)
    }

    pub fn evaluate_in(&self, expression: &Expression, context: &Context) -> TemplateResult<Value> {
        evaluate(expression, context)
    }

    /// Renders template source against the call's context, one level deeper
    /// than the tag itself.
    ///
    /// # Errors
    /// - Any rendering error in `source`.
    pub fn render(&self, source: &str) -> TemplateResult<String> {
        self.renderer.nested().render(source, self.context)
    }

    /// Fetches template source through the engine's loaders.
    ///
    /// # Errors
    /// - If a loader fails to read an existing template.
    pub fn load_template(&self, name: &str) -> TemplateResult<Option<String>> {
        self.renderer.engine().load(name)
    }
}

/// The text between a block's governing tag and its next boundary.
///
/// The text is not rendered until a handler asks for it.
pub struct BlockContents<'a> {
    pub(crate) text: &'a str,
    pub(crate) renderer: &'a Renderer<'a>,
}

impl BlockContents<'_> {
    pub fn as_str(&self) -> &str {
        self.text
    }

    /// Renders the contents against `context`, one level deeper than the
    /// block itself.
    ///
    /// # Errors
    /// - Any rendering error in the contents.
    pub fn render(&self, context: &Context) -> TemplateResult<String> {
        self.renderer.nested().render(self.text, context)
    }
}

/// Checks a tag received exactly `expected` argument tokens.
///
/// # Errors
/// - `TooManyTagArguments` if `found` is larger than `expected`.
/// - `MissingTagArguments` if `found` is smaller.
pub fn validate_args_len(tag: &str, found: usize, expected: usize) -> TemplateResult<()> {
    if found > expected {
        return Err(TemplateError::TooManyTagArguments {
            tag: tag.to_string(),
            expected,
            found,
        });
    }
    if found < expected {
        return Err(TemplateError::MissingTagArguments {
            tag: tag.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}
