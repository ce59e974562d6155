use crate::engine::Engine;
use crate::error::{TemplateError, TemplateResult};
use crate::interface::Context;
use crate::parser::tokenize_with;
use crate::tag::{BlockContents, BlockTagFn, InlineTagFn, SubTag, Tag, TagCall};

const TAG_OPEN: &str = "{%";
const TAG_CLOSE: &str = "%}";
const SUBSTITUTION_OPEN: &str = "{{";
const SUBSTITUTION_CLOSE: &str = "}}";

/// `{{ expr }}` is shorthand for `{% parse expr %}`.
const SUBSTITUTION_TAG: &str = "parse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanKind {
    Tag,
    Substitution,
}

/// One `{% ... %}` or `{{ ... }}` occurrence in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span<'a> {
    kind: SpanKind,
    /// Byte offset of the opening delimiter.
    start: usize,
    /// Byte offset just past the closing delimiter.
    end: usize,
    inner: &'a str,
    line: usize,
    column: usize,
}

impl<'a> Span<'a> {
    /// Splits the span into its tag name and raw argument text.
    fn name_and_args(&self) -> (&'a str, &'a str) {
        match self.kind {
            SpanKind::Substitution => (SUBSTITUTION_TAG, self.inner.trim()),
            SpanKind::Tag => {
                let inner = self.inner.trim();
                match inner.split_once(char::is_whitespace) {
                    Some((name, args)) => (name, args.trim()),
                    None => (inner, ""),
                }
            }
        }
    }
}

/// Finds tag spans in source order, tracking line and column for errors.
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
        }
    }

    #[inline]
    fn current_column(&self) -> usize {
        self.input[self.line_start_pos..self.pos].chars().count() + 1
    }

    /// Moves to byte offset `target`, counting the newlines passed over.
    fn advance_to(&mut self, target: usize) {
        for (offset, c) in self.input[self.pos..target].char_indices() {
            if c == '\n' {
                self.line += 1;
                self.line_start_pos = self.pos + offset + 1;
            }
        }
        self.pos = target;
    }

    fn peek(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    /// Returns the next complete span, or `None` at the end of the input.
    /// An opening delimiter without a matching close is plain text.
    fn next_span(&mut self) -> Option<Span<'a>> {
        loop {
            let rest = &self.input[self.pos..];
            let offset = rest.find('{')?;
            self.advance_to(self.pos + offset);

            let (kind, close) = if self.peek(TAG_OPEN) {
                (SpanKind::Tag, TAG_CLOSE)
            } else if self.peek(SUBSTITUTION_OPEN) {
                (SpanKind::Substitution, SUBSTITUTION_CLOSE)
            } else {
                self.advance_to(self.pos + 1);
                continue;
            };

            let start = self.pos;
            let inner_start = start + TAG_OPEN.len();
            let Some(inner_len) = self.input[inner_start..].find(close) else {
                self.advance_to(self.pos + 1);
                continue;
            };
            let end = inner_start + inner_len + close.len();

            let span = Span {
                kind,
                start,
                end,
                inner: &self.input[inner_start..inner_start + inner_len],
                line: self.line,
                column: self.current_column(),
            };
            self.advance_to(end);
            return Some(span);
        }
    }
}

/// One section of an open block: the text governed by the start tag or by
/// one of its sub-tags.
struct Section<'a> {
    name: &'a str,
    args: &'a str,
    handler: Option<BlockTagFn>,
    body_start: usize,
    body_end: usize,
}

/// A block tag whose end tag has not been reached yet.
struct OpenBlock<'a, 't> {
    name: &'a str,
    line: usize,
    column: usize,
    handler: BlockTagFn,
    end: &'t str,
    sub_tags: &'t [SubTag],
    sections: Vec<Section<'a>>,
    /// End tags of blocks opened inside this one, innermost last.
    nested: Vec<&'t str>,
}

impl<'a> OpenBlock<'a, '_> {
    fn sub_tag(&self, name: &str) -> Option<&SubTag> {
        self.sub_tags.iter().find(|sub_tag| sub_tag.name == name)
    }

    fn close_section(&mut self, at: usize) {
        if let Some(section) = self.sections.last_mut() {
            section.body_end = at;
        }
    }

    fn open_section(&mut self, span: &Span<'a>, handler: Option<BlockTagFn>) {
        let (name, args) = span.name_and_args();
        self.close_section(span.start);
        self.sections.push(Section {
            name,
            args,
            handler,
            body_start: span.end,
            body_end: span.end,
        });
    }
}

/// Renders template source for an engine at a given nesting depth.
pub(crate) struct Renderer<'e> {
    engine: &'e Engine,
    depth: usize,
}

impl<'e> Renderer<'e> {
    pub(crate) const fn new(engine: &'e Engine) -> Self {
        Self { engine, depth: 0 }
    }

    pub(crate) const fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// A renderer for output produced at this depth.
    pub(crate) const fn nested(&self) -> Self {
        Self {
            engine: self.engine,
            depth: self.depth + 1,
        }
    }

    fn call<'c>(&'c self, name: &'c str, args: &str, context: &'c Context) -> TemplateResult<TagCall<'c>> {
        Ok(TagCall {
            name,
            args: tokenize_with(args, self.engine.literals())?,
            context,
            renderer: self,
        })
    }

    fn run_inline(
        &self,
        handler: InlineTagFn,
        span: &Span<'_>,
        context: &Context,
    ) -> TemplateResult<String> {
        let (name, args) = span.name_and_args();
        trace!("running inline tag {}", name);
        handler(&self.call(name, args, context)?)
    }

    fn render_block(&self, source: &str, block: &OpenBlock<'_, '_>, context: &Context) -> TemplateResult<String> {
        trace!("closing block {} with {} sections", block.name, block.sections.len());
        let strip = self.engine.options().strip_block_contents;

        for section in &block.sections {
            let mut text = &source[section.body_start..section.body_end];
            if strip {
                text = text.trim();
            }

            let call = self.call(section.name, section.args, context)?;
            let contents = BlockContents { text, renderer: self };
            let handler = section.handler.unwrap_or(block.handler);

            if let Some(output) = handler(&call, &contents)? {
                return Ok(output);
            }
        }

        Ok(String::new())
    }

    /// Renders `source` against `context`.
    ///
    /// # Errors
    /// - `RecursionLimitExceeded` once bodies and includes nest deeper than
    ///   the engine allows.
    /// - `UnknownTag` and `UnclosedBlockTag` for malformed templates.
    /// - Any error raised by a tag handler.
    pub(crate) fn render(&self, source: &str, context: &Context) -> TemplateResult<String> {
        let limit = self.engine.options().recursion_limit;
        if self.depth > limit {
            debug!("recursion limit of {} exceeded", limit);
            return Err(TemplateError::RecursionLimitExceeded { limit });
        }

        let tags = self.engine.tags();
        let mut scanner = Scanner::new(source);
        let mut output = String::with_capacity(source.len());
        let mut copied_up_to = 0;
        let mut open: Option<OpenBlock<'_, '_>> = None;

        while let Some(span) = scanner.next_span() {
            let Some(block) = open.as_mut() else {
                output.push_str(&source[copied_up_to..span.start]);
                copied_up_to = span.end;

                let (name, _) = span.name_and_args();
                match tags.get(name) {
                    Some(Tag::Inline(handler)) => {
                        output.push_str(&self.run_inline(*handler, &span, context)?);
                    }
                    Some(Tag::Block {
                        handler,
                        end,
                        sub_tags,
                    }) => {
                        trace!("opening block {}", name);
                        let mut block = OpenBlock {
                            name,
                            line: span.line,
                            column: span.column,
                            handler: *handler,
                            end,
                            sub_tags,
                            sections: Vec::new(),
                            nested: Vec::new(),
                        };
                        block.open_section(&span, None);
                        open = Some(block);
                    }
                    None => {
                        return Err(TemplateError::UnknownTag {
                            tag: name.to_string(),
                            line: span.line,
                            column: span.column,
                        });
                    }
                }
                continue;
            };

            if span.kind == SpanKind::Substitution {
                continue;
            }

            let (name, _) = span.name_and_args();
            if block.nested.is_empty() {
                if let Some(sub_tag) = block.sub_tag(name) {
                    let handler = sub_tag.handler;
                    block.open_section(&span, handler);
                    continue;
                }
                if name == block.end {
                    block.close_section(span.start);
                    output.push_str(&self.render_block(source, block, context)?);
                    copied_up_to = span.end;
                    open = None;
                    continue;
                }
            }

            if block.nested.last().is_some_and(|end| *end == name) {
                block.nested.pop();
            } else if let Some(Tag::Block { end, .. }) = tags.get(name) {
                block.nested.push(end);
            }
        }

        if let Some(block) = open {
            return Err(TemplateError::UnclosedBlockTag {
                tag: block.name.to_string(),
                line: block.line,
                column: block.column,
            });
        }

        output.push_str(&source[copied_up_to..]);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn render(source: &str) -> TemplateResult<String> {
        Engine::new().render_template(source, &Context::new())
    }

    fn render_with(source: &str, context: &Context) -> String {
        Engine::new().render_template(source, context).unwrap()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_scanner_spans() {
        let mut scanner = Scanner::new("a {% if x %}\n{{ y }} {b} {% end");
        let first = scanner.next_span().unwrap();
        assert_eq!(first.kind, SpanKind::Tag);
        assert_eq!(first.inner, " if x ");
        assert_eq!((first.line, first.column), (1, 3));

        let second = scanner.next_span().unwrap();
        assert_eq!(second.kind, SpanKind::Substitution);
        assert_eq!(second.name_and_args(), ("parse", "y"));
        assert_eq!((second.line, second.column), (2, 1));

        assert!(scanner.next_span().is_none());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_span_is_not_greedy() {
        let mut scanner = Scanner::new("{% a %}x{% b %}");
        assert_eq!(scanner.next_span().unwrap().name_and_args(), ("a", ""));
        assert_eq!(scanner.next_span().unwrap().name_and_args(), ("b", ""));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unmatched_opener_is_text() {
        let mut scanner = Scanner::new("{{ x {% a %} {% b");
        assert_eq!(scanner.next_span().unwrap().name_and_args(), ("a", ""));
        assert!(scanner.next_span().is_none());

        assert_eq!(render("a {{ b {% parse 1 + 1 %}").unwrap(), "a {{ b 2");
        assert_eq!(render("{% parse 1 {{ 2 }}").unwrap(), "{% parse 1 2");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_values_are_not_rendered_again() {
        let mut context = Context::new();
        context
            .insert("name", "{{ secret }}")
            .insert("secret", "hunter2")
            .insert("closer", "{% endif %}")
            .insert("itself", "{{ itself }}")
            .insert("items", vec!["{{ secret }}", "{% if True %}x{% endif %}"]);

        assert_eq!(render_with("Hello {{ name }}", &context), "Hello {{ secret }}");
        assert_eq!(render_with("{% parse name %}", &context), "{{ secret }}");
        assert_eq!(render_with("{{ closer }}", &context), "{% endif %}");
        assert_eq!(render_with("{{ itself }}", &context), "{{ itself }}");
        assert_eq!(
            render_with("{% for x in items %}[{{ x }}]{% endfor %}", &context),
            "[{{ secret }}][{% if True %}x{% endif %}]"
        );
        assert_eq!(
            render_with("{% if True %}{{ name }}{% endif %}", &context),
            "{{ secret }}"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_plain_text_renders_to_itself() {
        let source = "no tags here, {not even} this { one } or {# this #}";
        assert_eq!(render(source).unwrap(), source);
        assert_eq!(render("").unwrap(), "");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_else() {
        assert_eq!(render("{% if False %}A{% else %}B{% endif %}").unwrap(), "B");
        assert_eq!(render("{% if True %}A{% endif %}").unwrap(), "A");
        assert_eq!(render("{% if False %}A{% endif %}").unwrap(), "");
        assert_eq!(
            render("[{% if 1 == 2 %}A{% elif 2 == 2 %}B{% else %}C{% endif %}]").unwrap(),
            "[B]"
        );
        assert_eq!(render("{% if %}empty{% endif %}").unwrap(), "empty");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_block_contents_are_stripped() {
        assert_eq!(render("<{% if True %}\n  A\n{% endif %}>").unwrap(), "<A>");

        let engine = Engine::with_options(crate::EngineOptions::default().with_strip_block_contents(false));
        assert_eq!(
            engine
                .render_template("<{% if True %} A {% endif %}>", &Context::new())
                .unwrap(),
            "< A >"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_for_loop() {
        let mut context = Context::new();
        context.insert("items", vec![1, 2, 3]);
        assert_eq!(
            render_with("{% for x in items %}{{x}}{% endfor %}", &context),
            "123"
        );
        assert_eq!(
            render_with("{% for c in 'ab' %}<{{ c }}>{% endfor %}", &context),
            "<a><b>"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_nested_blocks() {
        let mut context = Context::new();
        context.insert("rows", vec![vec![1, 2], vec![3]]);
        assert_eq!(
            render_with(
                "{% for row in rows %}[{% for cell in row %}{% if cell == 2 %}two{% else %}{{cell}}{% endif %}{% endfor %}]{% endfor %}",
                &context
            ),
            "[1two][3]"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sub_tags_of_nested_block_stay_inside_it() {
        assert_eq!(
            render("{% if True %}{% if False %}A{% else %}B{% endif %}{% else %}C{% endif %}").unwrap(),
            "B"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_blocks_sharing_an_end_tag() {
        fn unless(call: &TagCall<'_>, contents: &BlockContents<'_>) -> TemplateResult<Option<String>> {
            if call.evaluate()?.is_truthy() {
                return Ok(None);
            }
            contents.render(call.context()).map(Some)
        }

        let mut engine = Engine::new();
        engine
            .register_block_tag("unless", "endif", Vec::new(), unless)
            .unwrap();

        let output = engine
            .render_template(
                "{% if True %}a{% unless False %}b{% endif %}c{% endif %}d",
                &Context::new(),
            )
            .unwrap();
        assert_eq!(output, "abcd");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sub_tag_handler_override() {
        fn first(_: &TagCall<'_>, _: &BlockContents<'_>) -> TemplateResult<Option<String>> {
            Ok(None)
        }
        fn fallback(call: &TagCall<'_>, contents: &BlockContents<'_>) -> TemplateResult<Option<String>> {
            Ok(Some(format!("{}:{}", call.name(), contents.as_str())))
        }

        let mut engine = Engine::new();
        engine
            .register_block_tag(
                "try",
                "endtry",
                vec![SubTag::with_handler("recover", fallback)],
                first,
            )
            .unwrap();

        let output = engine
            .render_template("{% try %}a{% recover %}b{% endtry %}", &Context::new())
            .unwrap();
        assert_eq!(output, "recover:b");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_substitution() {
        let mut context = Context::new();
        context.insert("name", "World");
        context.insert("n", 2);
        assert_eq!(render_with("Hello, {{ name }}!", &context), "Hello, World!");
        assert_eq!(render_with("{{ n * 1.5 }} {{ missing }}", &context), "3.0 None");
        assert_eq!(render_with("{% parse [n, 'x'] %}", &context), "[2, 'x']");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_include() {
        let mut engine = Engine::new();
        engine.add_template("header", "<h1>{{ title }}</h1>").unwrap();

        let mut context = Context::new();
        context.insert("title", "Home");
        assert_eq!(
            engine
                .render_template("{% include \"header\" %}body", &context)
                .unwrap(),
            "<h1>Home</h1>body"
        );
        assert_eq!(
            engine.render_template("{% include 'nope' %}", &context).unwrap(),
            ""
        );
        assert!(matches!(
            engine.render_template("{% include 3 %}", &context),
            Err(TemplateError::TagArgument { .. })
        ));
    }

    #[test]
    #[ntest::timeout(1000)]
    fn test_self_include_hits_recursion_limit() {
        let mut engine = Engine::new();
        engine.add_template("loop", "{% include 'loop' %}").unwrap();
        assert_eq!(
            engine.render("loop", &Context::new()),
            Err(TemplateError::RecursionLimitExceeded { limit: 32 })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_and_unclosed_tags() {
        assert_eq!(
            render("line\n  {% frobnicate %}"),
            Err(TemplateError::UnknownTag {
                tag: "frobnicate".to_string(),
                line: 2,
                column: 3
            })
        );
        assert_eq!(
            render("{% if True %}never closed"),
            Err(TemplateError::UnclosedBlockTag {
                tag: "if".to_string(),
                line: 1,
                column: 1
            })
        );
        assert!(matches!(render("{% endif %}"), Err(TemplateError::UnknownTag { .. })));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_tag_argument_errors() {
        assert!(matches!(
            render("{% for x in [1] extra %}{% endfor %}"),
            Err(TemplateError::TooManyTagArguments { found: 4, .. })
        ));
        assert!(matches!(
            render("{% for x %}{% endfor %}"),
            Err(TemplateError::MissingTagArguments { found: 1, .. })
        ));
        assert!(matches!(
            render("{% for 1 in [1] %}{% endfor %}"),
            Err(TemplateError::TagArgument { .. })
        ));
        assert!(matches!(
            render("{% for x and [1] %}{% endfor %}"),
            Err(TemplateError::TagArgument { .. })
        ));
        assert!(matches!(
            render("{% for x in 5 %}{% endfor %}"),
            Err(TemplateError::TagArgument { .. })
        ));
        assert!(matches!(
            render("{% if False %}{% else True %}x{% endif %}"),
            Err(TemplateError::TooManyTagArguments { .. })
        ));
        assert!(matches!(
            render("{% parse %}"),
            Err(TemplateError::MissingTagArguments { .. })
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_conditional_handler_rejects_foreign_sub_tags() {
        let mut engine = Engine::new();
        engine
            .register_block_tag(
                "when",
                "endwhen",
                vec![SubTag::new("otherwise")],
                |call, contents| {
                    if call.name() == "when" {
                        return Ok(None);
                    }
                    crate::builtins::conditional(call, contents)
                },
            )
            .unwrap();
        assert_eq!(
            engine.render_template("{% when %}a{% otherwise %}b{% endwhen %}", &Context::new()),
            Err(TemplateError::UnknownTagConditionalExpression {
                tag: "otherwise".to_string()
            })
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_string_arguments_keep_spaces() {
        let mut context = Context::new();
        context.insert("greeting", Value::from("hi there"));
        assert_eq!(
            render_with("{% if greeting == 'hi there' %}yes{% endif %}", &context),
            "yes"
        );
    }
}
