//! The tags every engine starts with: `include`, `parse`, `if` and `for`.

use crate::ast::{Expression, Token};
use crate::error::{TemplateError, TemplateResult};
use crate::tag::{validate_args_len, BlockContents, SubTag, Tag, TagCall, TagRegistry};
use crate::value::Value;

pub(crate) fn builtin_tags() -> TagRegistry {
    let mut registry = TagRegistry::new();
    registry.insert("include", Tag::Inline(include));
    registry.insert("parse", Tag::Inline(parse));
    registry.insert(
        "if",
        Tag::Block {
            handler: conditional,
            end: "endif".to_string(),
            sub_tags: vec![SubTag::new("elif"), SubTag::new("else")],
        },
    );
    registry.insert(
        "for",
        Tag::Block {
            handler: for_loop,
            end: "endfor".to_string(),
            sub_tags: Vec::new(),
        },
    );
    registry
}

fn include(call: &TagCall<'_>) -> TemplateResult<String> {
    validate_args_len("include", call.args().len(), 1)?;

    let name = match call.evaluate()? {
        Value::Str(name) => name,
        other => {
            return Err(TemplateError::TagArgument {
                tag: "include".to_string(),
                message: format!("expected a template name string, got {}", other.type_name()),
            });
        }
    };

    match call.load_template(&name)? {
        Some(source) => call.render(&source),
        None => {
            debug!("included template {} not found", name);
            Ok(String::new())
        }
    }
}

fn parse(call: &TagCall<'_>) -> TemplateResult<String> {
    if call.args().is_empty() {
        return Err(TemplateError::MissingTagArguments {
            tag: "parse".to_string(),
            expected: 1,
            found: 0,
        });
    }
    Ok(call.evaluate()?.to_string())
}

/// Handles `if`, `elif` and `else` sections.
pub(crate) fn conditional(call: &TagCall<'_>, contents: &BlockContents<'_>) -> TemplateResult<Option<String>> {
    match call.name() {
        "if" | "elif" => match call.evaluate()? {
            // An empty condition evaluates to `None` and counts as true.
            Value::Bool(true) | Value::None => contents.render(call.context()).map(Some),
            _ => Ok(None),
        },
        "else" => {
            validate_args_len("else", call.args().len(), 0)?;
            contents.render(call.context()).map(Some)
        }
        other => Err(TemplateError::UnknownTagConditionalExpression {
            tag: other.to_string(),
        }),
    }
}

fn for_argument_error(message: String) -> TemplateError {
    TemplateError::TagArgument {
        tag: "for".to_string(),
        message,
    }
}

fn for_loop(call: &TagCall<'_>, contents: &BlockContents<'_>) -> TemplateResult<Option<String>> {
    validate_args_len("for", call.args().len(), 3)?;

    let [variable, keyword, iterable] = call.args().tokens() else {
        return Err(for_argument_error(format!(
            "expected `name in iterable`, got {}",
            call.args()
        )));
    };

    let variable = match variable {
        Token::Identifier(identifier) if identifier.child.is_none() => &identifier.name,
        other => {
            return Err(for_argument_error(format!(
                "expected a loop variable name, got {}",
                other
            )));
        }
    };

    if !matches!(keyword, Token::Operator(op) if op.symbol() == "in") {
        return Err(for_argument_error(format!("expected in, got {}", keyword)));
    }

    let iterable = call.evaluate_in(&Expression::new(vec![iterable.clone()]), call.context())?;
    let items = iterable.iter_items().ok_or_else(|| {
        for_argument_error(format!("{} is not iterable", iterable.type_name()))
    })?;

    let mut output = String::new();
    for item in items {
        let scope = call.context().with_overlay(variable, item);
        output.push_str(&contents.render(&scope)?);
    }
    Ok(Some(output))
}
