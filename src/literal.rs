use std::collections::BTreeMap;

use crate::ast::Expression;
use crate::error::{SyntaxError, SyntaxErrorKind, TemplateError, TemplateResult};
use crate::parser::tokenize_with;

/// The kinds of literal the tokenizer knows how to accumulate.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    String,
    /// Started by an ASCII digit rather than through the registry.
    Numeric,
    List,
    Parenthesis,
}

impl LiteralKind {
    const fn needs_end_character(self) -> bool {
        !matches!(self, Self::Numeric)
    }
}

impl std::fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Numeric => write!(f, "numeric"),
            Self::List => write!(f, "list"),
            Self::Parenthesis => write!(f, "parenthesis"),
        }
    }
}

/// How one registered start character opens a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralDef {
    pub start: char,
    pub end: Option<char>,
    pub escape: Option<char>,
    pub kind: LiteralKind,
}

impl LiteralDef {
    /// Quote-like literals open and close on the same character, and
    /// nothing inside them nests.
    fn is_same_char(&self) -> bool {
        self.end == Some(self.start)
    }
}

/// The table of characters that open literals.
///
/// `LiteralRegistry::default()` holds the built-in literals: `"` and `'`
/// strings escaped with `\`, `[...]` lists and `(...)` groups.
#[derive(Debug, Clone)]
pub struct LiteralRegistry {
    defs: BTreeMap<char, LiteralDef>,
}

impl Default for LiteralRegistry {
    fn default() -> Self {
        let builtins = [
            ('"', '"', LiteralKind::String, Some('\\')),
            ('\'', '\'', LiteralKind::String, Some('\\')),
            ('[', ']', LiteralKind::List, None),
            ('(', ')', LiteralKind::Parenthesis, None),
        ];
        Self {
            defs: builtins
                .into_iter()
                .map(|(start, end, kind, escape)| {
                    (
                        start,
                        LiteralDef {
                            start,
                            end: Some(end),
                            escape,
                            kind,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl LiteralRegistry {
    /// A registry without any literals. Numbers are still recognised.
    pub const fn empty() -> Self {
        Self {
            defs: BTreeMap::new(),
        }
    }

    /// Registers each character of `start` as opening a literal of `kind`.
    ///
    /// `end` pairs up with `start` position by position, so `"\"'"` with
    /// `"\"'"` registers both quote styles at once.
    ///
    /// # Errors
    /// - `UnknownLiteralType` for `LiteralKind::Numeric`, which no character
    ///   in the registry can start.
    /// - `LiteralEndCharacterNotDefined` when `end` is missing.
    /// - `MismatchedLiteralDelimiters` when `start` and `end` differ in length.
    /// - `LiteralCharacterAlreadyInUse` when a start character is taken.
    pub fn register(
        &mut self,
        start: &str,
        end: Option<&str>,
        kind: LiteralKind,
        escape: Option<char>,
    ) -> TemplateResult<()> {
        if !kind.needs_end_character() {
            return Err(TemplateError::UnknownLiteralType {
                kind: kind.to_string(),
            });
        }

        let Some(first) = start.chars().next() else {
            return Err(TemplateError::MismatchedLiteralDelimiters {
                start: String::new(),
                end: end.unwrap_or_default().to_string(),
            });
        };
        let Some(end) = end else {
            return Err(TemplateError::LiteralEndCharacterNotDefined { character: first });
        };

        if start.chars().count() != end.chars().count() {
            return Err(TemplateError::MismatchedLiteralDelimiters {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let defs: Vec<LiteralDef> = start
            .chars()
            .zip(end.chars())
            .map(|(start, end)| LiteralDef {
                start,
                end: Some(end),
                escape,
                kind,
            })
            .collect();

        for (index, def) in defs.iter().enumerate() {
            let repeated = defs[..index].iter().any(|s| s.start == def.start);
            if repeated || self.defs.contains_key(&def.start) {
                return Err(TemplateError::LiteralCharacterAlreadyInUse {
                    character: def.start,
                });
            }
        }

        for def in defs {
            debug!("registered {} literal {:?}", def.kind, def.start);
            self.defs.insert(def.start, def);
        }

        Ok(())
    }

    pub fn lookup(&self, character: char) -> Option<&LiteralDef> {
        self.defs.get(&character)
    }

    fn closes_paired_literal(&self, character: char) -> bool {
        self.defs
            .values()
            .any(|def| !def.is_same_char() && def.end == Some(character))
    }

    fn is_escape(&self, character: char) -> bool {
        self.defs.values().any(|def| def.escape == Some(character))
    }

    /// Reports whether `value` leaves any literal open.
    ///
    /// Escaped characters are ignored, and so is everything inside a quote
    /// style literal.
    ///
    /// # Errors
    /// - `UnexpectedLiteralClose` when a close character has no matching open.
    pub fn is_unterminated(&self, value: &str) -> Result<bool, SyntaxError> {
        let mut open: Vec<&LiteralDef> = Vec::new();
        let mut escaped = false;

        for character in value.chars() {
            if escaped {
                escaped = false;
                continue;
            }

            if let Some(quote) = open.last().filter(|def| def.is_same_char()) {
                if quote.escape == Some(character) {
                    escaped = true;
                } else if quote.end == Some(character) {
                    open.pop();
                }
                continue;
            }

            if self.is_escape(character) {
                escaped = true;
            } else if let Some(def) = self.lookup(character) {
                open.push(def);
            } else if self.closes_paired_literal(character) {
                match open.last() {
                    Some(def) if def.end == Some(character) => {
                        open.pop();
                    }
                    _ => {
                        return Err(SyntaxError::unpositioned(
                            SyntaxErrorKind::UnexpectedLiteralClose {
                                character,
                                value: value.to_string(),
                            },
                        ));
                    }
                }
            }
        }

        Ok(!open.is_empty())
    }
}

/// A finished literal, ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    List(Vec<Expression>),
    Group(Expression),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Group(expression) => write!(f, "({})", expression),
        }
    }
}

/// What a pending literal did with the character it was offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LiteralStep {
    pub terminated: bool,
    pub consumed: bool,
}

impl LiteralStep {
    const CONTINUE: Self = Self {
        terminated: false,
        consumed: true,
    };
    const CLOSED: Self = Self {
        terminated: true,
        consumed: true,
    };
    const GIVEN_BACK: Self = Self {
        terminated: true,
        consumed: false,
    };
}

/// A literal the tokenizer is still feeding characters into.
#[derive(Debug, Clone)]
pub(crate) enum PendingLiteral {
    Str {
        def: LiteralDef,
        buffer: String,
        escaped: bool,
    },
    Numeric {
        buffer: String,
    },
    List {
        def: LiteralDef,
        items: Vec<String>,
        current: String,
    },
    Group {
        def: LiteralDef,
        buffer: String,
    },
}

impl PendingLiteral {
    pub fn open(def: &LiteralDef) -> Self {
        match def.kind {
            LiteralKind::String => Self::Str {
                def: *def,
                buffer: String::new(),
                escaped: false,
            },
            LiteralKind::Numeric => Self::Numeric {
                buffer: String::new(),
            },
            LiteralKind::List => Self::List {
                def: *def,
                items: Vec::new(),
                current: String::new(),
            },
            LiteralKind::Parenthesis => Self::Group {
                def: *def,
                buffer: String::new(),
            },
        }
    }

    pub fn numeric(digit: char) -> Self {
        Self::Numeric {
            buffer: digit.to_string(),
        }
    }

    pub const fn needs_end_character(&self) -> bool {
        !matches!(self, Self::Numeric { .. })
    }

    /// The text accumulated so far, for error messages.
    pub fn source(&self) -> String {
        match self {
            Self::Str { def, buffer, .. } => format!("{}{}", def.start, buffer),
            Self::Numeric { buffer } => buffer.clone(),
            Self::List {
                def,
                items,
                current,
            } => {
                let mut source = format!("{}{}", def.start, items.join(","));
                if !items.is_empty() {
                    source.push(',');
                }
                source.push_str(current);
                source
            }
            Self::Group { def, buffer } => format!("{}{}", def.start, buffer),
        }
    }

    /// Offers a character that is itself registered as a literal start.
    pub fn append_literal_match(
        &mut self,
        character: char,
        registry: &LiteralRegistry,
    ) -> Result<LiteralStep, SyntaxError> {
        match self {
            Self::Numeric { .. } => Err(SyntaxError::unpositioned(
                SyntaxErrorKind::UnexpectedLiteralMatch { character },
            )),
            Self::Str { .. } | Self::List { .. } | Self::Group { .. } => {
                self.append_character(character, registry)
            }
        }
    }

    pub fn append_character(
        &mut self,
        character: char,
        registry: &LiteralRegistry,
    ) -> Result<LiteralStep, SyntaxError> {
        match self {
            Self::Str {
                def,
                buffer,
                escaped,
            } => {
                if *escaped {
                    *escaped = false;
                    if def.end != Some(character) && def.escape != Some(character) {
                        buffer.extend(def.escape);
                    }
                    buffer.push(character);
                } else if def.escape == Some(character) {
                    *escaped = true;
                } else if def.end == Some(character) {
                    return Ok(LiteralStep::CLOSED);
                } else {
                    buffer.push(character);
                }
                Ok(LiteralStep::CONTINUE)
            }
            Self::Numeric { buffer } => {
                buffer.push(character);
                if buffer.parse::<f64>().is_ok() {
                    Ok(LiteralStep::CONTINUE)
                } else {
                    buffer.pop();
                    Ok(LiteralStep::GIVEN_BACK)
                }
            }
            Self::List {
                def,
                items,
                current,
            } => {
                let boundary = (character == ',' || def.end == Some(character))
                    && !registry.is_unterminated(current)?;
                if !boundary {
                    current.push(character);
                    return Ok(LiteralStep::CONTINUE);
                }

                let item = std::mem::take(current);
                if character == ',' {
                    if item.trim().is_empty() {
                        return Err(SyntaxError::unpositioned(SyntaxErrorKind::NullListItem));
                    }
                    items.push(item);
                    Ok(LiteralStep::CONTINUE)
                } else {
                    // A blank final item is an empty list or a trailing comma.
                    if !item.trim().is_empty() {
                        items.push(item);
                    }
                    Ok(LiteralStep::CLOSED)
                }
            }
            Self::Group { def, buffer } => {
                if def.end == Some(character) && !registry.is_unterminated(buffer)? {
                    Ok(LiteralStep::CLOSED)
                } else {
                    buffer.push(character);
                    Ok(LiteralStep::CONTINUE)
                }
            }
        }
    }

    /// Converts the accumulated text into a `Literal`, tokenizing the items of
    /// lists and groups.
    pub fn finish(self, registry: &LiteralRegistry) -> TemplateResult<Literal> {
        match self {
            Self::Str { buffer, .. } => Ok(Literal::Str(buffer)),
            Self::Numeric { buffer } => {
                if let Ok(int) = buffer.parse::<i64>() {
                    Ok(Literal::Int(int))
                } else if let Ok(float) = buffer.parse::<f64>() {
                    Ok(Literal::Float(float))
                } else {
                    Err(SyntaxError::unpositioned(SyntaxErrorKind::InvalidLiteralValue {
                        value: buffer,
                    })
                    .into())
                }
            }
            Self::List { items, .. } => items
                .iter()
                .map(|item| tokenize_with(item, registry))
                .collect::<TemplateResult<Vec<_>>>()
                .map(Literal::List),
            Self::Group { buffer, .. } => tokenize_with(&buffer, registry).map(Literal::Group),
        }
    }
}
