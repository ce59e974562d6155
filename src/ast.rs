use crate::error::{SyntaxError, SyntaxErrorKind};
use crate::interface::Context;
use crate::literal::Literal;
use crate::operator::Operator;
use crate::value::Value;

/// A name looked up in the context, with an optional chain of attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub name: String,
    /// The attribute accessed on the value of `name`, e.g. `b` in `a.b`.
    pub child: Option<Box<Identifier>>,
}

impl Identifier {
    /// Builds an identifier from dotted source text such as `user.name`.
    ///
    /// # Errors
    /// - `EmptyIdentifierSegment` when a segment between dots is empty.
    /// - `UnexpectedCharacter` when a segment is not a valid name.
    pub fn from_path(path: &str) -> Result<Self, SyntaxError> {
        let mut identifier: Option<Self> = None;

        for segment in path.rsplit('.') {
            if segment.is_empty() {
                return Err(SyntaxError::unpositioned(
                    SyntaxErrorKind::EmptyIdentifierSegment {
                        identifier: path.to_string(),
                    },
                ));
            }
            if let Some(character) = segment
                .char_indices()
                .find(|&(index, c)| !is_identifier_char(c, index == 0))
                .map(|(_, c)| c)
            {
                return Err(SyntaxError::unpositioned(
                    SyntaxErrorKind::UnexpectedCharacter { character },
                ));
            }

            identifier = Some(Self {
                name: segment.to_string(),
                child: identifier.map(Box::new),
            });
        }

        identifier.ok_or_else(|| {
            SyntaxError::unpositioned(SyntaxErrorKind::EmptyIdentifierSegment {
                identifier: path.to_string(),
            })
        })
    }

    /// Resolves the identifier against `context`. Any missing link in the
    /// chain resolves to `None`.
    pub fn resolve(&self, context: &Context) -> Value {
        let Some(mut value) = context.get(&self.name) else {
            return Value::None;
        };

        let mut child = self.child.as_deref();
        while let Some(attribute) = child {
            match value.get_attr(&attribute.name) {
                Some(next) => value = next,
                None => return Value::None,
            }
            child = attribute.child.as_deref();
        }

        value.clone()
    }
}

/// Whether `c` may appear in a name segment; `first` selects the stricter
/// rule for a segment's leading character.
pub(crate) const fn is_identifier_char(c: char, first: bool) -> bool {
    c == '_' || c.is_ascii_alphabetic() || (!first && c.is_ascii_digit())
}

/// Whether the whole of `text` is a single valid name segment.
pub(crate) fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .char_indices()
            .all(|(index, c)| is_identifier_char(c, index == 0))
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(child) = &self.child {
            write!(f, ".{}", child)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(Identifier),
    Literal(Literal),
    Operator(Operator),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identifier(identifier) => write!(f, "{}", identifier),
            Self::Literal(literal) => write!(f, "{}", literal),
            Self::Operator(operator) => write!(f, "{}", operator),
        }
    }
}

/// An ordered sequence of tokens that evaluates to a single value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    tokens: Vec<Token>,
}

impl Expression {
    pub const fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub(crate) fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, token) in self.tokens.iter().enumerate() {
            if index > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

impl IntoIterator for Expression {
    type Item = Token;
    type IntoIter = std::vec::IntoIter<Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_identifier_chain() {
        let identifier = Identifier::from_path("a.b.c").unwrap();
        assert_eq!(identifier.name, "a");
        assert_eq!(identifier.to_string(), "a.b.c");

        let child = identifier.child.as_deref().unwrap();
        assert_eq!(child.name, "b");
        assert_eq!(child.child.as_deref().unwrap().name, "c");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_identifier_rejects_empty_segments() {
        for path in ["a.", ".a", "a..b", ""] {
            assert_eq!(
                Identifier::from_path(path).unwrap_err().kind,
                SyntaxErrorKind::EmptyIdentifierSegment {
                    identifier: path.to_string()
                },
                "{}",
                path
            );
        }
        assert!(Identifier::from_path("a.1b").is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_identifier_resolution() {
        let mut context = Context::new();
        let inner: Value = [("b", 5)].into_iter().collect();
        context.insert("a", inner);
        context.insert("n", 1);

        let resolve = |path| Identifier::from_path(path).unwrap().resolve(&context);
        assert_eq!(resolve("a.b"), Value::Int(5));
        assert_eq!(resolve("a.c"), Value::None);
        assert_eq!(resolve("n.b"), Value::None);
        assert_eq!(resolve("missing"), Value::None);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_is_identifier() {
        assert!(is_identifier("_x1"));
        assert!(is_identifier("index"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier(""));
    }
}
