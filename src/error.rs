pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// What went wrong while tokenizing or reducing an expression.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    UnexpectedCharacter {
        character: char,
    },
    /// A literal that needs an explicit end character ran off the end of
    /// the input.
    UnexpectedEndOfExpression {
        expression: String,
    },
    UnexpectedLiteralCharacter {
        character: char,
    },
    UnexpectedLiteralMatch {
        character: char,
    },
    UnexpectedLiteralClose {
        character: char,
        value: String,
    },
    NullListItem,
    InvalidLiteralValue {
        value: String,
    },
    EmptyIdentifierSegment {
        identifier: String,
    },
    MissingLeftOperand {
        operator: String,
        expression: String,
    },
    MissingRightOperand {
        operator: String,
        expression: String,
    },
    UnexpectedOperator {
        operator: String,
    },
    InvalidExpression {
        expression: String,
    },
}

impl std::fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedCharacter { character } => {
                write!(f, "Unexpected character '{}'", character)
            }
            Self::UnexpectedEndOfExpression { expression } => {
                write!(f, "Unexpected end of expression: {}", expression)
            }
            Self::UnexpectedLiteralCharacter { character } => {
                write!(f, "Unexpected literal character '{}'", character)
            }
            Self::UnexpectedLiteralMatch { character } => {
                write!(f, "Unexpected literal match '{}'", character)
            }
            Self::UnexpectedLiteralClose { character, value } => {
                write!(
                    f,
                    "Unexpected literal close character '{}' in {}",
                    character, value
                )
            }
            Self::NullListItem => write!(f, "List item may not be empty"),
            Self::InvalidLiteralValue { value } => {
                write!(f, "Invalid literal value: {}", value)
            }
            Self::EmptyIdentifierSegment { identifier } => {
                write!(f, "Identifier '{}' has an empty attribute", identifier)
            }
            Self::MissingLeftOperand {
                operator,
                expression,
            } => {
                write!(
                    f,
                    "Operator {} is missing a left operand near {}",
                    operator, expression
                )
            }
            Self::MissingRightOperand {
                operator,
                expression,
            } => {
                write!(
                    f,
                    "Operator {} is missing a right operand near {}",
                    operator, expression
                )
            }
            Self::UnexpectedOperator { operator } => {
                write!(f, "Unexpected operator: {}", operator)
            }
            Self::InvalidExpression { expression } => {
                write!(f, "Expression \"{}\" is not valid", expression)
            }
        }
    }
}

impl std::error::Error for SyntaxErrorKind {}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntaxError {
    /// Character offset into the expression, when the failure has one.
    pub position: Option<usize>,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub(crate) const fn at(position: usize, kind: SyntaxErrorKind) -> Self {
        Self {
            position: Some(position),
            kind,
        }
    }

    pub(crate) const fn unpositioned(kind: SyntaxErrorKind) -> Self {
        Self {
            position: None,
            kind,
        }
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(position) => write!(f, "Syntax error at position {}: {}", position, self.kind),
            None => write!(f, "Syntax error: {}", self.kind),
        }
    }
}

impl std::error::Error for SyntaxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateError {
    UnknownLiteralType {
        kind: String,
    },
    UnknownOperator {
        operator: String,
        position: usize,
    },
    ExpressionSyntax(SyntaxError),
    LiteralCharacterAlreadyInUse {
        character: char,
    },
    LiteralEndCharacterNotDefined {
        character: char,
    },
    MismatchedLiteralDelimiters {
        start: String,
        end: String,
    },
    MissingOperatorPrecedence {
        operator: String,
    },
    UnsupportedOperand {
        operator: String,
        left: String,
        right: Option<String>,
    },
    DivisionByZero {
        operator: String,
    },
    /// A sequence operation would build a value over `limit` items.
    ValueTooLarge {
        operator: String,
        limit: usize,
    },
    UnknownTag {
        tag: String,
        line: usize,
        column: usize,
    },
    UnknownTagConditionalExpression {
        tag: String,
    },
    UnclosedBlockTag {
        tag: String,
        line: usize,
        column: usize,
    },
    TooManyTagArguments {
        tag: String,
        expected: usize,
        found: usize,
    },
    MissingTagArguments {
        tag: String,
        expected: usize,
        found: usize,
    },
    TagArgument {
        tag: String,
        message: String,
    },
    TagAlreadyRegistered {
        tag: String,
    },
    RecursionLimitExceeded {
        limit: usize,
    },
    TemplateExists {
        template_name: String,
    },
    MissingTemplate {
        template_name: String,
    },
    Io {
        path: String,
        message: String,
    },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLiteralType { kind } => {
                write!(f, "Unknown literal type: {}", kind)
            }
            Self::UnknownOperator { operator, position } => {
                write!(f, "Unknown operator: {} at position {}", operator, position)
            }
            Self::ExpressionSyntax(syntax_error) => write!(f, "{}", syntax_error),
            Self::LiteralCharacterAlreadyInUse { character } => {
                write!(f, "Character \"{}\" is already in use", character)
            }
            Self::LiteralEndCharacterNotDefined { character } => {
                write!(f, "Literal started by \"{}\" needs an end character", character)
            }
            Self::MismatchedLiteralDelimiters { start, end } => {
                write!(
                    f,
                    "Literal start characters \"{}\" and end characters \"{}\" must pair up",
                    start, end
                )
            }
            Self::MissingOperatorPrecedence { operator } => {
                write!(f, "Missing operator precedence: {}", operator)
            }
            Self::UnsupportedOperand {
                operator,
                left,
                right: Some(right),
            } => {
                write!(
                    f,
                    "Unsupported operand types for {}: {} and {}",
                    operator, left, right
                )
            }
            Self::UnsupportedOperand {
                operator,
                left,
                right: None,
            } => {
                write!(f, "Unsupported operand type for {}: {}", operator, left)
            }
            Self::DivisionByZero { operator } => {
                write!(f, "Division by zero in {}", operator)
            }
            Self::ValueTooLarge { operator, limit } => {
                write!(f, "Result of {} exceeds the limit of {} items", operator, limit)
            }
            Self::UnknownTag { tag, line, column } => {
                write!(f, "Unknown tag {} at line {}, column {}", tag, line, column)
            }
            Self::UnknownTagConditionalExpression { tag } => {
                write!(f, "Unknown conditional tag {}", tag)
            }
            Self::UnclosedBlockTag { tag, line, column } => {
                write!(
                    f,
                    "Unclosed block \"{}\" opened at line {}, column {}",
                    tag, line, column
                )
            }
            Self::TooManyTagArguments {
                tag,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Too many arguments passed to {} tag. Expected {} arguments, got {}.",
                    tag, expected, found
                )
            }
            Self::MissingTagArguments {
                tag,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Missing arguments passed to {} tag. Expected {} arguments, got {}.",
                    tag, expected, found
                )
            }
            Self::TagArgument { tag, message } => {
                write!(f, "Invalid argument to {} tag: {}", tag, message)
            }
            Self::TagAlreadyRegistered { tag } => {
                write!(f, "Tag {} is already registered", tag)
            }
            Self::RecursionLimitExceeded { limit } => {
                write!(f, "Template recursion limit of {} exceeded", limit)
            }
            Self::TemplateExists { template_name } => {
                write!(f, "Template already exists: {}", template_name)
            }
            Self::MissingTemplate { template_name } => {
                write!(f, "Template not found: {}", template_name)
            }
            Self::Io { path, message } => {
                write!(f, "Failed to read {}: {}", path, message)
            }
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ExpressionSyntax(syntax_error) => Some(syntax_error),
            Self::UnknownLiteralType { .. }
            | Self::UnknownOperator { .. }
            | Self::LiteralCharacterAlreadyInUse { .. }
            | Self::LiteralEndCharacterNotDefined { .. }
            | Self::MismatchedLiteralDelimiters { .. }
            | Self::MissingOperatorPrecedence { .. }
            | Self::UnsupportedOperand { .. }
            | Self::DivisionByZero { .. }
            | Self::ValueTooLarge { .. }
            | Self::UnknownTag { .. }
            | Self::UnknownTagConditionalExpression { .. }
            | Self::UnclosedBlockTag { .. }
            | Self::TooManyTagArguments { .. }
            | Self::MissingTagArguments { .. }
            | Self::TagArgument { .. }
            | Self::TagAlreadyRegistered { .. }
            | Self::RecursionLimitExceeded { .. }
            | Self::TemplateExists { .. }
            | Self::MissingTemplate { .. }
            | Self::Io { .. } => None,
        }
    }
}

impl From<SyntaxError> for TemplateError {
    fn from(error: SyntaxError) -> Self {
        Self::ExpressionSyntax(error)
    }
}
