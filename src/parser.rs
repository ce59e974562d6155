use crate::{
    ast::{is_identifier, is_identifier_char, Expression, Identifier, Token},
    error::{SyntaxError, SyntaxErrorKind, TemplateError, TemplateResult},
    literal::{LiteralRegistry, PendingLiteral},
    operator::Operator,
};

/// A piece of source text still being accumulated, with the character
/// position it started at.
struct Pending<T> {
    value: T,
    start: usize,
}

/// Turns expression source into tokens one character at a time.
///
/// At most one of `operator`, `identifier` and `literal` is in progress at
/// any point in the scan.
struct Tokenizer<'a> {
    input: &'a str,
    registry: &'a LiteralRegistry,
    /// Character position of the character being processed.
    pos: usize,
    expression: Expression,
    operator: Option<Pending<String>>,
    identifier: Option<Pending<String>>,
    literal: Option<Pending<PendingLiteral>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str, registry: &'a LiteralRegistry) -> Self {
        Tokenizer {
            input,
            registry,
            pos: 0,
            expression: Expression::default(),
            operator: None,
            identifier: None,
            literal: None,
        }
    }

    #[inline]
    fn make_error(&self, kind: SyntaxErrorKind) -> TemplateError {
        SyntaxError::at(self.pos, kind).into()
    }

    /// Gives errors raised by literals the position they were found at.
    #[inline]
    fn locate(&self, mut error: SyntaxError) -> TemplateError {
        error.position.get_or_insert(self.pos);
        error.into()
    }

    fn emit(&mut self, token: Token) {
        trace!("emitting token {}", token);
        self.expression.push(token);
    }

    fn emit_operator(&mut self, symbol: &str, start: usize) -> TemplateResult<()> {
        let operator = Operator::new(symbol).map_err(|_| TemplateError::UnknownOperator {
            operator: symbol.to_string(),
            position: start,
        })?;
        self.emit(Token::Operator(operator));
        Ok(())
    }

    fn emit_identifier(&mut self, path: &str, start: usize) -> TemplateResult<()> {
        let identifier = Identifier::from_path(path).map_err(|mut e| {
            e.position.get_or_insert(start);
            TemplateError::from(e)
        })?;
        self.emit(Token::Identifier(identifier));
        Ok(())
    }

    fn finish_literal(&mut self, literal: PendingLiteral) -> TemplateResult<()> {
        let literal = literal.finish(self.registry)?;
        self.emit(Token::Literal(literal));
        Ok(())
    }

    /// Resolves an operator candidate that `character` does not extend.
    ///
    /// Returns `Some(consumed)` when the candidate absorbed the character or
    /// handed it back to be reprocessed as part of an identifier, and `None`
    /// when the candidate was emitted and `character` still needs handling.
    fn resolve_operator(
        &mut self,
        candidate: Pending<String>,
        character: char,
    ) -> TemplateResult<Option<bool>> {
        let mut extended = candidate.value.clone();
        extended.push(character);

        let operator = Operator::new(&candidate.value).ok();
        let complete = operator.is_some();

        if operator.is_some_and(|op| op.is_word()) && is_identifier(&extended) {
            // `index`, `pix`, `notable`
            self.identifier = Some(Pending {
                value: extended,
                start: candidate.start,
            });
            Ok(Some(true))
        } else if complete {
            self.emit_operator(&candidate.value, candidate.start)?;
            Ok(None)
        } else if is_identifier(&extended) {
            self.identifier = Some(Pending {
                value: extended,
                start: candidate.start,
            });
            Ok(Some(true))
        } else if is_identifier(&candidate.value) {
            self.identifier = Some(candidate);
            Ok(Some(false))
        } else {
            Err(TemplateError::UnknownOperator {
                operator: candidate.value,
                position: candidate.start,
            })
        }
    }

    /// Processes one character. Returns whether it was consumed; a character
    /// that was not consumed must be offered again.
    fn step(&mut self, character: char) -> TemplateResult<bool> {
        if let Some(mut candidate) = self.operator.take() {
            let mut extended = candidate.value.clone();
            extended.push(character);

            if Operator::string_could_be_operator(&extended) {
                candidate.value = extended;
                self.operator = Some(candidate);
                return Ok(true);
            }

            if let Some(consumed) = self.resolve_operator(candidate, character)? {
                return Ok(consumed);
            }
        }

        let starts_literal = self.registry.lookup(character).copied();

        if let Some(def) = starts_literal {
            if self.identifier.is_some() {
                return Err(self.make_error(SyntaxErrorKind::UnexpectedLiteralCharacter {
                    character,
                }));
            }
            if self.literal.is_none() {
                self.literal = Some(Pending {
                    value: PendingLiteral::open(&def),
                    start: self.pos,
                });
                return Ok(true);
            }
        }

        if let Some(mut literal) = self.literal.take() {
            let step = if starts_literal.is_some() {
                literal.value.append_literal_match(character, self.registry)
            } else {
                literal.value.append_character(character, self.registry)
            }
            .map_err(|e| self.locate(e))?;

            if step.terminated {
                self.finish_literal(literal.value)?;
            } else {
                self.literal = Some(literal);
            }
            return Ok(step.consumed);
        }

        if let Some(mut identifier) = self.identifier.take() {
            let after_dot = identifier.value.ends_with('.');
            if character == '.' || is_identifier_char(character, after_dot) {
                identifier.value.push(character);
                self.identifier = Some(identifier);
                return Ok(true);
            }
            self.emit_identifier(&identifier.value, identifier.start)?;
        }

        if Operator::string_could_be_operator(&character.to_string()) {
            self.operator = Some(Pending {
                value: character.to_string(),
                start: self.pos,
            });
        } else if character.is_ascii_digit() {
            self.literal = Some(Pending {
                value: PendingLiteral::numeric(character),
                start: self.pos,
            });
        } else if is_identifier_char(character, true) {
            self.identifier = Some(Pending {
                value: character.to_string(),
                start: self.pos,
            });
        } else if !character.is_whitespace() {
            return Err(self.make_error(SyntaxErrorKind::UnexpectedCharacter { character }));
        }

        Ok(true)
    }

    /// Flushes whatever is still in progress once the input runs out.
    fn flush(&mut self) -> TemplateResult<()> {
        if let Some(candidate) = self.operator.take() {
            if Operator::is_valid_operator(&candidate.value) {
                self.emit_operator(&candidate.value, candidate.start)?;
            } else if is_identifier(&candidate.value) {
                self.emit_identifier(&candidate.value, candidate.start)?;
            } else {
                return Err(TemplateError::UnknownOperator {
                    operator: candidate.value,
                    position: candidate.start,
                });
            }
        }

        if let Some(identifier) = self.identifier.take() {
            self.emit_identifier(&identifier.value, identifier.start)?;
        }

        if let Some(literal) = self.literal.take() {
            if literal.value.needs_end_character() {
                return Err(SyntaxError::at(
                    literal.start,
                    SyntaxErrorKind::UnexpectedEndOfExpression {
                        expression: literal.value.source(),
                    },
                )
                .into());
            }
            self.finish_literal(literal.value)?;
        }

        Ok(())
    }

    fn run(mut self) -> TemplateResult<Expression> {
        for (pos, character) in self.input.chars().enumerate() {
            self.pos = pos;
            while !self.step(character)? {}
        }
        self.flush()?;
        Ok(self.expression)
    }
}

/// Tokenizes `text` using the literals in `registry`.
///
/// # Errors
/// - `UnknownOperator` for symbols that are not operators, e.g. `!` or `=`.
/// - `ExpressionSyntax` for characters that cannot start a token, literals
///   left open at the end of the input and malformed literals.
pub(crate) fn tokenize_with(text: &str, registry: &LiteralRegistry) -> TemplateResult<Expression> {
    Tokenizer::new(text, registry).run()
}
