use crate::lexer::{self, LexingError, Token};
use crate::pipeline::Pipeline;
use std::path::PathBuf;

/// Errors that can occur while turning tokens into a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParsingError {
    /// The line could not be tokenized.
    #[error(transparent)]
    Lexing(#[from] LexingError),
    /// A pipe with no command on one of its sides (`| a`, `a |`, `a || b`).
    #[error("missing command around '|'")]
    EmptyCommand,
    /// `<` or `>` not followed by a word.
    #[error("missing file name after '{0}'")]
    MissingRedirectTarget(char),
    /// The same stream redirected twice.
    #[error("'{0}' given more than once")]
    DuplicateRedirect(char),
    /// Encountered a token that was not expected at the current position.
    #[error("unexpected token {0:?}")]
    UnexpectedToken(Token),
}

struct PipelineBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl PipelineBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        PipelineBuilder { tokens, pos: 0 }
    }

    /// line := command redirect* ('|' command redirect*)* '&'?
    ///
    /// `<` is only accepted on the first command and `>` only on the last.
    fn build(mut self) -> Result<Pipeline, ParsingError> {
        let mut pipeline = Pipeline::new(self.parse_command()?);
        self.parse_redirects(&mut pipeline, true)?;

        while let Some(Token::Pipe) = self.peek() {
            if pipeline.stdout_path.is_some() {
                return Err(ParsingError::UnexpectedToken(Token::Pipe));
            }
            self.consume();
            // each later stage becomes the new head of the chain
            pipeline.push_typed(self.parse_command()?);
            self.parse_redirects(&mut pipeline, false)?;
        }

        if let Some(Token::Background) = self.peek() {
            self.consume();
            pipeline.background = true;
        }

        // Ensure we consumed all tokens
        if let Some(token) = self.consume() {
            return Err(ParsingError::UnexpectedToken(token));
        }

        Ok(pipeline)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// command := word+
    fn parse_command(&mut self) -> Result<Vec<String>, ParsingError> {
        let mut argv = Vec::new();
        while let Some(Token::Word(word)) = self.peek() {
            argv.push(word.clone());
            self.consume();
        }
        if argv.is_empty() {
            return Err(ParsingError::EmptyCommand);
        }
        Ok(argv)
    }

    /// redirect := ('<' | '>') word
    fn parse_redirects(
        &mut self,
        pipeline: &mut Pipeline,
        first_command: bool,
    ) -> Result<(), ParsingError> {
        loop {
            let (symbol, slot) = match self.peek() {
                Some(Token::RedirectIn) if !first_command => {
                    return Err(ParsingError::UnexpectedToken(Token::RedirectIn));
                }
                Some(Token::RedirectIn) => ('<', &mut pipeline.stdin_path),
                Some(Token::RedirectOut) => ('>', &mut pipeline.stdout_path),
                _ => return Ok(()),
            };
            self.pos += 1;

            let target = match self.tokens.get(self.pos) {
                Some(Token::Word(word)) if !word.is_empty() => PathBuf::from(word),
                _ => return Err(ParsingError::MissingRedirectTarget(symbol)),
            };
            self.pos += 1;

            if slot.replace(target).is_some() {
                return Err(ParsingError::DuplicateRedirect(symbol));
            }
        }
    }
}

/// Build a pipeline from a token stream.
///
/// The resulting chain is ordered from the last command typed to the first one.
pub fn construct_pipeline(tokens: Vec<Token>) -> Result<Pipeline, ParsingError> {
    PipelineBuilder::from(tokens).build()
}

/// Tokenize and parse one input line. A blank line yields `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Pipeline>, ParsingError> {
    let tokens = lexer::split_into_tokens(line)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    construct_pipeline(tokens).map(Some)
}
