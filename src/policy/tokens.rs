use std::borrow::Cow;

use crate::error::TamperError;

/// Split a command into tokens on whitespace.
///
/// Double quotes group whitespace into one token and are not kept. An
/// unterminated quote runs to the end of the input.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for ch in command.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Quote a token if it would not survive [`tokenize`] on its own.
pub fn quote(token: &str) -> Cow<'_, str> {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        Cow::Owned(format!("\"{token}\""))
    } else {
        Cow::Borrowed(token)
    }
}

/// Cursor over the tokens of one command.
///
/// Builders consume a prefix and leave the rest for the caller, so a parent
/// builder can keep parsing after a nested one returns.
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    items: Vec<String>,
    position: usize,
}

impl Tokens {
    pub fn new(items: Vec<String>) -> Self {
        Self { items, position: 0 }
    }

    pub fn parse(command: &str) -> Self {
        Self::new(tokenize(command))
    }

    pub fn peek(&self) -> Option<&str> {
        self.items.get(self.position).map(String::as_str)
    }

    pub fn next_token(&mut self) -> Option<String> {
        let token = self.items.get(self.position).cloned()?;
        self.position += 1;
        Some(token)
    }

    /// Consume the next token or report it as a missing argument of `keyword`.
    pub fn expect(&mut self, keyword: &str, expected: &'static str) -> Result<String, TamperError> {
        self.next_token()
            .ok_or_else(|| TamperError::missing(keyword, expected))
    }

    /// Consume the next token if it equals `word`.
    pub fn accept(&mut self, word: &str) -> bool {
        if self.peek() == Some(word) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn rewind(&mut self, position: usize) {
        self.position = position.min(self.items.len());
    }

    pub fn remaining(&self) -> &[String] {
        &self.items[self.position..]
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.items.len()
    }

    /// Fail with `TooManyArguments` if anything is left.
    pub fn finish(&self, keyword: &str) -> Result<(), TamperError> {
        match self.peek() {
            None => Ok(()),
            Some(extra) => Err(TamperError::TooManyArguments {
                keyword: keyword.to_string(),
                extra: extra.to_string(),
            }),
        }
    }
}
