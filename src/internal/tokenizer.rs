//! Command tokenizer: free-form command text → argument vector.
//!
//! The vector always starts with the program name exactly once, whether or not
//! the user typed it. A leading token that textually equals the program name
//! is treated as redundant and dropped before the program name is prepended.
//! That includes a positional argument which happens to equal the program
//! name: `azure` alone yields `[azure]`, never `[azure, azure]`.

/// Default program name expected by the execution unit.
pub const PROGRAM_NAME: &str = "azure";

/// An argument vector whose first element is the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    args: Vec<String>,
}

impl ParsedCommand {
    pub fn program(&self) -> &str {
        &self.args[0]
    }

    /// Everything after the program name.
    pub fn arguments(&self) -> &[String] {
        &self.args[1..]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    pub fn into_vec(self) -> Vec<String> {
        self.args
    }
}

/// Splits command text for a fixed program name.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    program: String,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(PROGRAM_NAME)
    }
}

impl Tokenizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Tokenize `raw`. Never fails.
    ///
    /// Unquoted spaces separate tokens. A `'` or `"` opens a quoted span that
    /// only the same character closes, so the other quote character can appear
    /// literally inside it. Quote characters are not kept. Tokens are trimmed
    /// and empty tokens dropped. An unterminated quote keeps whatever was
    /// collected as the last token.
    pub fn parse(&self, raw: &str) -> ParsedCommand {
        let mut args = split(raw);
        if args.first().is_some_and(|first| first == &self.program) {
            args.remove(0);
        }
        args.insert(0, self.program.clone());
        ParsedCommand { args }
    }
}

fn split(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match (quote, ch) {
            (None, '"' | '\'') => quote = Some(ch),
            (Some(open), _) if ch == open => quote = None,
            (None, ' ') => {
                let token = current.trim();
                if !token.is_empty() {
                    args.push(token.to_string());
                    current.clear();
                }
            }
            _ => current.push(ch),
        }
    }

    let token = current.trim();
    if !token.is_empty() {
        args.push(token.to_string());
    }
    args
}
