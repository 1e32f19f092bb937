use std::path::{Path, PathBuf};

use crate::command::{CommandSpec, StageInput, StageOutput};
use crate::error::ScriptError;
use crate::parser::variables::VariableExpander;
use crate::path;
use crate::pipe::{self, PipeReader};

/// One logical line of the command block after comment removal and operator
/// splitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Blank,
    Pipe,
    Text(String),
}

/// Splits a raw command-block line into fragments.
///
/// A line whose trimmed text starts with `#` is dropped. Unquoted `|` becomes
/// a [`Fragment::Pipe`], and unquoted `<`, `>` and `>>` start a new text
/// fragment, so `sort < in > out` yields the same fragments as writing the
/// command and each redirection on lines of their own. Quoted text and
/// `${...}` placeholders are never split.
///
/// Only standard input and output can be redirected, so descriptor forms
/// such as `2> err.txt` or `>&2` are rejected rather than read as an argument
/// followed by a redirection.
pub fn split_line(line: &str) -> Result<Vec<Fragment>, ScriptError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(vec![Fragment::Blank]);
    }
    if line.starts_with('#') {
        return Ok(Vec::new());
    }

    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut in_placeholder = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }

        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            } else if c == '\\' && q == '"' {
                escaped = true;
            }
            continue;
        }

        if in_placeholder {
            current.push(c);
            if c == '}' {
                in_placeholder = false;
            }
            continue;
        }

        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '\'' | '"' => {
                current.push(c);
                quote = Some(c);
            }
            '$' if chars.peek() == Some(&'{') => {
                current.push(c);
                in_placeholder = true;
            }
            '|' => {
                push_text(&mut fragments, &mut current);
                fragments.push(Fragment::Pipe);
            }
            '<' | '>' if ends_with_descriptor(&current) || chars.peek() == Some(&'&') => {
                return Err(ScriptError::MalformedCommandLine(line.to_string()));
            }
            '<' => {
                push_text(&mut fragments, &mut current);
                current.push('<');
            }
            '>' => {
                push_text(&mut fragments, &mut current);
                current.push('>');
                if chars.peek() == Some(&'>') {
                    chars.next();
                    current.push('>');
                }
            }
            _ => current.push(c),
        }
    }

    push_text(&mut fragments, &mut current);
    Ok(fragments)
}

/// True when the text ends in a word made only of digits, like the `2` of
/// `cmd 2>`.
fn ends_with_descriptor(text: &str) -> bool {
    let word = text.rsplit(char::is_whitespace).next().unwrap_or_default();
    !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit())
}

fn push_text(fragments: &mut Vec<Fragment>, current: &mut String) {
    let text = current.trim();
    if !text.is_empty() {
        fragments.push(Fragment::Text(text.to_string()));
    }
    current.clear();
}

/// Turns the command block into pipeline stages.
///
/// Text fragments accumulate into the pending command until a blank line
/// (end of chain) or a pipe (stage piped into the next) flushes them.
/// Redirections attach to the pending command and must follow its text.
pub struct PipelineBuilder<'a> {
    expander: VariableExpander<'a>,
    base_dir: &'a Path,
    fragments: Vec<String>,
    stdin_redirect: Option<PathBuf>,
    stdout_redirect: Option<(PathBuf, bool)>,
    pending_pipe: Option<PipeReader>,
    specs: Vec<CommandSpec>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(expander: VariableExpander<'a>, base_dir: &'a Path) -> Self {
        Self {
            expander,
            base_dir,
            fragments: Vec::new(),
            stdin_redirect: None,
            stdout_redirect: None,
            pending_pipe: None,
            specs: Vec::new(),
        }
    }

    pub fn build<S: AsRef<str>>(mut self, lines: &[S]) -> Result<Vec<CommandSpec>, ScriptError> {
        for line in lines {
            for fragment in split_line(line.as_ref())? {
                match fragment {
                    Fragment::Blank => self.flush(false)?,
                    Fragment::Pipe => self.flush(true)?,
                    Fragment::Text(text) => {
                        let expanded = self.expander.expand(&text)?;
                        self.classify(expanded.trim())?;
                    }
                }
            }
        }

        self.flush(false)?;
        Ok(self.specs)
    }

    fn classify(&mut self, line: &str) -> Result<(), ScriptError> {
        if line.is_empty() {
            return self.flush(false);
        }

        if let Some(rest) = line.strip_prefix('<') {
            if self.stdin_redirect.is_some() {
                return Err(ScriptError::DuplicateStdinRedirect);
            }
            if self.pending_pipe.is_some() {
                return Err(ScriptError::PipeRedirectConflict);
            }
            let source = self
                .redirect_operand(rest)?
                .ok_or(ScriptError::MissingRedirectSource)?;
            self.stdin_redirect = Some(source);
        } else if let Some(rest) = line.strip_prefix(">>") {
            self.set_stdout_redirect(rest, true)?;
        } else if let Some(rest) = line.strip_prefix('>') {
            self.set_stdout_redirect(rest, false)?;
        } else if line.starts_with('|') {
            self.flush(true)?;
        } else {
            if self.stdin_redirect.is_some() || self.stdout_redirect.is_some() {
                return Err(ScriptError::CommandAfterRedirect(line.to_string()));
            }
            self.fragments.push(line.to_string());
        }

        Ok(())
    }

    fn set_stdout_redirect(&mut self, rest: &str, append: bool) -> Result<(), ScriptError> {
        if self.stdout_redirect.is_some() {
            return Err(ScriptError::DuplicateStdoutRedirect);
        }
        let destination = self
            .redirect_operand(rest)?
            .ok_or(ScriptError::MissingRedirectDestination)?;
        self.stdout_redirect = Some((destination, append));
        Ok(())
    }

    /// The single shell word after a redirection operator, as a path.
    fn redirect_operand(&self, rest: &str) -> Result<Option<PathBuf>, ScriptError> {
        let rest = rest.trim();
        let words = shlex::split(rest)
            .ok_or_else(|| ScriptError::MalformedCommandLine(rest.to_string()))?;

        match words.as_slice() {
            [] => Ok(None),
            [word] => Ok(Some(path::resolve(self.base_dir, word)?)),
            [_, trailing @ ..] => Err(ScriptError::CommandAfterRedirect(trailing.join(" "))),
        }
    }

    fn flush(&mut self, piped_to_next: bool) -> Result<(), ScriptError> {
        if self.fragments.is_empty() {
            if self.stdin_redirect.is_some() || self.stdout_redirect.is_some() {
                return Err(ScriptError::NoCommandBeforeRedirect);
            }
            if self.pending_pipe.is_some() || piped_to_next {
                return Err(ScriptError::MissingPipeTarget);
            }
            return Ok(());
        }

        if self.stdin_redirect.is_some() && self.pending_pipe.is_some() {
            return Err(ScriptError::PipeRedirectConflict);
        }
        if self.stdout_redirect.is_some() && piped_to_next {
            return Err(ScriptError::PipeRedirectConflict);
        }

        let input = match (self.pending_pipe.take(), self.stdin_redirect.take()) {
            (Some(reader), _) => StageInput::Pipe(reader),
            (None, Some(path)) => StageInput::File(path),
            (None, None) => StageInput::Inherit,
        };

        let output = if piped_to_next {
            let (writer, reader) = pipe::channel();
            self.pending_pipe = Some(reader);
            StageOutput::Pipe(writer)
        } else {
            match self.stdout_redirect.take() {
                Some((path, append)) => StageOutput::File { path, append },
                None => StageOutput::Inherit,
            }
        };

        let command_line = self.fragments.join(" ");
        self.fragments.clear();
        self.stdin_redirect = None;
        self.stdout_redirect = None;

        self.specs.push(CommandSpec::parse(command_line, input, output)?);
        Ok(())
    }
}
