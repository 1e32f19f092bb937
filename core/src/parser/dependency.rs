use std::path::Path;

use crate::dependency::Dependency;
use crate::error::ScriptError;
use crate::path;

const UPDATE_ALWAYS: &str = "!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ParsingTargets,
    ParsingSources,
}

/// Reads the dependency block that follows the header marker.
///
/// Returns the dependency and the index of the line that ended the block: the
/// first blank line, or `lines.len()` when the input ends first. The command
/// block starts right after it.
pub fn parse_dependency<S: AsRef<str>>(
    lines: &[S],
    base_dir: &Path,
) -> Result<(Dependency, usize), ScriptError> {
    let mut dependency = Dependency::new();
    let mut state = State::ParsingTargets;

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref().trim();

        if let Some(rest) = line.strip_prefix(':') {
            if state == State::ParsingSources {
                return Err(ScriptError::MultipleSeparators);
            }
            state = State::ParsingSources;
            add_source(&mut dependency, rest.trim_start(), base_dir)?;
        } else if line.is_empty() {
            return Ok((dependency, index));
        } else {
            match state {
                State::ParsingTargets => dependency.add_target(path::resolve(base_dir, line)?),
                State::ParsingSources => add_source(&mut dependency, line, base_dir)?,
            }
        }
    }

    Ok((dependency, lines.len()))
}

fn add_source(
    dependency: &mut Dependency,
    token: &str,
    base_dir: &Path,
) -> Result<(), ScriptError> {
    if token.is_empty() {
        return Ok(());
    }
    if token == UPDATE_ALWAYS {
        dependency.set_update_always();
    } else {
        dependency.add_source(path::resolve(base_dir, token)?);
    }
    Ok(())
}
