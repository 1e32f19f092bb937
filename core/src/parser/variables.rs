use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tempfile::{TempDir, TempPath};

use crate::dependency::Dependency;
use crate::error::ScriptError;
use crate::logger::Logger;
use crate::path;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());
static PLACEHOLDER_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<symbol>[a-z\-]+)(?:-(?P<index>\d+))?(?P<options>(?::[^:}]+)*)$").unwrap()
});

const TEMP_PREFIX: &str = "bmake-";
const PATH_DELIMITERS: [char; 2] = ['/', '\\'];

/// Scratch files and directories created for `${temp-file-N}` and
/// `${temp-dir-N}`, keyed by `N`. Everything here is deleted by
/// [`TempResources::cleanup`] (or, failing that, when dropped).
#[derive(Debug, Default)]
pub struct TempResources {
    files: BTreeMap<usize, TempPath>,
    directories: BTreeMap<usize, TempDir>,
}

impl TempResources {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    #[cfg(test)]
    pub fn file(&self, index: usize) -> Option<&Path> {
        self.files.get(&index).map(|p| &**p)
    }

    #[cfg(test)]
    pub fn directory(&self, index: usize) -> Option<&Path> {
        self.directories.get(&index).map(TempDir::path)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    pub fn cleanup(self, logger: &Logger) {
        for (_, file) in self.files {
            let display = file.display().to_string();
            match file.close() {
                Ok(()) => logger.info(&format!("Deleted temporary file \"{}\"", display)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => logger.warning(&format!(
                    "Failed to delete temporary file \"{}\": {}",
                    display, err
                )),
            }
        }

        for (_, directory) in self.directories {
            let display = directory.path().display().to_string();
            match directory.close() {
                Ok(()) => logger.info(&format!("Deleted temporary directory \"{}\"", display)),
                Err(err) => logger.warning(&format!(
                    "Failed to delete temporary directory \"{}\": {}",
                    display, err
                )),
            }
        }
    }

    fn file_for(
        &mut self,
        index: usize,
        suffix: Option<&str>,
        logger: &Logger,
    ) -> std::io::Result<(&Path, bool)> {
        let created = !self.files.contains_key(&index);
        if created {
            let mut builder = tempfile::Builder::new();
            builder.prefix(TEMP_PREFIX);
            if let Some(suffix) = suffix {
                builder.suffix(suffix);
            }
            let file = builder.tempfile()?.into_temp_path();
            logger.info(&format!("Created temporary file \"{}\"", file.display()));
            self.files.insert(index, file);
        }
        let path: &Path = &self.files[&index];
        Ok((path, created))
    }

    fn directory_for(&mut self, index: usize, logger: &Logger) -> std::io::Result<&Path> {
        if !self.directories.contains_key(&index) {
            let directory = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
            logger.info(&format!(
                "Created temporary directory \"{}\"",
                directory.path().display()
            ));
            self.directories.insert(index, directory);
        }
        Ok(self.directories[&index].path())
    }
}

struct Placeholder<'t> {
    text: &'t str,
    symbol: &'t str,
    index: Option<usize>,
    options: Vec<&'t str>,
}

impl<'t> Placeholder<'t> {
    fn parse(caps: &Captures<'t>) -> Result<Self, ScriptError> {
        let text = caps.get(0).map_or("", |m| m.as_str());
        let invalid = || ScriptError::InvalidVariable(text.to_string());

        let body = caps.get(1).ok_or_else(invalid)?.as_str();
        let spec = PLACEHOLDER_SPEC.captures(body).ok_or_else(invalid)?;

        let symbol = spec.name("symbol").ok_or_else(invalid)?.as_str();
        let index = match spec.name("index") {
            Some(m) => Some(m.as_str().parse::<usize>().map_err(|_| invalid())?),
            None => None,
        };
        let options = spec
            .name("options")
            .map(|m| m.as_str().split(':').skip(1).collect())
            .unwrap_or_default();

        Ok(Self {
            text,
            symbol,
            index,
            options,
        })
    }

    fn invalid(&self) -> ScriptError {
        ScriptError::InvalidVariable(self.text.to_string())
    }

    fn allocation_failed(&self, source: std::io::Error) -> ScriptError {
        ScriptError::TempAllocation {
            placeholder: self.text.to_string(),
            source,
        }
    }

    fn no_index(&self) -> Result<(), ScriptError> {
        match self.index {
            None => Ok(()),
            Some(_) => Err(self.invalid()),
        }
    }

    /// The required index; 0 never names anything.
    fn required_index(&self) -> Result<usize, ScriptError> {
        match self.index {
            Some(index) if index > 0 => Ok(index),
            _ => Err(self.invalid()),
        }
    }

    fn no_options(&self) -> Result<(), ScriptError> {
        if self.options.is_empty() {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn at_most_one_option(&self) -> Result<Option<&'t str>, ScriptError> {
        match self.options.as_slice() {
            [] => Ok(None),
            [option] => Ok(Some(*option)),
            _ => Err(self.invalid()),
        }
    }
}

fn is_valid_suffix(suffix: &str) -> bool {
    suffix.len() >= 2
        && suffix.starts_with('.')
        && !suffix[1..].contains('.')
        && !suffix.contains(PATH_DELIMITERS)
}

fn is_valid_entry_name(name: &str) -> bool {
    !name.contains(PATH_DELIMITERS) && name != "." && name != ".."
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Rewrites `${...}` placeholders into shell-quoted paths.
pub struct VariableExpander<'a> {
    dependency: &'a Dependency,
    temps: &'a mut TempResources,
    base_dir: &'a Path,
    logger: &'a Logger,
}

impl<'a> VariableExpander<'a> {
    pub fn new(
        dependency: &'a Dependency,
        temps: &'a mut TempResources,
        base_dir: &'a Path,
        logger: &'a Logger,
    ) -> Self {
        Self {
            dependency,
            temps,
            base_dir,
            logger,
        }
    }

    pub fn expand(&mut self, text: &str) -> Result<String, ScriptError> {
        let mut expanded = String::with_capacity(text.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            expanded.push_str(&text[last..whole.start()]);

            let placeholder = Placeholder::parse(&caps)?;
            let resolved = self.resolve(&placeholder)?;
            let display = path::shorten(&resolved, self.base_dir);
            let quoted = shlex::try_quote(&display).map_err(|_| placeholder.invalid())?;
            expanded.push_str(&quoted);

            last = whole.end();
        }

        expanded.push_str(&text[last..]);
        Ok(expanded)
    }

    fn resolve(&mut self, placeholder: &Placeholder<'_>) -> Result<PathBuf, ScriptError> {
        match placeholder.symbol {
            "target" => {
                placeholder.no_index()?;
                placeholder.no_options()?;
                self.dependency
                    .single_target()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| placeholder.invalid())
            }
            "targets" => {
                let index = placeholder.required_index()?;
                placeholder.no_options()?;
                self.dependency
                    .target_at(index)
                    .map(Path::to_path_buf)
                    .ok_or_else(|| placeholder.invalid())
            }
            "source" => {
                placeholder.no_index()?;
                placeholder.no_options()?;
                self.dependency
                    .single_source()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| placeholder.invalid())
            }
            "sources" => {
                let index = placeholder.required_index()?;
                placeholder.no_options()?;
                self.dependency
                    .source_at(index)
                    .map(Path::to_path_buf)
                    .ok_or_else(|| placeholder.invalid())
            }
            "temp-file" => {
                let index = placeholder.required_index()?;
                let suffix = placeholder.at_most_one_option()?;
                if suffix.is_some_and(|s| !is_valid_suffix(s)) {
                    return Err(placeholder.invalid());
                }

                let (file, created) = self
                    .temps
                    .file_for(index, suffix, self.logger)
                    .map_err(|source| placeholder.allocation_failed(source))?;
                if !created && suffix.is_some_and(|s| extension_of(file) != s) {
                    return Err(placeholder.invalid());
                }
                Ok(file.to_path_buf())
            }
            "temp-dir" => {
                let index = placeholder.required_index()?;
                let entry = placeholder.at_most_one_option()?;
                if entry.is_some_and(|name| !is_valid_entry_name(name)) {
                    return Err(placeholder.invalid());
                }

                let directory = self
                    .temps
                    .directory_for(index, self.logger)
                    .map_err(|source| placeholder.allocation_failed(source))?;
                Ok(match entry {
                    Some(name) => directory.join(name),
                    None => directory.to_path_buf(),
                })
            }
            _ => Err(placeholder.invalid()),
        }
    }
}
