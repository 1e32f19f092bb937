use std::fmt;
use std::path::{Path, PathBuf};

/// Targets, the sources they are built from, and whether they are rebuilt
/// unconditionally. Order matters: `${targets-N}` / `${sources-N}` index
/// into declaration order, starting at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    targets: Vec<PathBuf>,
    sources: Vec<PathBuf>,
    update_always: bool,
}

impl Dependency {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn update_always(&self) -> bool {
        self.update_always
    }

    pub fn add_target(&mut self, target: PathBuf) {
        self.targets.push(target);
    }

    pub fn add_source(&mut self, source: PathBuf) {
        self.sources.push(source);
    }

    pub fn set_update_always(&mut self) {
        self.update_always = true;
    }

    /// The sole target, if there is exactly one.
    pub fn single_target(&self) -> Option<&Path> {
        single(&self.targets)
    }

    pub fn single_source(&self) -> Option<&Path> {
        single(&self.sources)
    }

    /// 1-based lookup.
    pub fn target_at(&self, index: usize) -> Option<&Path> {
        nth(&self.targets, index)
    }

    pub fn source_at(&self, index: usize) -> Option<&Path> {
        nth(&self.sources, index)
    }
}

fn single(paths: &[PathBuf]) -> Option<&Path> {
    match paths {
        [only] => Some(only.as_path()),
        _ => None,
    }
}

fn nth(paths: &[PathBuf], index: usize) -> Option<&Path> {
    index
        .checked_sub(1)
        .and_then(|i| paths.get(i))
        .map(PathBuf::as_path)
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        write!(f, "{} : {}", join(&self.targets), join(&self.sources))?;
        if self.update_always {
            write!(f, " !")?;
        }
        Ok(())
    }
}
