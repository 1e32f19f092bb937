use std::path::{Path, PathBuf};

use crate::console::Console;

/// What every pipeline stage needs from the run that started it: where its
/// un-redirected output and its diagnostics go, and the directory relative
/// paths and child processes are anchored to.
#[derive(Clone)]
pub struct StageContext {
    console: Console,
    working_dir: PathBuf,
}

impl StageContext {
    pub fn new(console: Console, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            console,
            working_dir: working_dir.into(),
        }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
