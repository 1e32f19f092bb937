use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::console::Console;
use crate::dependency::Dependency;
use crate::error::ScriptError;
use crate::logger::Logger;
use crate::parser::{find_header_marker, parse_dependency, PipelineBuilder, TempResources, VariableExpander};
use crate::path;
use crate::stage_context::StageContext;
use crate::stage_runner::StageRunner;
use crate::staleness;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    UpToDate,
    Rebuilt,
}

/// Drives one build script: parse, decide, run, clean up.
pub struct Builder {
    script: PathBuf,
    base_dir: PathBuf,
    console: Console,
    logger: Logger,
}

impl Builder {
    pub fn new(script: &Path, console: Console, logger: Logger) -> anyhow::Result<Self> {
        let script = std::fs::canonicalize(script).with_context(|| {
            format!("The specified script file does not exist: \"{}\"", script.display())
        })?;
        let base_dir = script
            .parent()
            .map(Path::to_path_buf)
            .with_context(|| format!("Invalid script path: \"{}\"", script.display()))?;

        Ok(Self {
            script,
            base_dir,
            console,
            logger,
        })
    }

    pub async fn run(&self) -> anyhow::Result<BuildOutcome> {
        let content = tokio::fs::read_to_string(&self.script)
            .await
            .with_context(|| format!("Failed to read script: \"{}\"", self.script.display()))?;
        let lines: Vec<&str> = content.lines().collect();

        let header = find_header_marker(&lines)
            .ok_or_else(|| ScriptError::HeaderNotFound(self.script.clone()))?;
        let body = &lines[header + 1..];

        let (dependency, end) = parse_dependency(body, &self.base_dir)?;
        if dependency.targets().is_empty() {
            return Err(ScriptError::NoTargets(self.script.clone()).into());
        }

        if self.logger.is_verbose() {
            self.log_files(&dependency)?;
        }

        let staleness = staleness::evaluate(&dependency, &self.script)?;
        self.logger.info(&staleness.reason());
        if !staleness.needs_rebuild() {
            self.logger
                .info("The commands to update the targets are not executed");
            return Ok(BuildOutcome::UpToDate);
        }

        let commands = body.get(end + 1..).unwrap_or_default();
        let mut temps = TempResources::new();
        let result = self.execute(&dependency, &mut temps, commands).await;

        if result.is_err() {
            self.delete_targets(&dependency);
        }
        temps.cleanup(&self.logger);

        result.map(|()| BuildOutcome::Rebuilt)
    }

    async fn execute(
        &self,
        dependency: &Dependency,
        temps: &mut TempResources,
        commands: &[&str],
    ) -> anyhow::Result<()> {
        let specs = {
            let expander = VariableExpander::new(dependency, temps, &self.base_dir, &self.logger);
            PipelineBuilder::new(expander, &self.base_dir).build(commands)?
        };

        let context = StageContext::new(self.console.clone(), &self.base_dir);
        StageRunner::new(context, self.logger.clone())
            .run(specs)
            .await
    }

    fn log_files(&self, dependency: &Dependency) -> anyhow::Result<()> {
        self.logger
            .info(&format!("script: {}", path::describe_file(&self.script)?));
        self.log_group("target", dependency.targets())?;
        self.log_group("source", dependency.sources())
    }

    fn log_group(&self, label: &str, files: &[PathBuf]) -> anyhow::Result<()> {
        if let [file] = files {
            self.logger
                .info(&format!("{}: {}", label, path::describe_file(file)?));
            return Ok(());
        }
        for (index, file) in files.iter().enumerate() {
            self.logger.info(&format!(
                "{}s[{}]: {}",
                label,
                index + 1,
                path::describe_file(file)?
            ));
        }
        Ok(())
    }

    /// A failed build must not leave targets that look up to date.
    fn delete_targets(&self, dependency: &Dependency) {
        for target in dependency.targets() {
            match path::remove_file_quietly(target) {
                Ok(()) => self
                    .logger
                    .info(&format!("Deleted target \"{}\"", target.display())),
                Err(err) => self.logger.warning(&format!(
                    "Failed to delete target \"{}\": {}",
                    target.display(),
                    err
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Capture;
    use crate::error::BuildError;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    struct Project {
        dir: tempfile::TempDir,
        out: Capture,
        log: Capture,
    }

    impl Project {
        fn new() -> Self {
            Self {
                dir: tempfile::TempDir::new().unwrap(),
                out: Capture::new(),
                log: Capture::new(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn write(&self, name: &str, content: &str, seconds: u64) -> PathBuf {
            let path = self.path(name);
            std::fs::write(&path, content).unwrap();
            set_time(&path, seconds);
            path
        }

        fn script(&self, content: &str, seconds: u64) -> PathBuf {
            self.write("build.bmake", content, seconds)
        }

        fn builder(&self, script: &Path) -> Builder {
            let console = Console::from_writers(Box::new(self.out.clone()), Box::new(self.log.clone()));
            let logger = Logger::new(console.clone(), true);
            Builder::new(script, console, logger).unwrap()
        }

        async fn run(&self, script: &Path) -> anyhow::Result<BuildOutcome> {
            self.builder(script).run().await
        }

        /// Paths of the `bmake-` scratch entries mentioned in the log.
        fn logged_temps(&self) -> Vec<PathBuf> {
            self.log
                .contents()
                .lines()
                .filter_map(|line| line.split("Created temporary ").nth(1))
                .filter_map(|rest| rest.split('"').nth(1))
                .map(PathBuf::from)
                .collect()
        }
    }

    fn set_time(path: &Path, seconds: u64) {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + seconds);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[tokio::test]
    async fn test_source_piped_into_echo_writes_target() {
        let project = Project::new();
        project.write("in.txt", "ignored by echo\n", 20);
        let script = project.script(
            "#!/bin/sh\n# !bmake\nout.txt\n:in.txt\n\ncat ${source} | echo done > ${target}\n",
            10,
        );

        let outcome = project.run(&script).await.unwrap();

        assert_eq!(outcome, BuildOutcome::Rebuilt);
        assert_eq!(std::fs::read_to_string(project.path("out.txt")).unwrap(), "done\n");
        let log = project.log.contents();
        assert!(log.contains("Execute command:"));
        assert!(log.contains("| echo done > "));
    }

    #[tokio::test]
    async fn test_fresh_target_skips_commands() {
        let project = Project::new();
        project.write("in.txt", "input\n", 10);
        project.write("out.txt", "previous\n", 30);
        let script = project.script(
            "# !bmake\nout.txt\n:in.txt\n\necho regenerated > ${target}\necho ${temp-file-1}\n",
            10,
        );

        let outcome = project.run(&script).await.unwrap();

        assert_eq!(outcome, BuildOutcome::UpToDate);
        assert_eq!(std::fs::read_to_string(project.path("out.txt")).unwrap(), "previous\n");
        assert!(project.logged_temps().is_empty());
        assert!(!project.log.contents().contains("Execute command:"));
    }

    #[tokio::test]
    async fn test_update_always_runs_fresh_target() {
        let project = Project::new();
        project.write("in.txt", "input\n", 10);
        project.write("out.txt", "previous\n", 30);
        let script = project.script("# !bmake\nout.txt\n:in.txt\n!\n\necho again > ${target}\n", 10);

        project.run(&script).await.unwrap();
        assert_eq!(std::fs::read_to_string(project.path("out.txt")).unwrap(), "again\n");
    }

    #[tokio::test]
    async fn test_partially_missing_targets_rebuild() {
        let project = Project::new();
        project.write("in.txt", "input\n", 10);
        project.write("a.out", "fresh\n", 30);
        let script = project.script(
            "# !bmake\na.out\nb.out\n:in.txt\n\necho a > ${targets-1}\necho b > ${targets-2}\n",
            10,
        );

        let outcome = project.run(&script).await.unwrap();

        assert_eq!(outcome, BuildOutcome::Rebuilt);
        assert_eq!(std::fs::read_to_string(project.path("a.out")).unwrap(), "a\n");
        assert_eq!(std::fs::read_to_string(project.path("b.out")).unwrap(), "b\n");
    }

    #[tokio::test]
    async fn test_temp_file_shared_between_chains_and_removed() {
        let project = Project::new();
        project.write("in.txt", "línea ✓\n", 20);
        let script = project.script(
            "# !bmake\nout.txt\n:in.txt\n\ncat ${source} > ${temp-file-1:.txt}\n\ncat < ${temp-file-1} > ${target}\n",
            10,
        );

        project.run(&script).await.unwrap();

        assert_eq!(std::fs::read_to_string(project.path("out.txt")).unwrap(), "línea ✓\n");
        let temps = project.logged_temps();
        assert_eq!(temps.len(), 1);
        assert!(!temps[0].exists());
    }

    #[tokio::test]
    async fn test_two_separators_fail_before_running() {
        let project = Project::new();
        project.write("in.txt", "input\n", 20);
        let script = project.script("# !bmake\nout.txt\n:in.txt\n:other.txt\n\necho ran > ${target}\n", 10);

        let err = project.run(&script).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ScriptError>(),
            Some(ScriptError::MultipleSeparators)
        ));
        assert!(!project.path("out.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_header_and_targets() {
        let project = Project::new();
        let no_header = project.script("out.txt\n:in.txt\n", 10);
        assert!(matches!(
            project.run(&no_header).await.unwrap_err().downcast_ref::<ScriptError>(),
            Some(ScriptError::HeaderNotFound(_))
        ));

        let no_targets = project.script("# !bmake\n:in.txt\n", 10);
        assert!(matches!(
            project.run(&no_targets).await.unwrap_err().downcast_ref::<ScriptError>(),
            Some(ScriptError::NoTargets(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let project = Project::new();
        let script = project.script("# !bmake\nout.txt\n:absent.txt\n!\n\necho ran > ${target}\n", 10);

        let err = project.run(&script).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingSource(_))
        ));
        assert!(!project.path("out.txt").exists());
    }

    #[tokio::test]
    async fn test_command_parse_error_deletes_targets() {
        let project = Project::new();
        project.write("in.txt", "input\n", 20);
        project.write("out.txt", "stale\n", 10);
        let script = project.script("# !bmake\nout.txt\n:in.txt\n\necho ${sources-2}\n", 10);

        let err = project.run(&script).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScriptError>(),
            Some(ScriptError::InvalidVariable(_))
        ));
        assert!(!project.path("out.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_removes_targets_and_temps() {
        let project = Project::new();
        project.write("in.txt", "input\n", 20);
        project.write("out1.txt", "old one\n", 10);
        project.write("out2.txt", "old two\n", 10);
        let script = project.script(
            "# !bmake\nout1.txt\nout2.txt\n:in.txt\n\n\
             echo partial > ${targets-1}\n\n\
             echo scratch > ${temp-dir-1:work.txt}\n\n\
             false\n\n\
             echo never > ${targets-2}\n",
            10,
        );

        let err = project.run(&script).await.unwrap_err();

        assert!(err.to_string().contains("exit-code=1"));
        assert!(!project.path("out1.txt").exists());
        assert!(!project.path("out2.txt").exists());
        let temps = project.logged_temps();
        assert_eq!(temps.len(), 1);
        assert!(!temps[0].exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_external_command_in_script_directory() {
        let project = Project::new();
        project.write("in.txt", "b\na\nc\n", 20);
        let script = project.script("# !bmake\nsorted.txt\n:in.txt\n\nsort < ${source}\n> ${target}\n", 10);

        project.run(&script).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(project.path("sorted.txt")).unwrap(),
            "a\nb\nc\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_endless_producer_ends_with_its_consumer() {
        let project = Project::new();
        let script = project.script("# !bmake\nout.txt\n:!\n\nyes | head -n 1 > ${target}\n", 10);

        let outcome = tokio::time::timeout(Duration::from_secs(10), project.run(&script))
            .await
            .expect("build did not finish after head exited")
            .unwrap();

        assert_eq!(outcome, BuildOutcome::Rebuilt);
        assert_eq!(std::fs::read_to_string(project.path("out.txt")).unwrap(), "y\n");
    }
}
