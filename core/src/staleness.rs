use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::dependency::Dependency;
use crate::error::BuildError;
use crate::path;

/// Why the command block does or does not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    UpToDate,
    UpdateAlways,
    TargetMissing(PathBuf),
    /// The newest input (a source or the script itself) is newer than the
    /// oldest target.
    SourceNewer(PathBuf),
}

impl Staleness {
    pub fn needs_rebuild(&self) -> bool {
        !matches!(self, Staleness::UpToDate)
    }

    pub fn reason(&self) -> String {
        match self {
            Staleness::UpToDate => "All targets are up to date".to_string(),
            Staleness::UpdateAlways => "The dependency is marked to update always".to_string(),
            Staleness::TargetMissing(target) => {
                format!("The target does not exist: \"{}\"", target.display())
            }
            Staleness::SourceNewer(source) => {
                format!("\"{}\" is newer than the targets", source.display())
            }
        }
    }
}

/// Decides whether `dependency` has to be rebuilt.
///
/// Every source must exist. The script counts as an extra source, so editing
/// the commands rebuilds the targets too.
pub fn evaluate(dependency: &Dependency, script: &Path) -> anyhow::Result<Staleness> {
    let mut newest: Option<(SystemTime, &Path)> = None;
    for source in dependency.sources() {
        let time = path::modified(source)?
            .ok_or_else(|| BuildError::MissingSource(source.clone()))?;
        newest = newer(newest, time, source);
    }
    if let Some(time) = path::modified(script)? {
        newest = newer(newest, time, script);
    }

    if dependency.update_always() {
        return Ok(Staleness::UpdateAlways);
    }

    let mut oldest_target: Option<SystemTime> = None;
    for target in dependency.targets() {
        match path::modified(target)? {
            Some(time) => {
                oldest_target = Some(oldest_target.map_or(time, |oldest| oldest.min(time)));
            }
            None => return Ok(Staleness::TargetMissing(target.clone())),
        }
    }

    match (oldest_target, newest) {
        (Some(target_time), Some((source_time, source))) if target_time < source_time => {
            Ok(Staleness::SourceNewer(source.to_path_buf()))
        }
        _ => Ok(Staleness::UpToDate),
    }
}

fn newer<'p>(
    current: Option<(SystemTime, &'p Path)>,
    time: SystemTime,
    path: &'p Path,
) -> Option<(SystemTime, &'p Path)> {
    match current {
        Some((newest, _)) if newest >= time => current,
        _ => Some((time, path)),
    }
}

/// How one target compares with its sources, for `is-older`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    TargetMissing,
    /// The first source that is at least as new as the target.
    OlderThan(PathBuf),
    Newer,
}

impl Freshness {
    pub fn is_newer(&self) -> bool {
        matches!(self, Freshness::Newer)
    }
}

/// Compares `target` with each source in order, stopping at the first one
/// that is at least as new. `observe` sees every comparison made, with `true`
/// when the target was the newer file.
pub fn compare_target<F>(target: &Path, sources: &[PathBuf], mut observe: F) -> anyhow::Result<Freshness>
where
    F: FnMut(&Path, bool),
{
    let Some(target_time) = path::modified(target)? else {
        return Ok(Freshness::TargetMissing);
    };

    for source in sources {
        let source_time = path::modified(source)?
            .ok_or_else(|| BuildError::MissingSource(source.clone()))?;
        let target_is_newer = target_time > source_time;
        observe(source, target_is_newer);
        if !target_is_newer {
            return Ok(Freshness::OlderThan(source.clone()));
        }
    }
    Ok(Freshness::Newer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, time: SystemTime) {
        let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .unwrap();
        file.set_modified(time).unwrap();
    }

    fn at(seconds: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + seconds)
    }

    struct Fixture {
        dir: tempfile::TempDir,
        script: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::TempDir::new().unwrap();
            let script = dir.path().join("build.bmake");
            touch(&script, at(0));
            Self { dir, script }
        }

        fn file(&self, name: &str, seconds: u64) -> PathBuf {
            let path = self.dir.path().join(name);
            touch(&path, at(seconds));
            path
        }

        fn absent(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }
    }

    fn dependency(targets: &[PathBuf], sources: &[PathBuf]) -> Dependency {
        let mut dependency = Dependency::new();
        targets.iter().for_each(|t| dependency.add_target(t.clone()));
        sources.iter().for_each(|s| dependency.add_source(s.clone()));
        dependency
    }

    #[test]
    fn test_fresh_targets_are_up_to_date() {
        let fx = Fixture::new();
        let dep = dependency(&[fx.file("out", 20)], &[fx.file("in", 10)]);

        let staleness = evaluate(&dep, &fx.script).unwrap();
        assert_eq!(staleness, Staleness::UpToDate);
        assert!(!staleness.needs_rebuild());
    }

    #[test]
    fn test_equal_timestamps_are_up_to_date() {
        let fx = Fixture::new();
        let dep = dependency(&[fx.file("out", 10)], &[fx.file("in", 10)]);
        assert_eq!(evaluate(&dep, &fx.script).unwrap(), Staleness::UpToDate);
    }

    #[test]
    fn test_newer_source_forces_rebuild() {
        let fx = Fixture::new();
        let newer_source = fx.file("b.c", 30);
        let dep = dependency(
            &[fx.file("out1", 40), fx.file("out2", 20)],
            &[fx.file("a.c", 10), newer_source.clone()],
        );
        assert_eq!(
            evaluate(&dep, &fx.script).unwrap(),
            Staleness::SourceNewer(newer_source)
        );
    }

    #[test]
    fn test_newer_script_forces_rebuild() {
        let fx = Fixture::new();
        let dep = dependency(&[fx.file("out", 20)], &[fx.file("in", 10)]);
        touch(&fx.script, at(30));
        assert_eq!(
            evaluate(&dep, &fx.script).unwrap(),
            Staleness::SourceNewer(fx.script.clone())
        );
    }

    #[test]
    fn test_any_missing_target_forces_rebuild() {
        let fx = Fixture::new();
        let missing = fx.absent("out2");
        let dep = dependency(&[fx.file("out1", 50), missing.clone()], &[fx.file("in", 10)]);
        assert_eq!(
            evaluate(&dep, &fx.script).unwrap(),
            Staleness::TargetMissing(missing)
        );
    }

    #[test]
    fn test_update_always_wins() {
        let fx = Fixture::new();
        let mut dep = dependency(&[fx.file("out", 50)], &[fx.file("in", 10)]);
        dep.set_update_always();
        assert_eq!(evaluate(&dep, &fx.script).unwrap(), Staleness::UpdateAlways);
    }

    #[test]
    fn test_missing_source_is_fatal_even_with_update_always() {
        let fx = Fixture::new();
        let mut dep = dependency(&[fx.absent("out")], &[fx.absent("in")]);
        dep.set_update_always();

        let err = evaluate(&dep, &fx.script).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingSource(path)) if path.ends_with("in")
        ));
    }

    #[test]
    fn test_compare_target() {
        let fx = Fixture::new();
        let target = fx.file("out", 20);
        let old = fx.file("old", 10);
        let same = fx.file("same", 20);
        let newer = fx.file("newer", 30);

        let mut seen = Vec::new();
        let freshness = compare_target(&target, &[old.clone(), same.clone(), newer], |source, ok| {
            seen.push((source.to_path_buf(), ok))
        })
        .unwrap();
        assert_eq!(freshness, Freshness::OlderThan(same.clone()));
        assert_eq!(seen, vec![(old.clone(), true), (same, false)]);

        assert!(compare_target(&target, &[old.clone()], |_, _| {}).unwrap().is_newer());
    }

    #[test]
    fn test_compare_missing_files() {
        let fx = Fixture::new();
        let target = fx.file("out", 20);

        assert_eq!(
            compare_target(&fx.absent("nothing"), &[fx.absent("gone")], |_, _| {}).unwrap(),
            Freshness::TargetMissing
        );
        let err = compare_target(&target, &[fx.absent("gone")], |_, _| {}).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingSource(_))
        ));
    }
}
