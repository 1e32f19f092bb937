use std::process::ExitCode;

use bmake_core::error::report_lines;
use bmake_core::staleness::compare_target;
use bmake_core::{Console, Freshness, IsOlderCli, Logger};
use clap::Parser;

fn main() -> ExitCode {
    let cli = match IsOlderCli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let logger = Logger::new(Console::stdio(), cli.verbose);
    let target = cli.target.display().to_string();

    let result = compare_target(&cli.target, &cli.sources, |source, target_is_newer| {
        let message = if target_is_newer {
            "Target file is newer than source file"
        } else {
            "Source file is newer than target file"
        };
        logger.info(&format!(
            "{}: target=\"{}\", source=\"{}\"",
            message,
            target,
            source.display()
        ));
    });

    match result {
        Ok(Freshness::Newer) => ExitCode::SUCCESS,
        Ok(Freshness::OlderThan(_)) => ExitCode::FAILURE,
        Ok(Freshness::TargetMissing) => {
            logger.info(&format!("Target file does not exist: \"{}\"", target));
            ExitCode::FAILURE
        }
        Err(err) => {
            for line in report_lines(&err) {
                logger.error(&line);
            }
            ExitCode::FAILURE
        }
    }
}
