use std::process::ExitCode;

use anyhow::Result;
use bmake_core::error::report_lines;
use bmake_core::{BuildOutcome, Builder, Cli, Config, Console, LogFile, Logger};
use clap::Parser;

fn report(logger: &Logger, err: &anyhow::Error) {
    for line in report_lines(err) {
        logger.error(&line);
    }
}

fn open_console(cli: &Cli, config: &Config) -> Result<(Console, Option<LogFile>)> {
    if !cli.log {
        return Ok((Console::stdio(), None));
    }

    let (log_file, file) = LogFile::create(&config.log_directory(), config.max_log_files())?;
    Ok((Console::mirrored(file), Some(log_file)))
}

async fn run_build(cli: &Cli, console: Console, logger: &Logger) -> Result<()> {
    let builder = Builder::new(&cli.script, console, logger.clone())?;

    match builder.run().await? {
        BuildOutcome::Rebuilt => logger.info("Build completed successfully"),
        BuildOutcome::UpToDate => logger.info("Nothing to do"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
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

    let stdio_logger = Logger::new(Console::stdio(), cli.verbose);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            report(&stdio_logger, &err);
            return ExitCode::FAILURE;
        }
    };

    let (console, log_file) = match open_console(&cli, &config) {
        Ok(opened) => opened,
        Err(err) => {
            report(&stdio_logger, &err);
            return ExitCode::FAILURE;
        }
    };

    let success = {
        let logger = Logger::new(console.clone(), cli.verbose);
        match run_build(&cli, console.clone(), &logger).await {
            Ok(()) => true,
            Err(err) => {
                report(&logger, &err);
                false
            }
        }
    };

    let _ = console.flush();
    drop(console);

    if let Some(log_file) = log_file {
        let path = log_file.path().to_path_buf();
        match log_file.finish(success) {
            Ok(()) if !success => {
                stdio_logger.warning(&format!("The log was saved to \"{}\"", path.display()))
            }
            Ok(()) => {}
            Err(err) => stdio_logger.warning(&format!(
                "Failed to delete the log file \"{}\": {}",
                path.display(),
                err
            )),
        }
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
