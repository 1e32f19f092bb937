use chrono::Local;

use crate::console::Console;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn to_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[90m",
            LogLevel::Info => "\x1b[37m",
            LogLevel::Warning => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[31;1m",
        }
    }
}

/// Progress and diagnostic messages, written to the console error stream.
/// Messages below `Warning` are dropped unless the logger is verbose.
#[derive(Clone)]
pub struct Logger {
    console: Console,
    verbose: bool,
    use_colors: bool,
}

impl Logger {
    pub fn new(console: Console, verbose: bool) -> Self {
        let use_colors = console.is_colored();
        Self {
            console,
            verbose,
            use_colors,
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level < LogLevel::Warning && !self.verbose {
            return;
        }

        let timestamp = Local::now().format("%H:%M:%S");
        let line = if self.use_colors {
            format!(
                "\x1b[90m[{}]\x1b[0m {}{}: {}\x1b[0m",
                timestamp,
                level.color(),
                level.to_str(),
                message
            )
        } else {
            format!("[{}] {}: {}", timestamp, level.to_str(), message)
        };

        // A console that cannot be written to has nowhere left to report to.
        let _ = self.console.write_err_line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Capture;

    fn capture_logger(verbose: bool) -> (Logger, Capture) {
        let err = Capture::new();
        let console = Console::from_writers(Box::new(Capture::new()), Box::new(err.clone()));
        (Logger::new(console, verbose), err)
    }

    #[test]
    fn test_info_suppressed_unless_verbose() {
        let (logger, err) = capture_logger(false);
        logger.info("hidden");
        logger.error("shown");

        let output = err.contents();
        assert!(!output.contains("hidden"));
        assert!(output.contains("ERROR: shown"));
    }

    #[test]
    fn test_verbose_logger_emits_info() {
        let (logger, err) = capture_logger(true);
        logger.info("Execute command:");

        assert!(err.contents().contains("INFO: Execute command:"));
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert_eq!(LogLevel::Fatal.to_str(), "FATAL");
    }
}
