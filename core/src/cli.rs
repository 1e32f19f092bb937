use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bmake")]
#[command(author, version, about = "Rebuild targets from a script when their sources change", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Log file timestamps and every command executed")]
    pub verbose: bool,

    #[arg(short, long, help = "Copy console output into a log file, kept only on failure")]
    pub log: bool,

    #[arg(long, value_name = "PATH", help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(value_name = "SCRIPT", help = "Build script to run")]
    pub script: PathBuf,
}

#[derive(Parser, Debug)]
#[command(name = "is-older")]
#[command(author, version, about = "Exit with 0 when the target is newer than every source", long_about = None)]
pub struct IsOlderCli {
    #[arg(short, long, help = "Log each comparison")]
    pub verbose: bool,

    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    #[arg(value_name = "SOURCE", required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,
}
