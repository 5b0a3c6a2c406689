use clap::Parser;
use std::path::PathBuf;

/// keylightd: daemon for Elgato Key Light control
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: $KEYLIGHTD_CONFIG, then the user and system config)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long = "write-config", default_value = "false")]
    pub write_config: bool,

    /// Log debug messages
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    pub verbose: bool,
}
