//! Command-line argument parsing

use crate::config::DEFAULT_CONFIG_PATH;
use crate::logging::LogFormat;
use clap::Parser;
use std::ffi::OsString;

const LONG_FLAGS: &[&str] = &["config", "help", "version", "verbose", "once", "log-format"];

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "image-syncer")]
#[command(about = "Mirror container images between registries through the local Docker engine")]
#[command(version, author)]
#[command(help_template = "{name} {version}\n{about}\n\n{usage-heading} {usage}\n\n{all-args}")]
pub struct Args {
    /// Config document location
    #[arg(
        long = "config",
        short = 'c',
        env = "IMAGE_SYNCER_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Path or http(s):// URL of the sync config"
    )]
    pub config: String,

    /// Verbose output
    #[arg(
        long = "verbose",
        short = 'v',
        help = "Enable debug logging (RUST_LOG takes precedence)"
    )]
    pub verbose: bool,

    /// Log output format
    #[arg(
        long = "log-format",
        default_value = "text",
        help = "Log format: text or json"
    )]
    pub log_format: LogFormat,

    /// Single cycle mode
    #[arg(
        long = "once",
        help = "Run a single sync cycle and exit, nonzero if any image failed"
    )]
    pub once: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse_from(normalize_long_flags(std::env::args_os()))
    }

    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Args::try_parse_from(normalize_long_flags(args.into_iter().map(Into::into)))
    }
}

/// Rewrite single-dash long flags (`-config x`, `-help`) into their `--` form
pub fn normalize_long_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(index, arg)| {
            if index == 0 {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let name = rest.split('=').next().unwrap_or(rest);
            if LONG_FLAGS.contains(&name) {
                OsString::from(format!("--{}", rest))
            } else {
                arg
            }
        })
        .collect()
}
