//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

use crate::LoggingConfig;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "pimon host telemetry bridge")]
pub struct BridgeArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Collect and plan messages, log them, but do not connect to the broker.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the configured startup delay.
    #[arg(long)]
    pub no_delay: bool,
}

impl BridgeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        Self::parse_from_with_default(std::env::args_os(), default_config)
    }

    /// Parse the given arguments with a default config path.
    ///
    /// Exits the process with clap's usage message on invalid input.
    pub fn parse_from_with_default<I, T>(args: I, default_config: &'static str) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from_with_default(args, default_config).unwrap_or_else(|e| e.exit())
    }

    /// Parse the given arguments with a default config path, returning
    /// clap's error instead of exiting.
    pub fn try_parse_from_with_default<I, T>(
        args: I,
        default_config: &'static str,
    ) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        // The derive marks a non-Option field as required.
        let matches = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| {
                arg.default_value(default_config).required(false)
            })
            .try_get_matches_from(args)?;

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
    }

    /// Logging configuration with the `--log-level` override applied.
    pub fn logging(&self, configured: &LoggingConfig) -> LoggingConfig {
        match self.log_level {
            Some(ref level) => LoggingConfig {
                level: level.clone(),
                ..configured.clone()
            },
            None => configured.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_config() {
        let args = BridgeArgs::try_parse_from_with_default(["bridge"], "pimon.json5").unwrap();
        assert_eq!(args.config, PathBuf::from("pimon.json5"));
        assert!(args.log_level.is_none());
        assert!(!args.dry_run);
        assert!(!args.no_delay);
    }

    #[test]
    fn test_args_flags_without_config() {
        let args =
            BridgeArgs::try_parse_from_with_default(["bridge", "--dry-run"], "pimon.json5")
                .unwrap();
        assert_eq!(args.config, PathBuf::from("pimon.json5"));
        assert!(args.dry_run);
    }

    #[test]
    fn test_args_overrides() {
        let args = BridgeArgs::try_parse_from_with_default(
            [
                "bridge",
                "-c",
                "/etc/pimon.json5",
                "--log-level",
                "debug",
                "--dry-run",
                "--no-delay",
            ],
            "pimon.json5",
        )
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/pimon.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.dry_run);
        assert!(args.no_delay);
    }

    #[test]
    fn test_args_unknown_flag() {
        let result = BridgeArgs::try_parse_from_with_default(["bridge", "--verbose"], "pimon.json5");
        assert!(result.is_err());
    }

    #[test]
    fn test_logging_override() {
        let configured = LoggingConfig {
            level: "info".to_string(),
            format: crate::LogFormat::Json,
        };

        let args = BridgeArgs::try_parse_from_with_default(["bridge"], "pimon.json5").unwrap();
        assert_eq!(args.logging(&configured).level, "info");

        let args = BridgeArgs::try_parse_from_with_default(
            ["bridge", "--log-level", "trace"],
            "pimon.json5",
        )
        .unwrap();
        let logging = args.logging(&configured);
        assert_eq!(logging.level, "trace");
        assert_eq!(logging.format, crate::LogFormat::Json);
    }
}
