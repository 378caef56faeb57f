//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// mailqtt - camera alert mail to MQTT bridge
#[derive(Parser)]
#[command(
    name = "mailqtt",
    about = "Receive camera alert emails over SMTP and publish them to MQTT",
    version,
    after_help = "Environment overrides: SMTP_PORT, MQTT_HOST, MQTT_PORT, MQTT_USERNAME, MQTT_PASSWORD, \
                  MQTT_TOPIC, MQTT_RESET_TIME, MQTT_RESET_PAYLOAD, SAVE_ATTACHMENTS, \
                  SAVE_ATTACHMENTS_DURING_RESET_TIME, SAVE_ATTACHMENTS_DIR, DEBUG"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    /// Log filter (e.g. "info", "mailqtt=debug")
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to serve)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the SMTP listener and publish alerts (default)
    Serve,

    /// Show the topic a subject line resolves to
    Resolve {
        /// Subject line, e.g. "Person Detected from Front Door at 10:32pm"
        subject: String,

        /// Output format
        #[arg(short, long, value_enum, ignore_case = true, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for resolve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned key/value lines
    #[default]
    #[value(alias = "plain")]
    Text,
    /// Pretty-printed JSON object
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_subcommand() {
        let cli = Cli::try_parse_from(["mailqtt"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["mailqtt", "serve", "--config", "/etc/mailqtt.yml", "-v"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Serve)));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/mailqtt.yml")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_resolve_with_format() {
        let cli = Cli::try_parse_from(["mailqtt", "resolve", "Person Detected from Yard at 1pm", "-f", "json"]).unwrap();
        match cli.command {
            Some(Command::Resolve { subject, format }) => {
                assert_eq!(subject, "Person Detected from Yard at 1pm");
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("Expected resolve"),
        }
    }

    fn resolve_format(args: &[&str]) -> Result<OutputFormat, clap::Error> {
        let cli = Cli::try_parse_from(["mailqtt", "resolve", "x"].iter().chain(args).copied())?;
        match cli.command {
            Some(Command::Resolve { format, .. }) => Ok(format),
            _ => panic!("Expected resolve"),
        }
    }

    #[test]
    fn test_format_defaults_to_text() {
        assert_eq!(resolve_format(&[]).unwrap(), OutputFormat::Text);
    }

    #[test]
    fn test_format_accepts_alias_and_any_case() {
        assert_eq!(resolve_format(&["--format", "plain"]).unwrap(), OutputFormat::Text);
        assert_eq!(resolve_format(&["--format", "PLAIN"]).unwrap(), OutputFormat::Text);
        assert_eq!(resolve_format(&["-f", "Json"]).unwrap(), OutputFormat::Json);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = resolve_format(&["--format", "table"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
