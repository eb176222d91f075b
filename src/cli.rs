//! Command-line interface for oneiro
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Voice-first dream journal
#[derive(Parser, Debug)]
#[command(
    name = "oneiro",
    version = crate::version_string(),
    about = "Record, transcribe, and interpret your dreams"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: capture diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Write the generated dream image to this exact path
    #[arg(long, value_name = "PATH")]
    pub image_out: Option<PathBuf>,

    /// Stop recording after this long (default: until Ctrl-C). Examples: 90s, 2m, 1h
    #[arg(long, value_name = "DURATION", value_parser = parse_max_duration)]
    pub max_duration: Option<Duration>,

    /// Tee the raw recording into a WAV file
    #[arg(long, value_name = "PATH")]
    pub dump_audio: Option<PathBuf>,
}

/// Parse a recording cap into a [`Duration`].
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (seconds), single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`).
fn parse_max_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["oneiro"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.device.is_none());
        assert!(cli.image_out.is_none());
        assert!(cli.max_duration.is_none());
        assert!(cli.dump_audio.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_single() {
        let cli = Cli::try_parse_from(["oneiro", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_verbose_repeated_flags() {
        let cli = Cli::try_parse_from(["oneiro", "-v", "-v"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_with_options() {
        let cli = Cli::try_parse_from([
            "oneiro",
            "--device",
            "hw:0",
            "--image-out",
            "/tmp/dream.png",
        ])
        .unwrap();

        assert_eq!(cli.device.as_deref(), Some("hw:0"));
        assert_eq!(cli.image_out, Some(PathBuf::from("/tmp/dream.png")));
    }

    #[test]
    fn test_parse_max_duration_bare_seconds() {
        let cli = Cli::try_parse_from(["oneiro", "--max-duration", "90"]).unwrap();
        assert_eq!(cli.max_duration, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_max_duration_humantime() {
        let cli = Cli::try_parse_from(["oneiro", "--max-duration", "1m30s"]).unwrap();
        assert_eq!(cli.max_duration, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_parse_max_duration_rejects_garbage() {
        let result = Cli::try_parse_from(["oneiro", "--max-duration", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_dump_audio() {
        let cli = Cli::try_parse_from(["oneiro", "--dump-audio", "/tmp/raw.wav"]).unwrap();
        assert_eq!(cli.dump_audio, Some(PathBuf::from("/tmp/raw.wav")));
    }

    #[test]
    fn test_parse_devices() {
        let cli = Cli::try_parse_from(["oneiro", "devices"]).unwrap();
        match cli.command {
            Some(Commands::Devices) => {}
            _ => panic!("Expected Devices command"),
        }
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["oneiro", "config", "show"]).unwrap();
        match cli.command {
            Some(Commands::Config { action }) => match action {
                ConfigAction::Show => {}
                _ => panic!("Expected Show action"),
            },
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_parse_config_path() {
        let cli = Cli::try_parse_from(["oneiro", "config", "path"]).unwrap();
        match cli.command {
            Some(Commands::Config { action }) => match action {
                ConfigAction::Path => {}
                _ => panic!("Expected Path action"),
            },
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_config_requires_subcommand() {
        let result = Cli::try_parse_from(["oneiro", "config"]);
        let err = result.unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_parse_global_config() {
        let cli = Cli::try_parse_from(["oneiro", "--config", "/path/to/config.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_global_quiet() {
        let cli = Cli::try_parse_from(["oneiro", "--quiet", "devices"]).unwrap();
        assert!(cli.quiet);
        match cli.command {
            Some(Commands::Devices) => {}
            _ => panic!("Expected Devices command"),
        }
    }

    #[test]
    fn test_global_options_after_command() {
        // Global options should work before or after the command
        let cli =
            Cli::try_parse_from(["oneiro", "devices", "--config", "/tmp/config.toml"]).unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let result = Cli::try_parse_from(["oneiro", "invalid"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_help_flag() {
        // Clap returns an error for --help but with DisplayHelp kind
        let result = Cli::try_parse_from(["oneiro", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_flag() {
        // Clap returns an error for --version but with DisplayVersion kind
        let result = Cli::try_parse_from(["oneiro", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["oneiro", "completions", "bash"]).unwrap();
        match cli.command {
            Some(Commands::Completions { shell }) => {
                assert_eq!(shell, Shell::Bash);
            }
            _ => panic!("Expected Completions command"),
        }
    }
}
