use anyhow::Result;
use clap::{CommandFactory, Parser};
use oneiro::app::run_journal_command;
use oneiro::audio::capture::list_devices;
use oneiro::cli::{Cli, Commands, ConfigAction};
use oneiro::config::Config;
use owo_colors::OwoColorize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            run_journal_command(
                config,
                cli.device,
                cli.image_out,
                cli.max_duration,
                cli.dump_audio,
                cli.quiet,
                cli.verbose,
            )
            .await?;
        }

        Some(Commands::Devices) => {
            list_audio_devices()?;
        }

        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Path => {
                println!("{}", Config::default_path().display());
            }
        },

        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "oneiro", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration, preferring an explicit path over the default location.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()),
    };
    Ok(config.with_env_overrides())
}

/// Print available audio input devices, exiting nonzero when none exist.
fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;
    if devices.is_empty() {
        eprintln!("{}", "No audio input devices found".red());
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for device in devices {
        match device.strip_suffix(" [recommended]") {
            Some(name) => println!("  {} {}", name, "[recommended]".green()),
            None => println!("  {}", device),
        }
    }
    Ok(())
}
