use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reencoder")]
#[command(about = "Local gateway that re-encodes uploads before forwarding them", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve(ConfigArgs),
    /// Write the default configuration file and exit
    InitConfig(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to $REENCODER_CONFIG, then reencoder.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_config() {
        let cli = Cli::try_parse_from(["reencoder", "serve", "--config", "/etc/reencoder.toml"]).unwrap();
        match cli.command {
            Commands::Serve(args) => assert_eq!(args.config, Some(PathBuf::from("/etc/reencoder.toml"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_init_config() {
        let cli = Cli::try_parse_from(["reencoder", "init-config"]).unwrap();
        assert!(matches!(cli.command, Commands::InitConfig(ConfigArgs { config: None })));
    }
}
