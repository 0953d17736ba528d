use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use stackrag::commands::{ask, show_status};
use stackrag::config::{get_config_dir, run_interactive_config, show_config};
use stackrag::{Result, StackRagError};

#[derive(Parser)]
#[command(name = "stackrag")]
#[command(about = "Answers programming questions from a local cache of StackOverflow posts")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector database
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a programming question
    Ask {
        /// The question to answer
        query: String,
        /// Number of similar posts to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show Ollama, StackExchange and vector store status
    Status,
    /// Configure Ollama, StackExchange and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style(e.user_message()).red());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = get_config_dir(cli.config_dir.as_deref())
        .map_err(|e| StackRagError::Config(e.to_string()))?;

    match cli.command {
        Commands::Ask { query, top_k, json } => {
            ask(&config_dir, query, top_k, json).await?;
        }
        Commands::Status => {
            show_status(&config_dir).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ask_command_with_options() {
        let cli = Cli::try_parse_from([
            "stackrag",
            "ask",
            "How do I reverse a list?",
            "--top-k",
            "3",
            "--json",
        ])
        .expect("ask should parse");

        let Commands::Ask { query, top_k, json } = cli.command else {
            panic!("expected ask command");
        };
        assert_eq!(query, "How do I reverse a list?");
        assert_eq!(top_k, Some(3));
        assert!(json);
        assert_eq!(cli.config_dir, None);
    }

    #[test]
    fn ask_requires_a_query() {
        let cli = Cli::try_parse_from(["stackrag", "ask"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from(["stackrag", "status", "--config-dir", "/tmp/stackrag"])
            .expect("status should parse");

        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/stackrag")));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["stackrag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["stackrag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["stackrag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
