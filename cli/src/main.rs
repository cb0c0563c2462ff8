use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::bans::BanCommands;
use commands::logs::LogCommands;
use util::Output;

#[derive(Parser)]
#[command(name = "bastion", version, about = "Bastion CLI: inspect request analytics and active bans")]
struct Cli {
    /// API base URL
    #[arg(long, env = "BASTION_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Print compact JSON
    #[arg(long, global = true)]
    raw: bool,

    /// Include HTTP status and response headers in the output
    #[arg(long, short = 'i', global = true)]
    include: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API and storage health
    Health,
    /// Check that the anomaly classifier is reachable
    ClassifierHealth,
    /// Request log analytics
    Logs {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Active address bans
    Bans {
        #[command(subcommand)]
        command: BanCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version print to stdout and succeed; anything else is a usage error.
            let code = if err.use_stderr() { 4 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    let output = Output {
        raw: cli.raw,
        include: cli.include,
    };

    let code = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url, output).await,
        Commands::ClassifierHealth => commands::health::classifier(&cli.api_url, output).await,
        Commands::Logs { command } => commands::logs::run(&cli.api_url, output, command).await,
        Commands::Bans { command } => commands::bans::run(&cli.api_url, output, command).await,
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use commands::logs::TimeRange;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn logs_stats_parses_time_range() {
        let cli = Cli::try_parse_from(["bastion", "logs", "stats", "--time-range", "7d"])
            .expect("valid args");
        match cli.command {
            Commands::Logs {
                command: LogCommands::Stats { time_range },
            } => assert_eq!(time_range, TimeRange::Week),
            _ => panic!("expected logs stats"),
        }
    }

    #[test]
    fn bans_show_takes_positional_address() {
        let cli = Cli::try_parse_from(["bastion", "--raw", "bans", "show", "1.2.3.4"])
            .expect("valid args");
        assert!(cli.raw);
        match cli.command {
            Commands::Bans {
                command: BanCommands::Show { address },
            } => assert_eq!(address, "1.2.3.4"),
            _ => panic!("expected bans show"),
        }
    }

    #[test]
    fn unknown_time_range_is_a_usage_error() {
        assert!(Cli::try_parse_from(["bastion", "logs", "stats", "--time-range", "1y"]).is_err());
    }
}
