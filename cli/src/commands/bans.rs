use clap::Subcommand;

use crate::util::{Output, api_request};

#[derive(Subcommand)]
pub enum BanCommands {
    /// List active bans
    List {
        /// Maximum number of bans (server clamps to 1..=500)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show the active ban on one address (exit code 1 when none)
    Show {
        /// Network address, e.g. 203.0.113.7
        address: String,
    },
}

pub async fn run(api_url: &str, output: Output, command: BanCommands) -> i32 {
    match command {
        BanCommands::List { limit } => {
            let query: Vec<(&str, String)> =
                limit.map(|l| ("limit", l.to_string())).into_iter().collect();
            api_request(api_url, "/v1/admin/bans", &query, output).await
        }
        BanCommands::Show { address } => {
            api_request(api_url, &format!("/v1/admin/bans/{address}"), &[], output).await
        }
    }
}
