use clap::{Subcommand, ValueEnum};

use crate::util::{Output, api_request};

#[derive(Subcommand)]
pub enum LogCommands {
    /// Most recent request log entries, newest first
    Recent {
        /// Maximum number of entries (server clamps to 1..=500)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Request counts per category
    Stats {
        /// Reporting window
        #[arg(long, value_enum, default_value_t = TimeRange::Day)]
        time_range: TimeRange,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TimeRange {
    #[value(name = "24h")]
    Day,
    #[value(name = "7d")]
    Week,
    #[value(name = "30d")]
    Month,
}

impl TimeRange {
    fn as_query(self) -> &'static str {
        match self {
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }
}

pub async fn run(api_url: &str, output: Output, command: LogCommands) -> i32 {
    match command {
        LogCommands::Recent { limit } => {
            let query: Vec<(&str, String)> =
                limit.map(|l| ("limit", l.to_string())).into_iter().collect();
            api_request(api_url, "/v1/analytics/requests/recent", &query, output).await
        }
        LogCommands::Stats { time_range } => {
            api_request(
                api_url,
                "/v1/analytics/requests",
                &[("time_range", time_range.as_query().to_string())],
                output,
            )
            .await
        }
    }
}
