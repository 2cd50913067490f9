mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use plansight_core::error::ConfigError;
use plansight_core::models::{FilterConfig, QuerySettings, TimeWindow, TopN};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "plansight")]
#[command(about = "Find and diagnose the longest running queries recorded by Query Store")]
#[command(version)]
pub struct Cli {
    #[arg(long, short, global = true, help = "Log at debug level")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Manage saved connection sessions")]
    Sessions {
        #[command(subcommand)]
        action: SessionCommand,
    },
    #[command(about = "List databases with Query Store enabled")]
    Databases {
        #[arg(long, help = "Saved session to connect with (defaults to the current one)")]
        session: Option<String>,
    },
    #[command(about = "Run the longest running queries diagnostic against a database")]
    Run {
        #[arg(long, help = "Saved session to connect with (defaults to the current one)")]
        session: Option<String>,
        #[arg(long, short, help = "Database to diagnose")]
        database: String,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, help = "Analyze each plan and label detected issues")]
        insights: bool,
        #[arg(long, short, value_name = "PATH", help = "Export the result set as JSON")]
        output: Option<PathBuf>,
        #[arg(long, value_name = "SECONDS", help = "Query timeout")]
        timeout: Option<u64>,
    },
    #[command(about = "Analyze plans of a previously exported result set")]
    Insights {
        #[arg(help = "Exported result set (JSON)")]
        input: PathBuf,
        #[arg(long, short, value_name = "PATH", help = "Write the analyzed rows as JSON")]
        output: Option<PathBuf>,
    },
    #[command(about = "Print the diagnostic SQL without connecting")]
    Sql {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, help = "Assume the server has no plan hash column")]
        no_plan_hash: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    #[command(about = "List saved sessions")]
    List,
    #[command(about = "Save or update a session and make it current")]
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        server: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "PLANSIGHT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    #[command(about = "Remove a saved session")]
    Remove { name: String },
}

#[derive(Args, Clone, Default)]
pub struct FilterArgs {
    #[arg(long, short, help = "Time window, e.g. \"Last 7 days\"")]
    pub window: Option<String>,
    #[arg(long, short, help = "Number of plans to return (10 to 10000)")]
    pub top: Option<u32>,
    #[arg(long, help = "Exclude index maintenance statements")]
    pub exclude_index_ops: bool,
    #[arg(long, help = "Exclude statistics maintenance statements")]
    pub exclude_stats_ops: bool,
}

impl FilterArgs {
    /// Command line values over saved defaults.
    pub fn to_filter(&self, settings: &QuerySettings) -> Result<FilterConfig, ConfigError> {
        let time_window = match self.window.as_deref() {
            Some(label) => {
                let window = TimeWindow::from_label(Some(label));
                if !window.label().eq_ignore_ascii_case(label.trim()) {
                    log::warn!("Unknown time window {:?}, using {}", label, window);
                }
                window
            }
            None => settings.default_time_window,
        };
        let top_n = match self.top {
            Some(top) => TopN::try_from(top)?,
            None => settings.default_top_n,
        };

        Ok(FilterConfig {
            time_window,
            exclude_index_ops: self.exclude_index_ops,
            exclude_stats_ops: self.exclude_stats_ops,
            top_n,
        })
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

async fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Sessions { action } => {
            let state = commands::load_state()?;
            match action {
                SessionCommand::List => commands::sessions::list(&state),
                SessionCommand::Save {
                    name,
                    server,
                    username,
                    password,
                } => commands::sessions::save(&state, &name, &server, &username, &password),
                SessionCommand::Remove { name } => commands::sessions::remove(&state, &name),
            }
        }
        Commands::Databases { session } => {
            let state = commands::load_state()?;
            commands::query::databases(&state, session.as_deref()).await
        }
        Commands::Run {
            session,
            database,
            filter,
            insights,
            output,
            timeout,
        } => {
            let state = commands::load_state()?;
            commands::query::run(
                &state,
                commands::query::RunOptions {
                    session,
                    database,
                    filter,
                    insights,
                    output,
                    timeout,
                },
            )
            .await
        }
        Commands::Insights { input, output } => {
            commands::insights::run(&input, output.as_deref())
        }
        Commands::Sql {
            filter,
            no_plan_hash,
        } => commands::query::sql(&filter, no_plan_hash),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn filter_args_override_settings() {
        let settings = QuerySettings::default();
        let args = FilterArgs {
            window: Some("last 7 days".to_string()),
            top: Some(200),
            exclude_index_ops: true,
            exclude_stats_ops: false,
        };

        let filter = args.to_filter(&settings).unwrap();

        assert_eq!(filter.time_window, TimeWindow::Last7Days);
        assert_eq!(filter.top_n.get(), 200);
        assert!(filter.exclude_index_ops);
        assert!(!filter.exclude_stats_ops);
    }

    #[test]
    fn missing_filter_args_use_settings() {
        let settings = QuerySettings::default();

        let filter = FilterArgs::default().to_filter(&settings).unwrap();

        assert_eq!(filter.time_window, TimeWindow::LastHour);
        assert_eq!(filter.top_n.get(), 50);
    }

    #[test]
    fn out_of_range_top_is_rejected() {
        let args = FilterArgs {
            top: Some(5),
            ..Default::default()
        };
        assert!(matches!(
            args.to_filter(&QuerySettings::default()),
            Err(ConfigError::TopNOutOfRange { value: 5, .. })
        ));
    }

    #[test]
    fn parses_run_command() {
        let cli = Cli::try_parse_from([
            "plansight",
            "run",
            "--database",
            "Sales",
            "--window",
            "Last 2 weeks",
            "--exclude-stats-ops",
            "--insights",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                database,
                filter,
                insights,
                ..
            } => {
                assert_eq!(database, "Sales");
                assert_eq!(filter.window.as_deref(), Some("Last 2 weeks"));
                assert!(filter.exclude_stats_ops);
                assert!(insights);
            }
            _ => panic!("expected run"),
        }
    }
}
