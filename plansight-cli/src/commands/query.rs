use std::path::PathBuf;
use std::time::Duration;

use plansight_core::db::mssql::fetch_plan_rows;
use plansight_core::db::probe;
use plansight_core::models::{CapabilitySet, QuerySettings};
use plansight_core::{export, insights, paths, query_builder, AppState, MssqlExecutor};

use crate::error::CliError;
use crate::{output, FilterArgs};

pub struct RunOptions {
    pub session: Option<String>,
    pub database: String,
    pub filter: FilterArgs,
    pub insights: bool,
    pub output: Option<PathBuf>,
    pub timeout: Option<u64>,
}

pub async fn databases(state: &AppState, session: Option<&str>) -> Result<(), CliError> {
    let target = state.target_for(session, "master")?;
    let databases = probe::list_query_store_databases(&MssqlExecutor, &target).await;

    if databases.is_empty() {
        println!("No databases with Query Store enabled were found.");
    }
    for name in databases {
        println!("{}", name);
    }
    Ok(())
}

pub async fn run(state: &AppState, options: RunOptions) -> Result<(), CliError> {
    let filter = options.filter.to_filter(&state.settings.query)?;
    let target = state.target_for(options.session.as_deref(), &options.database)?;
    let timeout = Duration::from_secs(
        options
            .timeout
            .unwrap_or(state.settings.query.timeout_seconds),
    );

    let capabilities = probe::probe_capabilities(&MssqlExecutor, &target).await;
    if !capabilities.query_store_databases.contains(&options.database) {
        log::warn!(
            "Query Store does not appear to be enabled on {}; the result may be empty",
            options.database
        );
    }

    let mut rows =
        fetch_plan_rows(&MssqlExecutor, &target, &filter, &capabilities, timeout).await?;

    let summary = if options.insights {
        let cancelled = super::cancel_on_interrupt();
        Some(insights::analyze_all_cancellable(&mut rows, &cancelled))
    } else {
        None
    };

    output::print_rows(&rows);
    output::print_summary(rows.len(), summary.as_ref());

    if let Some(path) = options.output {
        let written = export::export_rows(&path, &rows)?;
        println!("Exported {} rows to {}", written, path.display());
    }
    Ok(())
}

/// Diagnostic SQL for `filter` over the saved defaults, without connecting.
pub fn render_sql(
    filter: &FilterArgs,
    no_plan_hash: bool,
    settings: &QuerySettings,
) -> Result<String, CliError> {
    let config = filter.to_filter(settings)?;
    let capabilities = CapabilitySet {
        has_plan_hash_column: !no_plan_hash,
        ..Default::default()
    };
    Ok(query_builder::build(&config, &capabilities))
}

pub fn sql(filter: &FilterArgs, no_plan_hash: bool) -> Result<(), CliError> {
    let paths = paths::resolve_paths()?;
    let settings = paths::load_settings(&paths.settings_path);
    println!("{}", render_sql(filter, no_plan_hash, &settings.query)?);
    Ok(())
}
