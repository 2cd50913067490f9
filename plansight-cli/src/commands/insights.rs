use std::path::Path;

use plansight_core::{export, insights};

use crate::error::CliError;
use crate::output;

/// Re-analyze an exported result set.
pub fn run(input: &Path, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut rows = export::import_rows(input)?;
    if rows.is_empty() {
        return Err(CliError::EmptyResultSet(input.display().to_string()));
    }

    let cancelled = super::cancel_on_interrupt();
    let summary = insights::analyze_all_cancellable(&mut rows, &cancelled);

    output::print_rows(&rows);
    output::print_summary(rows.len(), Some(&summary));

    if let Some(path) = output_path {
        let written = export::export_rows(path, &rows)?;
        println!("Exported {} rows to {}", written, path.display());
    }
    Ok(())
}
