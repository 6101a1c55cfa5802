//! Ordered sender statistics, CSV export and domain filter suggestions

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::models::{SenderKey, SenderRow, SenderStats};

/// Column headers of the exported CSV
pub const CSV_HEADER: [&str; 4] = ["Sender", "Email", "Domain", "Count"];

/// A suggested Gmail filter catching a whole sending domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFilter {
    pub domain: String,
    pub query: String,
    pub total: usize,
}

/// Flatten stats into rows sorted by count descending, then sender ascending
pub fn sorted_rows(stats: &BTreeMap<SenderKey, SenderStats>) -> Vec<SenderRow> {
    let mut rows: Vec<SenderRow> = stats
        .iter()
        .map(|(sender, s)| SenderRow {
            sender: sender.clone(),
            email: s.email.clone(),
            domain: s.domain.clone(),
            count: s.count,
        })
        .collect();

    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
    rows
}

/// Write rows as `;`-delimited CSV with a header line
pub fn write_csv<W: Write>(writer: W, rows: &[SenderRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);

    wtr.write_record(CSV_HEADER)?;
    for row in rows {
        let count = row.count.to_string();
        wtr.write_record([
            row.sender.as_str(),
            row.email.as_str(),
            row.domain.as_str(),
            count.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write rows to a CSV file, creating parent directories as needed
pub async fn export_csv_file(path: &Path, rows: &[SenderRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut buffer = Vec::new();
    write_csv(&mut buffer, rows)?;
    tokio::fs::write(path, buffer).await?;

    tracing::info!("Exported {} senders to {:?}", rows.len(), path);
    Ok(())
}

/// Group senders by domain and propose a `from:(@domain)` filter for each
///
/// Senders without a domain are skipped. Domains whose combined count is
/// below `min_count` are dropped. Ordered by total descending, then domain.
pub fn suggest_domain_filters(rows: &[SenderRow], min_count: usize) -> Vec<DomainFilter> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for row in rows.iter().filter(|r| !r.domain.is_empty()) {
        *totals.entry(row.domain.as_str()).or_insert(0) += row.count;
    }

    let mut filters: Vec<DomainFilter> = totals
        .into_iter()
        .filter(|(_, total)| *total >= min_count)
        .map(|(domain, total)| DomainFilter {
            domain: domain.to_string(),
            query: format!("from:(@{})", domain),
            total,
        })
        .collect();

    filters.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.domain.cmp(&b.domain)));
    filters
}
