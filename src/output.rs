//! CSV sink for the merged table.

use crate::{data::JobRecord, error::HarvestError};
use std::{io, path::Path};
use tracing::info;

pub const COLUMNS: [&str; 8] = [
    "search_query",
    "title",
    "company",
    "location",
    "url",
    "experience",
    "description",
    "platform",
];

/// Writes a header row followed by one row per record. The header is written even when
/// there are no records.
pub fn write_records<W: io::Write>(records: &[JobRecord], writer: W) -> Result<(), HarvestError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv<P: AsRef<Path>>(records: &[JobRecord], path: P) -> Result<(), HarvestError> {
    let file = std::fs::File::create(path.as_ref())?;
    write_records(records, io::BufWriter::new(file))?;
    info!("Wrote {} record(s) to {}", records.len(), path.as_ref().display());
    Ok(())
}
