//! Roster CSV input and output.
//!
//! Columns are located by header name; everything else passes through
//! untouched, and the tag and subdomain columns are appended when absent.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::config::RosterConfig;
use crate::domain_utils::DomainRule;
use crate::record::{split_cell, OrganizationRecord, RecordStatus};

const JOIN_SEPARATOR: &str = ", ";

pub struct Roster {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    organization_idx: Option<usize>,
    website_idx: usize,
    tag_idx: usize,
    subdomain_idx: usize,
    no_website_sentinel: String,
}

impl Roster {
    pub fn load(path: &Path, config: &RosterConfig) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read roster file: {}", path.display()))?;
        Self::parse(&content, config).with_context(|| format!("Invalid roster file: {}", path.display()))
    }

    pub fn parse(content: &str, config: &RosterConfig) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let website_idx = match find_column(&headers, &config.website_column) {
            Some(idx) => idx,
            None => bail!("CSV must have a '{}' column", config.website_column),
        };
        let organization_idx = find_column(&headers, &config.organization_column);
        let loaded_width = headers.len();
        let tag_idx = find_or_append(&mut headers, &config.tag_column);
        let subdomain_idx = find_or_append(&mut headers, &config.subdomain_column);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.context("Failed to parse CSV record")?;
            let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
            // Cells beyond the header row are kept after any appended columns
            let overflow = if row.len() > loaded_width {
                row.split_off(loaded_width)
            } else {
                Vec::new()
            };
            row.resize(headers.len(), String::new());
            row.extend(overflow);
            rows.push(row);
        }

        Ok(Self {
            headers,
            rows,
            organization_idx,
            website_idx,
            tag_idx,
            subdomain_idx,
            no_website_sentinel: config.no_website_sentinel.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Build one record per data row
    pub fn records(&self, rule: DomainRule) -> Vec<OrganizationRecord> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                let organization = self
                    .organization_idx
                    .map(|idx| cells[idx].trim().to_string())
                    .unwrap_or_default();
                OrganizationRecord::new(
                    row,
                    organization,
                    cells[self.website_idx].as_str(),
                    split_cell(&cells[self.tag_idx]),
                    split_cell(&cells[self.subdomain_idx]),
                    &self.no_website_sentinel,
                    rule,
                )
            })
            .collect()
    }

    /// Write merged values back. Rows that were not processed keep their
    /// tag and subdomain cells as loaded.
    pub fn apply(&mut self, records: &[OrganizationRecord]) {
        for record in records {
            let Some(cells) = self.rows.get_mut(record.row) else {
                continue;
            };
            cells[self.website_idx] = record.website.clone();

            if record.status == RecordStatus::Processed {
                cells[self.tag_idx] = record.merged_tag_ids.join(JOIN_SEPARATOR);
                cells[self.subdomain_idx] = record.merged_subdomains.join(JOIN_SEPARATOR);
            }
        }
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
        writer.write_record(&self.headers).context("Failed to write CSV headers")?;
        for row in &self.rows {
            writer.write_record(row).context("Failed to write CSV record")?;
        }
        let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
        String::from_utf8(bytes).context("CSV output is not valid UTF-8")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = self.to_csv_string()?;
        std::fs::write(path, content).with_context(|| format!("Failed to write output file: {}", path.display()))
    }
}

/// `<stem>_updated.csv` next to the input file
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "roster".to_string());
    input.with_file_name(format!("{}_updated.csv", stem))
}

/// Header comparison: trimmed, case-insensitive, runs of whitespace collapsed
fn normalize_header(header: &str) -> String {
    header.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn find_column(headers: &[String], name: &str) -> Option<usize> {
    let wanted = normalize_header(name);
    headers.iter().position(|h| normalize_header(h) == wanted)
}

fn find_or_append(headers: &mut Vec<String>, name: &str) -> usize {
    match find_column(headers, name) {
        Some(idx) => idx,
        None => {
            headers.push(name.to_string());
            headers.len() - 1
        }
    }
}
