//! Pipeline run report.

use refprice_core::{DailySummaryRecord, DailySummaryRow, GroupKey, Result};
use refprice_ingestion::DataQualityIssue;

/// Summary rows of a run plus the data quality issues found on the way in.
#[derive(Debug, Clone, Default)]
pub struct DailyReport {
    pub rows: Vec<DailySummaryRow>,
    pub issues: Vec<DataQualityIssue>,
}

impl DailyReport {
    pub fn new(rows: Vec<DailySummaryRow>, issues: Vec<DataQualityIssue>) -> Self {
        Self { rows, issues }
    }

    /// Flat, column-per-field view of every row.
    pub fn records(&self) -> Vec<DailySummaryRecord> {
        self.rows.iter().map(DailySummaryRow::to_record).collect()
    }

    /// Number of groups with a morning matching price.
    pub fn morning_found(&self) -> usize {
        self.rows.iter().filter(|r| r.morning.is_some()).count()
    }

    /// Number of groups with a closing matching price.
    pub fn closing_found(&self) -> usize {
        self.rows.iter().filter(|r| r.closing.is_some()).count()
    }

    /// Groups where neither matching price was found.
    pub fn empty_groups(&self) -> impl Iterator<Item = &DailySummaryRow> {
        self.rows.iter().filter(|r| r.is_empty())
    }

    /// Data quality issues attributed to one group.
    pub fn issues_for<'a>(&'a self, key: &'a GroupKey) -> impl Iterator<Item = &'a DataQualityIssue> {
        self.issues.iter().filter(move |i| {
            i.day == Some(key.day) && i.instrument.as_deref() == Some(key.instrument.as_str())
        })
    }

    /// Serialize the flat records as a JSON array.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.records())?)
    }
}
