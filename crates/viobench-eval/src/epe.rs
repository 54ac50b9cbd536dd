//! Optical flow end-point-error (EPE) results table.
//!
//! The SEAL optical flow simulator writes one row per sequence with the EPE
//! of the unfiltered `Baseline` and of every edge threshold `N`. The report
//! picks the threshold with the lowest mean EPE, lists the sequences where it
//! moves the EPE by at least `min_difference`, and compares it with the best
//! threshold per sequence.

use crate::config::EpeConfig;
use crate::error::{EvalError, Result};
use crate::table::{round_decimals, Table};
use std::fmt;
use std::path::Path;
use viobench_core::SummaryStats;

pub const BASELINE_COLUMN: &str = "Baseline";
pub const SEQUENCE_COLUMN: &str = "Sequence";

#[derive(Debug, Clone, PartialEq)]
pub struct EpeRow {
    pub sequence: String,
    pub baseline: Option<f64>,
    /// One entry per threshold, in column order.
    pub thresholds: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpeErrors {
    pub thresholds: Vec<String>,
    pub rows: Vec<EpeRow>,
}

fn parse_cell(path: &Path, line: usize, cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse().map(Some).map_err(|_| EvalError::MalformedRow {
        path: path.to_path_buf(),
        line,
        reason: format!("'{cell}' is not a number"),
    })
}

impl EpeErrors {
    /// Reads and validates the simulator CSV.
    ///
    /// Rows are labelled by a `Sequence` column when there is one, by their
    /// index otherwise.
    pub fn read(path: &Path, config: &EpeConfig) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let thresholds = config.threshold_names();
        let mut problems = Vec::new();
        let missing: Vec<&str> = thresholds
            .iter()
            .filter(|t| column(t.as_str()).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            problems.push(format!("missing threshold columns: {}", missing.join(", ")));
        }
        let baseline = column(BASELINE_COLUMN);
        if baseline.is_none() {
            problems.push(format!("missing {BASELINE_COLUMN} column"));
        }
        if !problems.is_empty() {
            return Err(EvalError::MalformedEpeTable {
                path: path.to_path_buf(),
                problems,
            });
        }
        let threshold_columns: Vec<usize> = thresholds.iter().filter_map(|t| column(t.as_str())).collect();
        let sequence_column = column(SEQUENCE_COLUMN);

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let line = record.position().map_or(index + 2, |p| p.line() as usize);
            let field = |c: Option<usize>| c.and_then(|c| record.get(c)).unwrap_or("");
            rows.push(EpeRow {
                sequence: match sequence_column {
                    Some(c) => field(Some(c)).to_string(),
                    None => index.to_string(),
                },
                baseline: parse_cell(path, line, field(baseline))?,
                thresholds: threshold_columns
                    .iter()
                    .map(|&c| parse_cell(path, line, field(Some(c))))
                    .collect::<Result<_>>()?,
            });
        }

        let errors = Self { thresholds, rows };
        errors.validate(path, config)?;
        Ok(errors)
    }

    fn validate(&self, path: &Path, config: &EpeConfig) -> Result<()> {
        let mut problems = Vec::new();
        if self.rows.len() != config.expected_sequences {
            problems.push(format!(
                "expected {} sequences but found {}",
                config.expected_sequences,
                self.rows.len()
            ));
        }
        if self.rows.iter().any(|r| r.thresholds.iter().all(Option::is_none)) {
            problems.push("one or more sequences are missing all threshold values".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EvalError::MalformedEpeTable {
                path: path.to_path_buf(),
                problems,
            })
        }
    }

    /// Index of the threshold with the lowest mean EPE, the first one on ties.
    /// Missing cells are left out of the mean.
    pub fn best_threshold(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for t in 0..self.thresholds.len() {
            let values: Vec<f64> = self.rows.iter().filter_map(|r| r.thresholds[t]).collect();
            let Some(stats) = SummaryStats::from_values(&values) else {
                continue;
            };
            if best.map_or(true, |(_, mean)| stats.mean < mean) {
                best = Some((t, stats.mean));
            }
        }
        best.map(|(t, _)| t)
    }

    pub fn report(&self, min_difference: f64) -> Option<EpeReport> {
        let best = self.best_threshold()?;

        let mut selected = Vec::new();
        let mut all = Vec::new();
        for row in &self.rows {
            let rounded: Vec<Option<f64>> = row
                .thresholds
                .iter()
                .map(|v| v.map(|v| round_decimals(v, 2)))
                .collect();
            // Lowest rounded value, the first threshold reaching it
            let flexible = rounded
                .iter()
                .enumerate()
                .filter_map(|(t, v)| v.map(|v| (t, v)))
                .fold(None, |acc: Option<(usize, f64)>, (t, v)| match acc {
                    Some((_, m)) if m <= v => acc,
                    _ => Some((t, v)),
                });
            let entry = EpeSelection {
                sequence: row.sequence.clone(),
                baseline: row.baseline.map(|v| round_decimals(v, 2)),
                fixed: rounded[best],
                flexible: flexible.map(|(_, v)| v),
                best_threshold: flexible.map(|(t, _)| self.thresholds[t].clone()),
            };

            let moved = match (row.baseline, row.thresholds[best]) {
                (Some(b), Some(f)) => (b - f).abs() >= min_difference,
                _ => false,
            };
            if moved {
                selected.push(entry.clone());
            }
            all.push(entry);
        }

        Some(EpeReport {
            best_threshold: self.thresholds[best].clone(),
            min_difference,
            selected_stats: ColumnSummary::of(&selected),
            global_stats: ColumnSummary::of(&all),
            selected,
        })
    }
}

/// One sequence of the report, values rounded to two decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct EpeSelection {
    pub sequence: String,
    pub baseline: Option<f64>,
    pub fixed: Option<f64>,
    pub flexible: Option<f64>,
    pub best_threshold: Option<String>,
}

/// Mean and population standard deviation of the base, fixed and flexible
/// columns, rounded to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColumnSummary {
    pub base: Option<SummaryStats>,
    pub fixed: Option<SummaryStats>,
    pub flexible: Option<SummaryStats>,
}

impl ColumnSummary {
    fn of(entries: &[EpeSelection]) -> Self {
        let stats = |pick: fn(&EpeSelection) -> Option<f64>| {
            let values: Vec<f64> = entries.iter().filter_map(pick).collect();
            SummaryStats::from_values(&values).map(|s| SummaryStats {
                mean: round_decimals(s.mean, 2),
                std: round_decimals(s.std, 2),
            })
        };
        Self {
            base: stats(|e: &EpeSelection| e.baseline),
            fixed: stats(|e: &EpeSelection| e.fixed),
            flexible: stats(|e: &EpeSelection| e.flexible),
        }
    }

    fn columns(&self) -> [Option<SummaryStats>; 3] {
        [self.base, self.fixed, self.flexible]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpeReport {
    pub best_threshold: String,
    pub min_difference: f64,
    pub selected: Vec<EpeSelection>,
    pub selected_stats: ColumnSummary,
    pub global_stats: ColumnSummary,
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

impl EpeReport {
    /// Selected sequences followed by their Mean and Std Dev rows.
    pub fn table(&self) -> Table {
        let mut table = Table::new([
            "Sequence".to_string(),
            "Base".to_string(),
            format!("Fixed (N = {})", self.best_threshold),
            "Flexible (min)".to_string(),
            "Best N".to_string(),
        ]);
        for entry in &self.selected {
            table.push_row(vec![
                entry.sequence.clone(),
                cell(entry.baseline),
                cell(entry.fixed),
                cell(entry.flexible),
                entry.best_threshold.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
        let columns = self.selected_stats.columns();
        let mut mean = vec!["Mean".to_string()];
        let mut std = vec!["Std Dev".to_string()];
        for stats in columns {
            mean.push(cell(stats.map(|s| s.mean)));
            std.push(cell(stats.map(|s| s.std)));
        }
        mean.push(String::new());
        std.push(String::new());
        table.push_row(mean);
        table.push_row(std);
        table
    }
}

impl fmt::Display for EpeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = &self.best_threshold;
        writeln!(f, "Best threshold (lowest mean EPE across all sequences): N = {n}")?;
        let names: Vec<&str> = self.selected.iter().map(|e| e.sequence.as_str()).collect();
        writeln!(
            f,
            "Selected sequences (|baseline - EPE @ N={n}| >= {}): [{}]",
            self.min_difference,
            names.join(", ")
        )?;
        writeln!(f, "\nSelected Sequences Report:")?;
        writeln!(f, "{}", self.table())?;

        let [base, fixed, flexible] = self.global_stats.columns();
        let pick = |s: Option<SummaryStats>, mean: bool| cell(s.map(|s| if mean { s.mean } else { s.std }));
        writeln!(f, "\nMean (all sequences):")?;
        writeln!(
            f,
            "Base: {}, Fixed: {}, Flexible: {}",
            pick(base, true),
            pick(fixed, true),
            pick(flexible, true)
        )?;
        writeln!(f, "Std Dev (all sequences):")?;
        write!(
            f,
            "Base: {}, Fixed: {}, Flexible: {}",
            pick(base, false),
            pick(fixed, false),
            pick(flexible, false)
        )
    }
}
