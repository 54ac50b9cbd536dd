//! Paper-style result tables rendered as text grids.

use std::fmt;
use viobench_core::SummaryStats;

/// Rounds to `decimals` places on the exact binary value, ties to even.
pub fn round_decimals(value: f64, decimals: usize) -> f64 {
    format!("{value:.decimals$}").parse().unwrap_or(value)
}

/// RMSE in meters rounded to whole centimetres, the precision the paper reports.
/// The meters are rounded to two places first, so `0.045` gives 4 cm.
pub fn centimetres(meters: f64) -> f64 {
    (round_decimals(meters, 2) * 100.0).round()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn columns(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row].get(col).map_or("", String::as_str)
    }

    /// A column is numeric when every non-empty cell parses as a number.
    fn is_numeric(&self, col: usize) -> bool {
        let mut cells = (0..self.rows.len())
            .map(|r| self.cell(r, col))
            .filter(|c| !c.is_empty())
            .peekable();
        cells.peek().is_some() && cells.all(|c| c.parse::<f64>().is_ok())
    }

    /// Grid layout: `+---+` rules between rows, `+===+` under the header,
    /// numbers right-aligned and text left-aligned.
    pub fn render_grid(&self) -> String {
        let n = self.columns();
        let numeric: Vec<bool> = (0..n).map(|c| self.is_numeric(c)).collect();
        let widths: Vec<usize> = (0..n)
            .map(|c| {
                let header = self.headers.get(c).map_or(0, |h| h.chars().count() + 2);
                (0..self.rows.len())
                    .map(|r| self.cell(r, c).chars().count())
                    .fold(header, usize::max)
            })
            .collect();

        let rule = |fill: char| {
            let mut line = String::from("+");
            for w in &widths {
                line.extend(std::iter::repeat(fill).take(w + 2));
                line.push('+');
            }
            line
        };
        let line = |cells: Vec<&str>| {
            let mut out = String::from("|");
            for (c, &w) in widths.iter().enumerate() {
                let cell = cells.get(c).copied().unwrap_or("");
                if numeric[c] {
                    out += &format!(" {cell:>w$} |");
                } else {
                    out += &format!(" {cell:<w$} |");
                }
            }
            out
        };

        let mut lines = vec![rule('-')];
        lines.push(line(self.headers.iter().map(String::as_str).collect()));
        lines.push(rule('='));
        for row in &self.rows {
            lines.push(line(row.iter().map(String::as_str).collect()));
            lines.push(rule('-'));
        }
        if self.rows.is_empty() {
            // Header-only table closes with a plain rule
            lines.pop();
            lines.push(rule('-'));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_grid())
    }
}

fn summary_rows(columns: &[Vec<f64>]) -> [Vec<String>; 2] {
    let mut mean = vec!["Mean".to_string()];
    let mut std = vec!["Std Dev".to_string()];
    for values in columns {
        match SummaryStats::from_values(values) {
            Some(s) => {
                mean.push(format!("{:.1}", s.mean));
                std.push(format!("{:.1}", s.std));
            }
            None => {
                mean.push(String::new());
                std.push(String::new());
            }
        }
    }
    [mean, std]
}

/// One row per sequence with a single RMSE column in centimetres. Mean and
/// population standard deviation follow once there are `min_summary_rows`
/// sequences.
pub fn single_column_table(column: &str, results: &[(String, f64)], min_summary_rows: usize) -> Table {
    let mut table = Table::new(["Sequence (cm)", column]);
    let values: Vec<f64> = results.iter().map(|(_, m)| centimetres(*m)).collect();
    for ((sequence, _), cm) in results.iter().zip(&values) {
        table.push_row(vec![sequence.clone(), format!("{cm:.1}")]);
    }
    if !values.is_empty() && values.len() >= min_summary_rows {
        let [mean, std] = summary_rows(&[values]);
        table.push_row(mean);
        table.push_row(std);
    }
    table
}

/// Sequences down, thresholds across, plus the best (lowest) value per
/// sequence. `values[t][s]` is the RMSE in meters of sequence `s` under
/// threshold `t`; missing runs show as `-` and are left out of the summary.
pub fn threshold_table(thresholds: &[String], sequences: &[String], values: &[Vec<Option<f64>>]) -> Table {
    let mut headers = vec!["Sequence (cm)".to_string()];
    headers.extend(thresholds.iter().cloned());
    headers.push("Best".to_string());
    let mut table = Table::new(headers);

    let mut columns = vec![Vec::new(); thresholds.len() + 1];
    for (s, sequence) in sequences.iter().enumerate() {
        let mut row = vec![sequence.clone()];
        let mut best: Option<f64> = None;
        for (t, column) in columns.iter_mut().take(thresholds.len()).enumerate() {
            match values.get(t).and_then(|v| v.get(s)).copied().flatten() {
                Some(meters) => {
                    let cm = centimetres(meters);
                    row.push(format!("{cm:.1}"));
                    column.push(cm);
                    best = Some(best.map_or(cm, |b| b.min(cm)));
                }
                None => row.push("-".to_string()),
            }
        }
        match best {
            Some(b) => {
                row.push(format!("{b:.1}"));
                columns[thresholds.len()].push(b);
            }
            None => row.push("-".to_string()),
        }
        table.push_row(row);
    }

    let [mean, std] = summary_rows(&columns);
    table.push_row(mean);
    table.push_row(std);
    table
}
