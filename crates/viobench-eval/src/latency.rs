//! Per-frame latency from HybVIO timing logs.
//!
//! HybVIO run with `-timer=true` ends its log with a block like
//!
//! ```text
//! Odometry Per-frame average timings [ms]:
//!   findKeypoints           1.234
//!   compute Optical Flow    0.567
//!   ...
//! FRAMES 2000
//! ```
//!
//! Names lose their inner spaces, so `compute Optical Flow` reads as
//! `computeOpticalFlow`.

use crate::error::{EvalError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::ops::{Add, AddAssign, Div};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ODOMETRY_SECTION_HEADER: &str = "Odometry Per-frame average timings [ms]:";
pub const MAIN_SECTION_HEADER: &str = "Main Per-frame average timings [ms]:";
const SECTION_END_MARKER: &str = "FRAMES";

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrontendTimings {
    pub find_keypoints: f64,
    pub compute_optical_flow: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BackendTimings {
    pub do_ransac2: f64,
    pub do_ransac5: f64,
    pub tracker_visual_update: f64,
    pub kf_predict: f64,
}

/// One log's timings, or a sum/average of several.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyBreakdown {
    pub frontend: FrontendTimings,
    pub backend: BackendTimings,
}

impl Add for FrontendTimings {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self {
            find_keypoints: self.find_keypoints + o.find_keypoints,
            compute_optical_flow: self.compute_optical_flow + o.compute_optical_flow,
        }
    }
}

impl Div<f64> for FrontendTimings {
    type Output = Self;

    fn div(self, d: f64) -> Self {
        Self {
            find_keypoints: self.find_keypoints / d,
            compute_optical_flow: self.compute_optical_flow / d,
        }
    }
}

impl Add for BackendTimings {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self {
            do_ransac2: self.do_ransac2 + o.do_ransac2,
            do_ransac5: self.do_ransac5 + o.do_ransac5,
            tracker_visual_update: self.tracker_visual_update + o.tracker_visual_update,
            kf_predict: self.kf_predict + o.kf_predict,
        }
    }
}

impl Div<f64> for BackendTimings {
    type Output = Self;

    fn div(self, d: f64) -> Self {
        Self {
            do_ransac2: self.do_ransac2 / d,
            do_ransac5: self.do_ransac5 / d,
            tracker_visual_update: self.tracker_visual_update / d,
            kf_predict: self.kf_predict / d,
        }
    }
}

impl Add for LatencyBreakdown {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self {
            frontend: self.frontend + o.frontend,
            backend: self.backend + o.backend,
        }
    }
}

impl AddAssign for LatencyBreakdown {
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl Div<f64> for LatencyBreakdown {
    type Output = Self;

    fn div(self, d: f64) -> Self {
        Self {
            frontend: self.frontend / d,
            backend: self.backend / d,
        }
    }
}

impl LatencyBreakdown {
    /// Missing entries count as zero.
    pub fn from_timings(timings: &HashMap<String, f64>) -> Self {
        let get = |name: &str| timings.get(name).copied().unwrap_or(0.0);
        Self {
            frontend: FrontendTimings {
                find_keypoints: get("findKeypoints"),
                compute_optical_flow: get("computeOpticalFlow"),
            },
            backend: BackendTimings {
                do_ransac2: get("doRansac2"),
                do_ransac5: get("doRansac5"),
                tracker_visual_update: get("trackerVisualUpdate"),
                kf_predict: get("KFpredict"),
            },
        }
    }

    pub fn paper(&self) -> PaperLatency {
        PaperLatency {
            keypoint_detection: self.frontend.find_keypoints,
            keypoint_tracking: self.frontend.compute_optical_flow,
            ransac: self.backend.do_ransac2 + self.backend.do_ransac5,
            backend: self.backend.tracker_visual_update + self.backend.kf_predict,
        }
    }
}

/// The four columns of the latency table, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaperLatency {
    pub keypoint_detection: f64,
    pub keypoint_tracking: f64,
    pub ransac: f64,
    pub backend: f64,
}

impl fmt::Display for PaperLatency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Keypoint Detection (KD): {:.4} ms", self.keypoint_detection)?;
        writeln!(f, "  Keypoint Tracking (KT): {:.4} ms", self.keypoint_tracking)?;
        writeln!(f, "  RANSAC: {:.4} ms", self.ransac)?;
        write!(f, "  Backend (BE): {:.4} ms", self.backend)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------
/// Entries of one timing section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingSection {
    /// Keyed by name without spaces.
    pub values: HashMap<String, f64>,
    /// 1-based log lines that looked like entries but held no number.
    pub rejected_lines: Vec<usize>,
}

pub struct TimingParser {
    line: Regex,
}

impl TimingParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            line: Regex::new(r"^\s+([\w\s]+)\s+([\d.]+)$")?,
        })
    }

    /// The odometry section, or `None` when the log has none.
    pub fn parse_section(&self, log: &str) -> Option<TimingSection> {
        self.parse_named_section(log, ODOMETRY_SECTION_HEADER)
    }

    /// Entries following `header` up to and including the `FRAMES` line.
    pub fn parse_named_section(&self, log: &str, header: &str) -> Option<TimingSection> {
        let start = log.find(header)? + header.len();
        // Line of the header itself; the first item below is its remainder
        let header_line = log[..start].lines().count();
        let mut section = TimingSection::default();
        for (i, line) in log[start..].lines().enumerate() {
            if let Some(caps) = self.line.captures(line) {
                let name: String = caps[1].split_whitespace().collect();
                match caps[2].parse::<f64>() {
                    Ok(value) => {
                        section.values.insert(name, value);
                    }
                    Err(_) => section.rejected_lines.push(header_line + i),
                }
            }
            if line.contains(SECTION_END_MARKER) {
                break;
            }
        }
        Some(section)
    }

    pub fn parse_file(&self, path: &Path) -> Result<LatencyBreakdown> {
        let log = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let section = self
            .parse_section(&log)
            .ok_or_else(|| EvalError::MissingLatencySection(path.to_path_buf()))?;
        for line in &section.rejected_lines {
            warn!(file = %path.display(), line, "Ignoring timing entry without a valid number");
        }
        debug!(file = %path.display(), entries = section.values.len(), "Parsed timings");
        Ok(LatencyBreakdown::from_timings(&section.values))
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    /// `<root>/<sequence>/stdout` does not exist.
    MissingDirectory,
    /// No log in the directory could be parsed.
    NoExperiments,
    Measured {
        experiments: usize,
        average: LatencyBreakdown,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceLatency {
    pub sequence: String,
    pub outcome: SequenceOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyReport {
    pub sequences: Vec<SequenceLatency>,
    /// Average over every parsed log of every sequence.
    pub overall: Option<LatencyBreakdown>,
    /// Logs that failed to parse.
    pub failures: Vec<(PathBuf, String)>,
}

impl LatencyReport {
    /// Reads `<root>/<sequence>/stdout/*.txt` for every sequence.
    pub fn collect(root: &Path, sequences: &[String]) -> Result<Self> {
        let parser = TimingParser::new()?;
        let mut report = Self::default();
        let mut overall_total = LatencyBreakdown::default();
        let mut overall_count = 0usize;

        for sequence in sequences {
            let dir = root.join(sequence).join("stdout");
            if !dir.is_dir() {
                report.sequences.push(SequenceLatency {
                    sequence: sequence.clone(),
                    outcome: SequenceOutcome::MissingDirectory,
                });
                continue;
            }

            let mut logs: Vec<PathBuf> = fs::read_dir(&dir)
                .map_err(|e| EvalError::io(&dir, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
                .collect();
            logs.sort();

            let mut total = LatencyBreakdown::default();
            let mut count = 0usize;
            for log in logs {
                match parser.parse_file(&log) {
                    Ok(timings) => {
                        total += timings;
                        count += 1;
                    }
                    Err(e) => {
                        warn!(sequence = %sequence, "Error processing {}: {e}", log.display());
                        report.failures.push((log, e.to_string()));
                    }
                }
            }

            let outcome = if count == 0 {
                SequenceOutcome::NoExperiments
            } else {
                overall_total += total;
                overall_count += count;
                SequenceOutcome::Measured {
                    experiments: count,
                    average: total / count as f64,
                }
            };
            report.sequences.push(SequenceLatency {
                sequence: sequence.clone(),
                outcome,
            });
        }

        if overall_count > 0 {
            report.overall = Some(overall_total / overall_count as f64);
        }
        Ok(report)
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.sequences {
            match &entry.outcome {
                SequenceOutcome::MissingDirectory => {
                    writeln!(f, "Directory not found for sequence: {}", entry.sequence)?
                }
                SequenceOutcome::NoExperiments => {
                    writeln!(f, "No valid experiments found for sequence: {}", entry.sequence)?
                }
                SequenceOutcome::Measured { average, .. } => {
                    writeln!(f, "Sequence: {}", entry.sequence)?;
                    writeln!(f, "{}", average.paper())?;
                    writeln!(f)?;
                }
            }
        }
        match &self.overall {
            Some(overall) => {
                writeln!(f, "Overall Averages Across All Sequences:")?;
                write!(f, "{}", overall.paper())
            }
            None => write!(f, "No valid experiments found across all sequences."),
        }
    }
}
