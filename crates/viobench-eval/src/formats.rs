//! Readers for ground-truth and estimated trajectory files.
//!
//! - EuRoC ground truth: `#timestamp [ns], x, y, z, qw, qx, qy, qz, ...`
//! - HybVIO output: one JSON object per line with `time`, `position`, `orientation`
//! - VINS-Mono output: headerless CSV `ns, x, y, z, qx, qy, qz, qw, [vx, vy, vz,]`

use crate::error::{EvalError, Result};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use viobench_core::{Trajectory, TrajectorySample};

const NANOS_PER_SECOND: f64 = 1e9;

/// How ground-truth timestamps are expressed after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBase {
    /// Seconds since the first row of the file.
    Relative,
    /// Seconds since the epoch of the recording clock.
    Absolute,
}

// ---------------------------------------------------------------------------
// Shared JSON records
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Position> for Vector3<f64> {
    fn from(p: Position) -> Self {
        Vector3::new(p.x, p.y, p.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Orientation> for UnitQuaternion<f64> {
    fn from(q: Orientation) -> Self {
        UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z))
    }
}

/// One line of a HybVIO trajectory file. Other keys are ignored.
#[derive(Debug, Deserialize)]
struct PoseRecord {
    time: f64,
    position: Position,
    #[serde(default)]
    orientation: Option<Orientation>,
}

// ---------------------------------------------------------------------------
// EuRoC ground truth
// ---------------------------------------------------------------------------
/// Reads EuRoC ground truth. The first row is always the header, whether or
/// not it starts with `#`.
pub fn read_euroc_ground_truth(path: &Path, time_base: TimeBase) -> Result<Trajectory> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut first_ns: Option<i64> = None;
    let mut samples = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = record.position().map_or(i + 1, |p| p.line() as usize);
        if record.len() < 4 {
            return Err(malformed(path, line, format!("expected at least 4 columns, got {}", record.len())));
        }

        let ns: i64 = record[0]
            .parse()
            .map_err(|_| malformed(path, line, format!("bad timestamp '{}'", &record[0])))?;
        let time = match time_base {
            TimeBase::Relative => {
                let t0 = *first_ns.get_or_insert(ns);
                (ns - t0) as f64 / NANOS_PER_SECOND
            }
            TimeBase::Absolute => ns as f64 / NANOS_PER_SECOND,
        };

        let v = parse_floats(path, line, &record, 1, record.len().min(8))?;
        let mut sample = TrajectorySample::new(time, Vector3::new(v[0], v[1], v[2]));
        if v.len() == 7 {
            let q = Quaternion::new(v[3], v[4], v[5], v[6]);
            sample = sample.with_orientation(UnitQuaternion::new_normalize(q));
        }
        samples.push(sample);
    }
    Ok(Trajectory::new(samples)?)
}

// ---------------------------------------------------------------------------
// HybVIO JSONL
// ---------------------------------------------------------------------------
/// Reads a HybVIO trajectory. With `skip_negative_time`, records stamped
/// before the first camera frame are dropped.
pub fn read_hybvio_jsonl(path: &Path, skip_negative_time: bool) -> Result<Trajectory> {
    let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut samples = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EvalError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: PoseRecord = serde_json::from_str(&line).map_err(|source| EvalError::Json {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        if skip_negative_time && record.time < 0.0 {
            continue;
        }
        let mut sample = TrajectorySample::new(record.time, record.position.into());
        if let Some(q) = record.orientation {
            sample = sample.with_orientation(q.into());
        }
        samples.push(sample);
    }
    Ok(Trajectory::new(samples)?)
}

// ---------------------------------------------------------------------------
// VINS-Mono CSV
// ---------------------------------------------------------------------------
/// Reads a VINS-Mono result file. Timestamps are converted to seconds but
/// kept absolute so they line up with absolute ground truth.
pub fn read_vins_csv(path: &Path) -> Result<Trajectory> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut samples = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = record.position().map_or(i + 1, |p| p.line() as usize);
        // 12 columns carry velocities, 9 do not; both end with an empty column
        // left by the trailing comma
        if record.len() != 9 && record.len() != 12 {
            return Err(malformed(path, line, format!("expected 9 or 12 columns, got {}", record.len())));
        }

        let ns: f64 = record[0]
            .parse()
            .map_err(|_| malformed(path, line, format!("bad timestamp '{}'", &record[0])))?;
        let v = parse_floats(path, line, &record, 1, 8)?;
        let q = Quaternion::new(v[6], v[3], v[4], v[5]);
        samples.push(
            TrajectorySample::new(ns / NANOS_PER_SECOND, Vector3::new(v[0], v[1], v[2]))
                .with_orientation(UnitQuaternion::new_normalize(q)),
        );
    }
    Ok(Trajectory::new(samples)?)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------
fn parse_floats(
    path: &Path,
    line: usize,
    record: &csv::StringRecord,
    start: usize,
    end: usize,
) -> Result<Vec<f64>> {
    (start..end)
        .map(|i| {
            record[i]
                .parse::<f64>()
                .map_err(|_| malformed(path, line, format!("column {} is not a number: '{}'", i, &record[i])))
        })
        .collect()
}

fn malformed(path: &Path, line: usize, reason: String) -> EvalError {
    EvalError::MalformedRow {
        path: path.to_path_buf(),
        line,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const EUROC_GT: &str = "\
#timestamp, p_RS_R_x [m], p_RS_R_y [m], p_RS_R_z [m], q_RS_w [], q_RS_x [], q_RS_y [], q_RS_z [], v_RS_R_x [m s^-1]
1403636580838555648,4.688319,-1.786938,0.783338,0.534108,-0.153029,-0.827383,-0.082152,-0.027876
1403636580843555328,4.688177,-1.786770,0.787350,0.534640,-0.152990,-0.826976,-0.082863,-0.029272
1403636580848555520,4.688028,-1.786598,0.791382,0.535178,-0.152945,-0.826562,-0.083605,-0.030644
";

    #[test]
    fn test_ground_truth_relative_time() {
        let file = write_temp(EUROC_GT);
        let gt = read_euroc_ground_truth(file.path(), TimeBase::Relative).unwrap();
        assert_eq!(gt.len(), 3);
        let times = gt.times();
        assert_eq!(times[0], 0.0);
        assert!((times[1] - 0.004999680).abs() < 1e-9);
        assert!((times[2] - 0.009999872).abs() < 1e-9);

        let first = gt.samples()[0];
        assert!((first.position - Vector3::new(4.688319, -1.786938, 0.783338)).norm() < 1e-12);
        let q = first.orientation.unwrap();
        assert!((q.w - 0.534108).abs() < 1e-3);
    }

    #[test]
    fn test_ground_truth_absolute_time() {
        let file = write_temp(EUROC_GT);
        let gt = read_euroc_ground_truth(file.path(), TimeBase::Absolute).unwrap();
        assert!((gt.times()[0] - 1403636580.838555648).abs() < 1e-5);
    }

    #[test]
    fn test_ground_truth_bad_timestamp() {
        let file = write_temp("#header\nabc,1,2,3\n");
        let err = read_euroc_ground_truth(file.path(), TimeBase::Relative).unwrap_err();
        assert!(matches!(err, EvalError::MalformedRow { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_ground_truth_plain_header_is_skipped() {
        let file = write_temp("timestamp,x,y,z\n1000000000,1,2,3\n1500000000,2,3,4\n");
        let gt = read_euroc_ground_truth(file.path(), TimeBase::Relative).unwrap();
        assert_eq!(gt.times(), vec![0.0, 0.5]);
        assert_eq!(gt.samples()[0].position, Vector3::new(1.0, 2.0, 3.0));
        assert!(gt.samples()[0].orientation.is_none());
    }

    #[test]
    fn test_hybvio_jsonl() {
        let file = write_temp(
            r#"{"time":-0.05,"position":{"x":0.0,"y":0.0,"z":0.0},"orientation":{"w":1.0,"x":0.0,"y":0.0,"z":0.0}}
{"time":0.0,"position":{"x":1.0,"y":2.0,"z":3.0},"orientation":{"w":1.0,"x":0.0,"y":0.0,"z":0.0},"velocity":{"x":0.0,"y":0.0,"z":0.0}}

{"time":0.1,"position":{"x":1.5,"y":2.5,"z":3.5}}
"#,
        );
        let all = read_hybvio_jsonl(file.path(), false).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.times(), vec![-0.05, 0.0, 0.1]);
        assert!(all.samples()[2].orientation.is_none());

        let non_negative = read_hybvio_jsonl(file.path(), true).unwrap();
        assert_eq!(non_negative.times(), vec![0.0, 0.1]);
        assert_eq!(non_negative.samples()[0].position, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_hybvio_jsonl_reports_line() {
        let file = write_temp("{\"time\":0.0,\"position\":{\"x\":1,\"y\":2,\"z\":3}}\n{\"time\":\n");
        let err = read_hybvio_jsonl(file.path(), false).unwrap_err();
        assert!(matches!(err, EvalError::Json { line: 2, .. }), "{err}");
    }

    #[test]
    fn test_vins_csv_both_layouts() {
        let file = write_temp(
            "1403636580838555648,1.0,2.0,3.0,0.0,0.0,0.0,1.0,\n\
             1403636580888555648,1.1,2.1,3.1,0.0,0.0,0.0,1.0,0.1,0.2,0.3,\n",
        );
        let est = read_vins_csv(file.path()).unwrap();
        assert_eq!(est.len(), 2);
        assert!((est.times()[0] - 1403636580.838555648).abs() < 1e-5);
        assert!((est.times()[1] - est.times()[0] - 0.05).abs() < 1e-5);
        assert_eq!(est.samples()[1].position, Vector3::new(1.1, 2.1, 3.1));
        let q = est.samples()[0].orientation.unwrap();
        assert!(q.angle_to(&UnitQuaternion::identity()) < 1e-12);
    }

    #[test]
    fn test_vins_csv_rejects_other_widths() {
        let file = write_temp("1,2,3,4\n");
        assert!(matches!(
            read_vins_csv(file.path()).unwrap_err(),
            EvalError::MalformedRow { .. }
        ));
    }
}
