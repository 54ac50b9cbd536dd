//! Converts a raw EuRoC recording (the `mav0/` ASL layout) into the benchmark
//! layout HybVIO reads:
//!
//! - `data.jsonl`: ground truth, gyroscope, accelerometer and frame entries
//!   sorted by time, which starts at the first ground-truth sample
//! - `data.mp4` (and `data2.mp4` for stereo): lossless H.264 of the PNG frames
//! - `info.json`, `parameters.txt`: tags and camera calibration

use crate::error::{EvalError, Result};
use crate::formats::{Orientation, Position};
use crate::fsutil::{list_names, write_json_pretty};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::{debug, info, warn};

const VIDEO_FPS: u32 = 20;
const HIDDEN_SUFFIX: &str = "_hdn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisionKind {
    #[default]
    Stereo,
    Cam0,
    Cam1,
}

impl VisionKind {
    pub fn is_stereo(&self) -> bool {
        matches!(self, Self::Stereo)
    }
}

impl fmt::Display for VisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stereo => "stereo",
            Self::Cam0 => "cam0",
            Self::Cam1 => "cam1",
        })
    }
}

impl FromStr for VisionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "stereo" => Ok(Self::Stereo),
            "cam0" => Ok(Self::Cam0),
            "cam1" => Ok(Self::Cam1),
            other => Err(format!("unknown camera setup '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// data.jsonl records
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraParameters {
    pub focal_length_x: f64,
    pub focal_length_y: f64,
    pub principal_point_x: f64,
    pub principal_point_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub camera_ind: u8,
    pub camera_parameters: CameraParameters,
    pub time: f64,
    /// Only set for monocular frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundTruth {
    pub position: Position,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Gyroscope,
    Accelerometer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorData {
    #[serde(rename = "type")]
    pub kind: SensorType,
    pub values: [f64; 3],
}

/// One line of `data.jsonl`. Exactly one of `frames`, `ground_truth` and
/// `sensor` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetEntry {
    pub time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<Frame>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<GroundTruth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorData>,
}

impl DatasetEntry {
    fn at(time: f64) -> Self {
        Self {
            time,
            number: None,
            frames: None,
            ground_truth: None,
            sensor: None,
        }
    }
}

// ---------------------------------------------------------------------------
// sensor.yaml
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
struct MatrixData {
    data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct RawCameraSensor {
    intrinsics: Vec<f64>,
    distortion_coefficients: Vec<f64>,
    #[serde(rename = "T_BS")]
    t_bs: MatrixData,
}

/// Calibration of one camera from its `sensor.yaml`.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSensor {
    /// fx, fy, cx, cy
    pub intrinsics: [f64; 4],
    pub distortion: [f64; 3],
    /// Body-to-sensor transform, row-major.
    pub t_bs: Matrix4<f64>,
}

impl CameraSensor {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let raw: RawCameraSensor =
            serde_yaml::from_str(crate::config::strip_yaml_directive(&text))?;
        let invalid = |reason: String| EvalError::InvalidCalibration {
            path: path.to_path_buf(),
            reason,
        };

        if raw.intrinsics.len() < 4 {
            return Err(invalid(format!("{} intrinsics, expected 4", raw.intrinsics.len())));
        }
        if raw.distortion_coefficients.len() < 3 {
            return Err(invalid(format!(
                "{} distortion coefficients, expected at least 3",
                raw.distortion_coefficients.len()
            )));
        }
        if raw.t_bs.data.len() != 16 {
            return Err(invalid(format!("T_BS has {} entries, expected 16", raw.t_bs.data.len())));
        }

        let i = &raw.intrinsics;
        let d = &raw.distortion_coefficients;
        Ok(Self {
            intrinsics: [i[0], i[1], i[2], i[3]],
            distortion: [d[0], d[1], d[2]],
            t_bs: Matrix4::from_row_slice(&raw.t_bs.data),
        })
    }

    pub fn camera_parameters(&self) -> CameraParameters {
        CameraParameters {
            focal_length_x: self.intrinsics[0],
            focal_length_y: self.intrinsics[1],
            principal_point_x: self.intrinsics[2],
            principal_point_y: self.intrinsics[3],
        }
    }

    /// Inverse of `T_BS` (sensor to IMU), column-major and comma separated.
    pub fn imu_to_camera(&self) -> Option<String> {
        let inverse = self.t_bs.try_inverse()?;
        Some(join(inverse.as_slice()))
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(",")
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------
pub struct BenchmarkConverter {
    pub name: String,
    /// Folder holding `mav0/`.
    pub raw_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Run ffmpeg. Off only where the videos are not needed.
    pub encode_video: bool,
}

impl BenchmarkConverter {
    pub fn new(name: &str, raw_dir: &Path, output_dir: &Path) -> Self {
        Self {
            name: name.to_string(),
            raw_dir: raw_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            encode_video: true,
        }
    }

    /// Mono output goes to `<output_dir>-cam0` / `-cam1`.
    pub fn output_dir_for(&self, kind: VisionKind) -> PathBuf {
        if kind.is_stereo() {
            return self.output_dir.clone();
        }
        let mut dir = OsString::from(self.output_dir.as_os_str());
        dir.push(format!("-{kind}"));
        PathBuf::from(dir)
    }

    fn mav0(&self, rest: &str) -> PathBuf {
        self.raw_dir.join("mav0").join(rest)
    }

    pub fn convert(&self, kind: VisionKind) -> Result<PathBuf> {
        let output_dir = self.output_dir_for(kind);
        fs::create_dir_all(&output_dir).map_err(|e| EvalError::io(&output_dir, e))?;

        let (mut entries, t0_ns) = self.read_ground_truth_and_imu()?;

        let sensor0 = CameraSensor::load(&self.mav0("cam0/sensor.yaml"))?;
        let sensor1 = CameraSensor::load(&self.mav0("cam1/sensor.yaml"))?;

        let stamps = self.frame_timestamps(kind)?;
        debug!(frames = stamps.len(), "Collected frame timestamps");
        let primary = if kind == VisionKind::Cam1 { &sensor1 } else { &sensor0 };
        entries.extend(frame_entries(
            &stamps,
            t0_ns,
            primary.camera_parameters(),
            kind.is_stereo().then(|| sensor1.camera_parameters()),
        ));
        entries.sort_by(|a, b| a.time.total_cmp(&b.time));
        write_jsonl(&output_dir.join("data.jsonl"), &entries)?;

        if self.encode_video {
            self.encode_videos(kind, &output_dir)?;
        }

        write_json_pretty(
            &output_dir.join("info.json"),
            &serde_json::json!({ "tags": ["euroc"] }),
        )?;
        let parameters = parameters_text(kind, &sensor0, &sensor1).ok_or_else(|| {
            EvalError::InvalidCalibration {
                path: self.raw_dir.join("mav0"),
                reason: "T_BS is not invertible".to_string(),
            }
        })?;
        let path = output_dir.join("parameters.txt");
        fs::write(&path, parameters).map_err(|e| EvalError::io(&path, e))?;

        info!("{} conversion to benchmark format complete.", self.name);
        Ok(output_dir)
    }

    /// Ground truth and IMU entries, plus the first ground-truth stamp in ns
    /// which is time zero for everything.
    fn read_ground_truth_and_imu(&self) -> Result<(Vec<DatasetEntry>, i64)> {
        let gt_path = self.mav0("state_groundtruth_estimate0/data.csv");
        let gt_rows = read_rows(&gt_path, 7)?;
        let t0_ns = gt_rows
            .first()
            .map(|(ns, _)| *ns)
            .ok_or_else(|| EvalError::MissingFile(gt_path.clone()))?;
        let seconds = |ns: i64| (ns - t0_ns) as f64 / 1e9;

        let mut entries = Vec::with_capacity(gt_rows.len());
        for (ns, v) in gt_rows {
            entries.push(DatasetEntry {
                ground_truth: Some(GroundTruth {
                    position: Position { x: v[0], y: v[1], z: v[2] },
                    orientation: Orientation { w: v[3], x: v[4], y: v[5], z: v[6] },
                }),
                ..DatasetEntry::at(seconds(ns))
            });
        }

        for (ns, v) in read_rows(&self.mav0("imu0/data.csv"), 6)? {
            let time = seconds(ns);
            entries.push(DatasetEntry {
                sensor: Some(SensorData {
                    kind: SensorType::Gyroscope,
                    values: [v[0], v[1], v[2]],
                }),
                ..DatasetEntry::at(time)
            });
            entries.push(DatasetEntry {
                sensor: Some(SensorData {
                    kind: SensorType::Accelerometer,
                    values: [v[3], v[4], v[5]],
                }),
                ..DatasetEntry::at(time)
            });
        }
        Ok((entries, t0_ns))
    }

    /// Sorted frame stamps in ns. For stereo, frames present in only one
    /// camera are renamed with a `_hdn` suffix so neither the stamps nor the
    /// video pick them up.
    fn frame_timestamps(&self, kind: VisionKind) -> Result<Vec<i64>> {
        let is_png = |p: &Path| p.extension().is_some_and(|e| e == "png");
        let names = match kind {
            VisionKind::Stereo => {
                let dir0 = self.mav0("cam0/data");
                let dir1 = self.mav0("cam1/data");
                let names0 = list_names(&dir0, is_png)?;
                let names1 = list_names(&dir1, is_png)?;
                hide_unmatched(&dir0, &names0, &names1, "cam1")?;
                hide_unmatched(&dir1, &names1, &names0, "cam0")?;
                names0
                    .into_iter()
                    .filter(|n| names1.binary_search(n).is_ok())
                    .collect()
            }
            VisionKind::Cam0 | VisionKind::Cam1 => {
                list_names(&self.mav0(&format!("{kind}/data")), is_png)?
            }
        };

        let mut stamps = names
            .iter()
            .map(|name| {
                let stem = name.trim_end_matches(".png");
                stem.parse::<i64>().map_err(|_| EvalError::MalformedRow {
                    path: PathBuf::from(name),
                    line: 0,
                    reason: format!("frame name '{stem}' is not a timestamp"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        stamps.sort_unstable();
        Ok(stamps)
    }

    fn encode_videos(&self, kind: VisionKind, output_dir: &Path) -> Result<()> {
        match kind {
            VisionKind::Stereo => {
                encode_video(&self.mav0("cam0/data"), &output_dir.join("data.mp4"))?;
                encode_video(&self.mav0("cam1/data"), &output_dir.join("data2.mp4"))
            }
            VisionKind::Cam0 | VisionKind::Cam1 => encode_video(
                &self.mav0(&format!("{kind}/data")),
                &output_dir.join("data.mp4"),
            ),
        }
    }
}

fn hide_unmatched(dir: &Path, names: &[String], others: &[String], other_camera: &str) -> Result<()> {
    for name in names.iter().filter(|n| others.binary_search(*n).is_err()) {
        let from = dir.join(name);
        let to = dir.join(format!("{name}{HIDDEN_SUFFIX}"));
        fs::rename(&from, &to).map_err(|e| EvalError::io(&from, e))?;
        warn!("{name} not found in {other_camera}, ignoring");
    }
    Ok(())
}

fn frame_entries(
    stamps: &[i64],
    t0_ns: i64,
    primary: CameraParameters,
    second: Option<CameraParameters>,
) -> Vec<DatasetEntry> {
    stamps
        .iter()
        .enumerate()
        .map(|(number, ns)| {
            let time = (ns - t0_ns) as f64 / 1e9;
            let frame = |camera_ind, camera_parameters| Frame {
                camera_ind,
                camera_parameters,
                time,
                number: None,
            };
            let frames = match second {
                Some(second) => vec![frame(0, primary), frame(1, second)],
                None => vec![Frame {
                    number: Some(number),
                    ..frame(0, primary)
                }],
            };
            DatasetEntry {
                number: Some(number),
                frames: Some(frames),
                ..DatasetEntry::at(time)
            }
        })
        .collect()
}

/// Rows of an ASL csv: ns timestamp and at least `values` floats.
fn read_rows(path: &Path, values: usize) -> Result<Vec<(i64, Vec<f64>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = record.position().map_or(i + 1, |p| p.line() as usize);
        let bad = |reason: String| EvalError::MalformedRow {
            path: path.to_path_buf(),
            line,
            reason,
        };
        if record.len() < values + 1 {
            return Err(bad(format!("expected {} columns, got {}", values + 1, record.len())));
        }
        let ns: i64 = record[0]
            .parse()
            .map_err(|_| bad(format!("bad timestamp '{}'", &record[0])))?;
        let v = (1..=values)
            .map(|c| {
                record[c]
                    .parse::<f64>()
                    .map_err(|_| bad(format!("bad value '{}' in column {c}", &record[c])))
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push((ns, v));
    }
    Ok(rows)
}

fn write_jsonl(path: &Path, entries: &[DatasetEntry]) -> Result<()> {
    let file = File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for entry in entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n").map_err(|e| EvalError::io(path, e))?;
    }
    writer.flush().map_err(|e| EvalError::io(path, e))
}

/// `ffmpeg` command turning every PNG in `frames_dir` into a lossless video.
pub fn ffmpeg_command(frames_dir: &Path, output: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-y", "-r"])
        .arg(VIDEO_FPS.to_string())
        .args(["-f", "image2", "-pattern_type", "glob", "-i"])
        .arg(frames_dir.join("*.png"))
        .args(["-c:v", "libx264", "-preset", "veryslow", "-crf", "0", "-vf", "format=yuv420p", "-an"])
        .arg(output);
    cmd
}

fn encode_video(frames_dir: &Path, output: &Path) -> Result<()> {
    let mut cmd = ffmpeg_command(frames_dir, output);
    info!("Encoding {}", output.display());
    let status = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| EvalError::io("ffmpeg", e))?;
    if !status.success() {
        return Err(EvalError::CommandFailed {
            command: crate::executor::describe(&cmd),
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Contents of `parameters.txt`. `None` if a `T_BS` matrix is singular.
pub fn parameters_text(kind: VisionKind, cam0: &CameraSensor, cam1: &CameraSensor) -> Option<String> {
    let first = if kind == VisionKind::Cam1 { cam1 } else { cam0 };
    let [fx, fy, cx, cy] = first.intrinsics;
    let [d0, d1, d2] = first.distortion;
    let mut text = format!(
        "focalLengthX {fx:?};focalLengthY {fy:?};principalPointX {cx:?};principalPointY {cy:?};\n\
         distortionCoeffs {d0:?},{d1:?},{d2:?};\n"
    );
    if kind.is_stereo() {
        let [fx, fy, cx, cy] = cam1.intrinsics;
        let [d0, d1, d2] = cam1.distortion;
        text += &format!(
            "secondFocalLengthX {fx:?};secondFocalLengthY {fy:?};\n\
             secondPrincipalPointX {cx:?};secondPrincipalPointY {cy:?};\n\
             secondDistortionCoeffs {d0:?},{d1:?},{d2:?};\n"
        );
    }
    text += &format!(
        "rot 0;\nvideoRotation NONE;\nimuToCameraMatrix {};\n",
        first.imu_to_camera()?
    );
    if kind.is_stereo() {
        text += &format!(
            "secondImuToCameraMatrix {};\nmatchStereoIntensities true;\n",
            cam1.imu_to_camera()?
        );
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSOR0: &str = "\
%YAML:1.0
sensor_type: camera
comment: VI-Sensor cam0 (MT9M034)
T_BS:
  cols: 4
  rows: 4
  data: [1.0, 0.0, 0.0, 0.5,
         0.0, 0.0, -1.0, 0.0,
         0.0, 1.0, 0.0, 0.0,
         0.0, 0.0, 0.0, 1.0]
rate_hz: 20
resolution: [752, 480]
camera_model: pinhole
intrinsics: [458.654, 457.296, 367.215, 248.375]
distortion_model: radial-tangential
distortion_coefficients: [-0.28340811, 0.07395907, 0.00019359, 1.76187114e-05]
";

    fn sensor1() -> String {
        SENSOR0
            .replace("458.654", "457.587")
            .replace("0.0, 0.5,", "0.0, -0.5,")
    }

    /// GT at 0, 10, 20 ms; IMU at 5 and 15 ms; frames at 0 and 20 ms plus one
    /// unmatched frame per camera.
    fn write_raw(root: &Path) {
        let mav0 = root.join("mav0");
        for dir in ["state_groundtruth_estimate0", "imu0", "cam0/data", "cam1/data"] {
            fs::create_dir_all(mav0.join(dir)).unwrap();
        }
        fs::write(
            mav0.join("state_groundtruth_estimate0/data.csv"),
            "#timestamp, p_RS_R_x [m], p_RS_R_y [m], p_RS_R_z [m], q_RS_w [], q_RS_x [], q_RS_y [], q_RS_z []\n\
             1000000000,1.0,2.0,3.0,1.0,0.0,0.0,0.0\n\
             1010000000,1.1,2.0,3.0,1.0,0.0,0.0,0.0\n\
             1020000000,1.2,2.0,3.0,1.0,0.0,0.0,0.0\n",
        )
        .unwrap();
        fs::write(
            mav0.join("imu0/data.csv"),
            "#timestamp [ns],w_RS_S_x,w_RS_S_y,w_RS_S_z,a_RS_S_x,a_RS_S_y,a_RS_S_z\n\
             1005000000,0.1,0.2,0.3,9.7,0.1,0.2\n\
             1015000000,0.1,0.2,0.3,9.8,0.1,0.2\n",
        )
        .unwrap();
        for name in ["1000000000.png", "1020000000.png", "1030000000.png"] {
            fs::write(mav0.join("cam0/data").join(name), "").unwrap();
        }
        for name in ["1000000000.png", "1020000000.png", "1025000000.png"] {
            fs::write(mav0.join("cam1/data").join(name), "").unwrap();
        }
        fs::write(mav0.join("cam0/sensor.yaml"), SENSOR0).unwrap();
        fs::write(mav0.join("cam1/sensor.yaml"), sensor1()).unwrap();
    }

    fn converter(root: &Path) -> BenchmarkConverter {
        let mut converter = BenchmarkConverter::new("euroc-test", &root.join("raw"), &root.join("bench/euroc-test"));
        converter.encode_video = false;
        converter
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_stereo_conversion() {
        let root = tempfile::tempdir().unwrap();
        write_raw(&root.path().join("raw"));
        let converter = converter(root.path());
        let out = converter.convert(VisionKind::Stereo).unwrap();
        assert_eq!(out, root.path().join("bench/euroc-test"));

        let lines = read_lines(&out.join("data.jsonl"));
        // 3 GT + 2x2 IMU + 2 matched frames
        assert_eq!(lines.len(), 9);
        let times: Vec<f64> = lines.iter().map(|l| l["time"].as_f64().unwrap()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        // First entry is ground truth at t = 0, then the frame stamped at 0
        assert_eq!(lines[0]["groundTruth"]["position"]["x"], 1.0);
        assert_eq!(lines[0]["groundTruth"]["orientation"]["w"], 1.0);
        assert!(lines[0].get("number").is_none());
        let frame = &lines[1];
        assert_eq!(frame["number"], 0);
        assert_eq!(frame["frames"][1]["cameraInd"], 1);
        assert_eq!(frame["frames"][0]["cameraParameters"]["focalLengthX"], 458.654);
        assert_eq!(frame["frames"][1]["cameraParameters"]["focalLengthX"], 457.587);
        assert!(frame["frames"][0].get("number").is_none());

        assert_eq!(lines[2]["sensor"]["type"], "gyroscope");
        assert_eq!(lines[3]["sensor"]["type"], "accelerometer");
        assert!((lines[2]["time"].as_f64().unwrap() - 0.005).abs() < 1e-12);

        // Unmatched frames are hidden
        let raw = root.path().join("raw/mav0");
        assert!(raw.join("cam0/data/1030000000.png_hdn").exists());
        assert!(raw.join("cam1/data/1025000000.png_hdn").exists());
        assert!(!raw.join("cam1/data/1025000000.png").exists());

        let info = fs::read_to_string(out.join("info.json")).unwrap();
        assert_eq!(info, "{\n    \"tags\": [\n        \"euroc\"\n    ]\n}");

        let params = fs::read_to_string(out.join("parameters.txt")).unwrap();
        assert!(params.starts_with(
            "focalLengthX 458.654;focalLengthY 457.296;principalPointX 367.215;principalPointY 248.375;\n\
             distortionCoeffs -0.28340811,0.07395907,0.00019359;\n\
             secondFocalLengthX 457.587;"
        ));
        assert!(params.contains("rot 0;\nvideoRotation NONE;\n"));
        assert!(params.contains("secondImuToCameraMatrix "));
        assert!(params.ends_with("matchStereoIntensities true;\n"));
    }

    #[test]
    fn test_mono_conversion() {
        let root = tempfile::tempdir().unwrap();
        write_raw(&root.path().join("raw"));
        let converter = converter(root.path());
        let out = converter.convert(VisionKind::Cam1).unwrap();
        assert_eq!(out, root.path().join("bench/euroc-test-cam1"));

        let lines = read_lines(&out.join("data.jsonl"));
        let frames: Vec<_> = lines.iter().filter(|l| l.get("frames").is_some()).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2]["number"], 2);
        assert_eq!(frames[2]["frames"][0]["number"], 2);
        assert_eq!(frames[2]["frames"][0]["cameraInd"], 0);
        assert_eq!(frames[2]["frames"][0]["cameraParameters"]["focalLengthX"], 457.587);

        let params = fs::read_to_string(out.join("parameters.txt")).unwrap();
        assert!(params.starts_with("focalLengthX 457.587;"));
        assert!(!params.contains("second"));
    }

    #[test]
    fn test_imu_to_camera_is_column_major_inverse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor.yaml");
        fs::write(&path, SENSOR0).unwrap();
        let sensor = CameraSensor::load(&path).unwrap();
        assert_eq!(sensor.distortion, [-0.28340811, 0.07395907, 0.00019359]);

        // Inverse of [R | t] is [R^T | -R^T t]; column-major output lists
        // the columns of that matrix one after another.
        let values: Vec<f64> = sensor
            .imu_to_camera()
            .unwrap()
            .split(',')
            .map(|v| v.parse().unwrap())
            .collect();
        let expected = [
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 1.0, 0.0, 0.0, -0.5, 0.0, 0.0, 1.0,
        ];
        assert_eq!(values.len(), 16);
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-12, "{values:?}");
        }
    }

    #[test]
    fn test_invalid_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor.yaml");
        fs::write(&path, SENSOR0.replace("intrinsics: [458.654, 457.296, 367.215, 248.375]", "intrinsics: [1.0]")).unwrap();
        assert!(matches!(CameraSensor::load(&path), Err(EvalError::InvalidCalibration { .. })));
    }

    #[test]
    fn test_ffmpeg_command() {
        let cmd = ffmpeg_command(Path::new("raw/mav0/cam0/data"), Path::new("out/data.mp4"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args.join(" "),
            "-y -r 20 -f image2 -pattern_type glob -i raw/mav0/cam0/data/*.png -c:v libx264 \
             -preset veryslow -crf 0 -vf format=yuv420p -an out/data.mp4"
        );
    }

    #[test]
    fn test_vision_kind_names() {
        assert_eq!("cam0".parse::<VisionKind>().unwrap(), VisionKind::Cam0);
        assert!("mono".parse::<VisionKind>().is_err());
        assert_eq!(VisionKind::Stereo.to_string(), "stereo");
    }
}
