//! Time-sync stream handler
//!
//! A `tsync` part stores pairs of timestamps recorded against two clocks,
//! typically a device frame counter and a master clock. The payload is a
//! little-endian binary stream: magic, format version, creation time, sync
//! mode, the time unit and label of each column, then a length-prefixed list
//! of `(i64, i64)` time pairs.

use super::{PartData, PartError, PartHandler, PartResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use edl_core_manifest::DataPartRef;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

/// Magic number at the start of every time-sync stream
pub const TSYNC_MAGIC: u32 = 0xC6BB_DFBC;

/// Stream format version written by this crate
pub const TSYNC_FORMAT_VERSION: (u16, u16) = (1, 0);

/// Frame rate assumed when a video part does not declare one
pub const DEFAULT_NOMINAL_FPS: f64 = 30.0;

/// Timing deviation ratio above which dropped frames are reported
pub const DROPPED_FRAME_WARN_RATIO: f64 = 0.05;

/// How the two clocks were aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Every time pair is an independent measurement
    #[default]
    Continuous,

    /// Pairs are sparse synchronization points
    SyncPoints,
}

impl SyncMode {
    fn from_raw(raw: u16) -> PartResult<Self> {
        match raw {
            0 => Ok(SyncMode::Continuous),
            1 => Ok(SyncMode::SyncPoints),
            other => Err(PartError::malformed(format!(
                "unknown sync mode {}",
                other
            ))),
        }
    }

    fn as_raw(self) -> u16 {
        match self {
            SyncMode::Continuous => 0,
            SyncMode::SyncPoints => 1,
        }
    }
}

/// Unit of one timestamp column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Unitless counter, e.g. a frame number
    Index,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    fn from_raw(raw: u16) -> PartResult<Self> {
        match raw {
            0 => Ok(TimeUnit::Index),
            1 => Ok(TimeUnit::Microseconds),
            2 => Ok(TimeUnit::Milliseconds),
            3 => Ok(TimeUnit::Seconds),
            other => Err(PartError::malformed(format!(
                "unknown time unit {}",
                other
            ))),
        }
    }

    fn as_raw(self) -> u16 {
        match self {
            TimeUnit::Index => 0,
            TimeUnit::Microseconds => 1,
            TimeUnit::Milliseconds => 2,
            TimeUnit::Seconds => 3,
        }
    }

    /// Convert a raw timestamp in this unit to milliseconds
    pub fn to_milliseconds(self, value: i64) -> f64 {
        match self {
            TimeUnit::Index => value as f64,
            TimeUnit::Microseconds => value as f64 / 1000.0,
            TimeUnit::Milliseconds => value as f64,
            TimeUnit::Seconds => value as f64 * 1000.0,
        }
    }
}

/// Parsed time-sync stream
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSyncData {
    /// Stream format version as (major, minor)
    pub version: (u16, u16),

    /// When the stream was recorded
    pub time_created: DateTime<Utc>,

    /// Alignment strategy of the two clocks
    pub sync_mode: SyncMode,

    /// Units of the device and master columns
    pub units: (TimeUnit, TimeUnit),

    /// Human-readable column labels
    pub labels: (String, String),

    /// Recorded (device, master) time pairs
    pub times: Vec<(i64, i64)>,
}

impl TimeSyncData {
    /// Create a new stream stamped with the current time
    pub fn new<S: Into<String>>(
        labels: (S, S),
        units: (TimeUnit, TimeUnit),
        times: Vec<(i64, i64)>,
    ) -> Self {
        TimeSyncData {
            version: TSYNC_FORMAT_VERSION,
            time_created: Utc::now(),
            sync_mode: SyncMode::Continuous,
            units,
            labels: (labels.0.into(), labels.1.into()),
            times,
        }
    }

    /// Parse a time-sync stream from payload bytes
    pub fn parse(bytes: &[u8]) -> PartResult<TimeSyncData> {
        TimeSyncData::read_from(&mut Cursor::new(bytes)).map_err(|err| match err {
            // Cursor reads only fail at end of input
            PartError::Io(_) => PartError::malformed("time-sync stream is truncated"),
            other => other,
        })
    }

    fn read_from(cur: &mut Cursor<&[u8]>) -> PartResult<TimeSyncData> {
        let magic = cur.read_u32::<LittleEndian>()?;
        if magic != TSYNC_MAGIC {
            return Err(PartError::malformed(format!(
                "bad magic 0x{:08X}, expected 0x{:08X}",
                magic, TSYNC_MAGIC
            )));
        }

        let major = cur.read_u16::<LittleEndian>()?;
        let minor = cur.read_u16::<LittleEndian>()?;
        if major != TSYNC_FORMAT_VERSION.0 {
            return Err(PartError::malformed(format!(
                "unsupported time-sync version {}.{}",
                major, minor
            )));
        }

        let created_secs = cur.read_i64::<LittleEndian>()?;
        let time_created = DateTime::from_timestamp(created_secs, 0).ok_or_else(|| {
            PartError::malformed(format!("creation time {} is out of range", created_secs))
        })?;

        let sync_mode = SyncMode::from_raw(cur.read_u16::<LittleEndian>()?)?;
        let units = (
            TimeUnit::from_raw(cur.read_u16::<LittleEndian>()?)?,
            TimeUnit::from_raw(cur.read_u16::<LittleEndian>()?)?,
        );
        let labels = (read_label(cur)?, read_label(cur)?);

        let count = cur.read_u64::<LittleEndian>()?;
        let expected = count
            .checked_mul(16)
            .ok_or_else(|| PartError::malformed("time pair count out of range"))?;
        let remaining = cur.get_ref().len() as u64 - cur.position();
        if remaining != expected {
            return Err(PartError::malformed(format!(
                "time pair section is {} bytes, expected {} for {} pairs",
                remaining, expected, count
            )));
        }

        let mut times = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let device = cur.read_i64::<LittleEndian>()?;
            let master = cur.read_i64::<LittleEndian>()?;
            times.push((device, master));
        }

        Ok(TimeSyncData {
            version: (major, minor),
            time_created,
            sync_mode,
            units,
            labels,
            times,
        })
    }

    /// Encode the stream as payload bytes
    pub fn encode(&self) -> PartResult<Vec<u8>> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(TSYNC_MAGIC)?;
        out.write_u16::<LittleEndian>(self.version.0)?;
        out.write_u16::<LittleEndian>(self.version.1)?;
        out.write_i64::<LittleEndian>(self.time_created.timestamp())?;
        out.write_u16::<LittleEndian>(self.sync_mode.as_raw())?;
        out.write_u16::<LittleEndian>(self.units.0.as_raw())?;
        out.write_u16::<LittleEndian>(self.units.1.as_raw())?;
        write_label(&mut out, &self.labels.0)?;
        write_label(&mut out, &self.labels.1)?;
        out.write_u64::<LittleEndian>(self.times.len() as u64)?;
        for &(device, master) in &self.times {
            out.write_i64::<LittleEndian>(device)?;
            out.write_i64::<LittleEndian>(master)?;
        }
        Ok(out)
    }

    /// Master-clock column converted to milliseconds
    pub fn master_times_ms(&self) -> Vec<f64> {
        self.times
            .iter()
            .map(|&(_, master)| self.units.1.to_milliseconds(master))
            .collect()
    }

    /// Number of time pairs in the stream
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True when the stream has no time pairs
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

fn read_label(cur: &mut Cursor<&[u8]>) -> PartResult<String> {
    let len = cur.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| PartError::malformed("label is not valid UTF-8"))
}

fn write_label(out: &mut Vec<u8>, label: &str) -> PartResult<()> {
    let len = u16::try_from(label.len())
        .map_err(|_| PartError::malformed(format!("label '{}' is too long", label)))?;
    out.write_u16::<LittleEndian>(len)?;
    out.extend_from_slice(label.as_bytes());
    Ok(())
}

/// Relative deviation of the observed frame rate from the nominal one
///
/// Returns None when fewer than two timestamps are available. Mean intervals
/// above 10 are assumed to be milliseconds and rescaled to seconds, so both
/// second and millisecond inputs give a rate in Hz.
pub fn timing_error_ratio(times_ms: &[f64], nominal_fps: f64) -> Option<f64> {
    if times_ms.len() < 2 || nominal_fps <= 0.0 {
        return None;
    }
    let mut sum = 0.0;
    for pair in times_ms.windows(2) {
        sum += pair[1] - pair[0];
    }
    let mut avg = sum / (times_ms.len() - 1) as f64;
    if avg > 10.0 {
        avg /= 1000.0;
    }
    if avg <= 0.0 {
        return None;
    }
    let observed_rate = 1.0 / avg;
    Some((nominal_fps - observed_rate).abs() / nominal_fps)
}

/// Handler for binary time-sync streams
pub struct TsyncHandler;

impl PartHandler for TsyncHandler {
    fn name(&self) -> &str {
        "tsync"
    }

    fn validate(&self, path: &Path, part: &DataPartRef) -> PartResult<Vec<String>> {
        let bytes = fs::read(path)?;
        let stream = TimeSyncData::parse(&bytes)?;

        let mut warnings = Vec::new();
        if stream.is_empty() {
            warnings.push("time-sync stream contains no time pairs".to_string());
            return Ok(warnings);
        }

        let fps = nominal_fps(part);
        if let Some(ratio) = timing_error_ratio(&stream.master_times_ms(), fps) {
            if ratio >= DROPPED_FRAME_WARN_RATIO {
                warnings.push(format!(
                    "frame timing deviates {:.1}% from nominal {} fps, frames may be missing",
                    ratio * 100.0,
                    fps
                ));
            }
        }
        Ok(warnings)
    }

    fn load(&self, path: &Path, _part: &DataPartRef) -> PartResult<PartData> {
        let bytes = fs::read(path)?;
        Ok(PartData::TimeSync(TimeSyncData::parse(&bytes)?))
    }
}

fn nominal_fps(part: &DataPartRef) -> f64 {
    match part.extra.get("fps") {
        Some(toml::Value::Integer(v)) if *v > 0 => *v as f64,
        Some(toml::Value::Float(v)) if *v > 0.0 => *v,
        _ => DEFAULT_NOMINAL_FPS,
    }
}
