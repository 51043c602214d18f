//! CSV loading for hourly candles and daily permissions.
//!
//! Hourly files carry an `open_time` column (epoch milliseconds or a datetime
//! string) and/or a `timestamp` / `datetime` string column, plus OHLCV.
//! Capitalized headers (`Open_Time`, `Datetime_Obj`, `Open`, ...) are
//! accepted as aliases. When both time columns are present the string
//! `timestamp` wins.
//!
//! Out-of-order rows are sorted on load with a warning. Duplicates, gaps and
//! bad prices are left for `validate_candles` to reject.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diplab_core::domain::{Candle, DailyPermission};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path}, row {row}: {message}")]
    Parse {
        path: PathBuf,
        row: usize,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct HourlyRecord {
    #[serde(default, alias = "Open_Time")]
    open_time: Option<String>,
    #[serde(default, alias = "Datetime_Obj", alias = "datetime")]
    timestamp: Option<String>,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct PermissionRecord {
    date: String,
    #[serde(alias = "signal_bool")]
    permitted: String,
    #[serde(alias = "close", alias = "Close")]
    reference_close: Option<f64>,
    #[serde(default)]
    ma_value: Option<f64>,
}

/// Parse the timestamp formats seen in hourly exports, all read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `open_time` holds epoch milliseconds in exchange dumps and a datetime
/// string in generated series.
fn parse_open_time(s: &str) -> Option<DateTime<Utc>> {
    match s.trim().parse::<i64>() {
        Ok(ms) => DateTime::from_timestamp_millis(ms),
        Err(_) => parse_timestamp(s),
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file))
}

fn require_columns(
    path: &Path,
    headers: &csv::StringRecord,
    required: &[(&'static str, &[&str])],
) -> Result<(), LoadError> {
    for (column, accepted) in required {
        if !headers.iter().any(|h| accepted.contains(&h)) {
            return Err(LoadError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }
    Ok(())
}

/// Load hourly candles, sorted ascending by timestamp.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>, LoadError> {
    let mut reader = open_reader(path)?;
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let headers = reader.headers().map_err(csv_err)?.clone();
    require_columns(
        path,
        &headers,
        &[
            (
                "open_time|timestamp",
                &["open_time", "Open_Time", "timestamp", "Datetime_Obj", "datetime"],
            ),
            ("open", &["open", "Open"]),
            ("high", &["high", "High"]),
            ("low", &["low", "Low"]),
            ("close", &["close", "Close"]),
            ("volume", &["volume", "Volume"]),
        ],
    )?;

    let mut candles = Vec::new();
    for (i, record) in reader.deserialize::<HourlyRecord>().enumerate() {
        let row = i + 1;
        let record = record.map_err(csv_err)?;
        let timestamp = match (&record.timestamp, &record.open_time) {
            (Some(s), _) if !s.is_empty() => parse_timestamp(s),
            (_, Some(s)) if !s.is_empty() => parse_open_time(s),
            _ => None,
        }
        .ok_or_else(|| LoadError::Parse {
            path: path.to_path_buf(),
            row,
            message: "missing or unparseable timestamp".to_string(),
        })?;

        candles.push(Candle {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }

    if !candles.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
        tracing::warn!(path = %path.display(), "hourly rows out of order; sorting by timestamp");
        candles.sort_by_key(|c| c.timestamp);
    }
    tracing::info!(path = %path.display(), candles = candles.len(), "loaded hourly candles");
    Ok(candles)
}

/// Load daily permissions. Accepts the signal-stage output as well as a
/// minimal `date,permitted,reference_close,ma_value` table. Missing
/// indicator values load as NaN.
pub fn load_permissions(path: &Path) -> Result<Vec<DailyPermission>, LoadError> {
    let mut reader = open_reader(path)?;
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let headers = reader.headers().map_err(csv_err)?.clone();
    require_columns(
        path,
        &headers,
        &[
            ("date", &["date"]),
            ("permitted", &["permitted", "signal_bool"]),
        ],
    )?;

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<PermissionRecord>().enumerate() {
        let row = i + 1;
        let record = record.map_err(csv_err)?;
        let parse_err = |message: String| LoadError::Parse {
            path: path.to_path_buf(),
            row,
            message,
        };

        let day = record.date.get(..10).unwrap_or(&record.date);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| parse_err(format!("bad date '{}': {e}", record.date)))?;
        let permitted = parse_bool(&record.permitted)
            .ok_or_else(|| parse_err(format!("bad boolean '{}'", record.permitted)))?;

        rows.push(DailyPermission {
            date,
            permitted,
            reference_close: record.reference_close.unwrap_or(f64::NAN),
            ma_value: record.ma_value.unwrap_or(f64::NAN),
        });
    }

    tracing::info!(
        path = %path.display(),
        days = rows.len(),
        permitted = rows.iter().filter(|r| r.permitted).count(),
        "loaded daily permissions"
    );
    Ok(rows)
}

/// BLAKE3 fingerprint over every candle field, in series order.
pub fn dataset_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(&c.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&c.open.to_le_bytes());
        hasher.update(&c.high.to_le_bytes());
        hasher.update(&c.low.to_le_bytes());
        hasher.update(&c.close.to_le_bytes());
        hasher.update(&c.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2017, 10, 20, 5, 0, 0).unwrap();
        for s in [
            "2017-10-20T05:00:00Z",
            "2017-10-20 05:00:00+00:00",
            "2017-10-20 05:00:00",
            "2017-10-20T05:00:00",
        ] {
            assert_eq!(parse_timestamp(s), Some(expected), "format {s}");
        }
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn loads_epoch_ms_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "h.csv",
            "Open_Time,Open,High,Low,Close,Volume\n\
             1508461200000,101,102,100,101.5,3\n\
             1508457600000,100,101,99,100.5,2\n",
        );
        let candles = load_candles(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(
            candles[0].timestamp,
            Utc.with_ymd_and_hms(2017, 10, 20, 0, 0, 0).unwrap()
        );
        assert_eq!(candles[1].close, 101.5);
    }

    #[test]
    fn loads_generated_series_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "h.csv",
            "Datetime_Obj,Close,Open,High,Low,Volume,rsi,ma_value,Open_Time\n\
             2017-10-20 00:00:00+00:00,110,100,110.22,99.8,1000,,,2017-10-20 00:00:00\n\
             2017-10-20 01:00:00+00:00,99,110,110.22,98.8,1000,,,2017-10-20 01:00:00\n",
        );
        let candles = load_candles(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(
            candles[1].timestamp,
            Utc.with_ymd_and_hms(2017, 10, 20, 1, 0, 0).unwrap()
        );
        assert_eq!(candles[0].close, 110.0);
        assert_eq!(candles[1].open, 110.0);
    }

    #[test]
    fn open_time_accepts_datetime_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "h.csv",
            "Open_Time,Open,High,Low,Close,Volume\n\
             2017-10-20 03:00:00,100,101,99,100.5,2\n",
        );
        let candles = load_candles(&path).unwrap();
        assert_eq!(
            candles[0].timestamp,
            Utc.with_ymd_and_hms(2017, 10, 20, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn loads_datetime_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "h.csv",
            "timestamp,open,high,low,close,volume\n\
             2024-01-01 00:00:00,1,2,0.5,1.5,10\n",
        );
        let candles = load_candles(&path).unwrap();
        assert_eq!(candles[0].hour(), 0);
        assert_eq!(candles[0].volume, 10.0);
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "h.csv", "timestamp,open,high,low,close\n");
        match load_candles(&path) {
            Err(LoadError::MissingColumn { column, .. }) => assert_eq!(column, "volume"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn permissions_accept_signal_stage_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "s.csv",
            "date,Open,High,Low,Close,Volume,ma_value,rsi,peak,drawdown_pct,signal_bool,reason_flags\n\
             2024-01-01,1,1,1,100,1,,,100,0,False,Below_MA;\n\
             2024-01-02,1,1,1,105,1,101.2,55,105,0,True,\n",
        );
        let rows = load_permissions(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].permitted);
        assert!(rows[0].ma_value.is_nan());
        assert!(rows[1].permitted);
        assert_eq!(rows[1].reference_close, 105.0);
        assert_eq!(rows[1].ma_value, 101.2);
    }

    #[test]
    fn bad_boolean_names_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "s.csv",
            "date,permitted,reference_close,ma_value\n2024-01-01,maybe,1,1\n",
        );
        match load_permissions(&path) {
            Err(LoadError::Parse { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn dataset_hash_tracks_content() {
        let c = Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 1.0,
        };
        let mut d = c.clone();
        d.close = 1.6;
        assert_eq!(dataset_hash(&[c.clone()]), dataset_hash(&[c.clone()]));
        assert_ne!(dataset_hash(&[c]), dataset_hash(&[d]));
    }
}
