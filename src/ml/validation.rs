use crate::error::{AppError, Result};
use crate::models::{CleanDataset, InferenceRow, SensorReadings, TrainingRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Columns of a labeled training upload
pub const TRAINING_COLUMNS: [&str; 7] = [
    "timestamp",
    "asset_id",
    "temperature",
    "vibration",
    "pressure",
    "current",
    "label",
];

/// Columns of an unlabeled inference upload
pub const INFERENCE_COLUMNS: [&str; 6] = [
    "timestamp",
    "asset_id",
    "temperature",
    "vibration",
    "pressure",
    "current",
];

const NAIVE_DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Decoded delimited text: a header row plus string cells
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self { headers, records }
    }

    /// Parse UTF-8 CSV text with a header row
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::Upload(format!("Unable to parse CSV: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();

        // Missing trailing cells read as empty; extra cells are rejected.
        let mut records = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| AppError::Upload(format!("Unable to parse CSV: {}", e)))?;
            if record.len() > headers.len() {
                return Err(AppError::Upload(format!(
                    "Unable to parse CSV: expected {} fields in line {}, saw {}",
                    headers.len(),
                    record.position().map_or(0, |pos| pos.line()),
                    record.len()
                )));
            }
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, records })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Position of the first column with this exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn cell(&self, row: usize, column: usize) -> &str {
        self.records[row]
            .get(column)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Decode an uploaded file into a table.
///
/// The extension and encoding are checked before any parsing happens.
pub fn read_csv_upload(filename: Option<&str>, content: &[u8]) -> Result<RawTable> {
    let filename = filename.unwrap_or_default().to_lowercase();
    if !filename.ends_with(".csv") {
        return Err(AppError::Upload("Please upload a .csv file".to_string()));
    }

    let text = std::str::from_utf8(content)
        .map_err(|_| AppError::Upload("CSV is not UTF-8 encoded".to_string()))?;

    RawTable::from_csv_str(text)
}

/// Resolve every required column or report all that are missing
fn resolve_columns(table: &RawTable, required: &[&str]) -> Result<Vec<usize>> {
    let mut indices = Vec::with_capacity(required.len());
    let mut missing = Vec::new();

    for name in required {
        match table.column_index(name) {
            Some(index) => indices.push(index),
            None => missing.push(name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(AppError::Schema {
            missing_columns: missing,
        });
    }
    Ok(indices)
}

/// Parse a timestamp cell into a UTC instant.
///
/// Offset-aware values are converted to UTC; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

fn parse_sensor(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integral labels only; "1.0" is accepted, "0.5" is not
fn parse_label(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i64)
}

struct ParsedRow {
    timestamp: Option<DateTime<Utc>>,
    asset_id: String,
    readings: Option<SensorReadings>,
}

/// Parse the six shared columns; `columns` is in `INFERENCE_COLUMNS` order
fn parse_common(table: &RawTable, row: usize, columns: &[usize]) -> ParsedRow {
    let sensors: Vec<Option<f64>> = columns[2..6]
        .iter()
        .map(|&column| parse_sensor(table.cell(row, column)))
        .collect();

    let readings = match sensors.as_slice() {
        [Some(t), Some(v), Some(p), Some(c)] => Some(SensorReadings::new(*t, *v, *p, *c)),
        _ => None,
    };

    ParsedRow {
        timestamp: parse_timestamp(table.cell(row, columns[0])),
        asset_id: table.cell(row, columns[1]).to_string(),
        readings,
    }
}

/// Validate and coerce a table against the training schema.
///
/// All-or-nothing: any unparseable cell anywhere fails the whole call with
/// per-category row counts.
pub fn validate_training(table: &RawTable) -> Result<CleanDataset<TrainingRow>> {
    let columns = resolve_columns(table, &TRAINING_COLUMNS)?;

    let mut bad_timestamp_rows = 0;
    let mut bad_sensor_rows = 0;
    let mut bad_label_rows = 0;
    let mut rows = Vec::with_capacity(table.row_count());
    let mut labels = Vec::with_capacity(table.row_count());

    for row in 0..table.row_count() {
        let parsed = parse_common(table, row, &columns[..6]);
        let label = parse_label(table.cell(row, columns[6]));

        bad_timestamp_rows += usize::from(parsed.timestamp.is_none());
        bad_sensor_rows += usize::from(parsed.readings.is_none());
        bad_label_rows += usize::from(label.is_none());

        if let (Some(timestamp), Some(readings), Some(label)) = (parsed.timestamp, parsed.readings, label) {
            rows.push((timestamp, parsed.asset_id, readings));
            labels.push(label);
        }
    }

    if bad_timestamp_rows > 0 || bad_sensor_rows > 0 || bad_label_rows > 0 {
        return Err(AppError::InvalidValues {
            bad_timestamp_rows,
            bad_sensor_rows,
            bad_label_rows: Some(bad_label_rows),
        });
    }

    if labels.iter().any(|&label| label != 0 && label != 1) {
        return Err(AppError::LabelDomain);
    }

    let rows = rows
        .into_iter()
        .zip(labels)
        .map(|((timestamp, asset_id, readings), label)| TrainingRow {
            timestamp,
            asset_id,
            readings,
            label: label as u8,
        })
        .collect();

    Ok(CleanDataset::from_validated(rows))
}

/// Validate and coerce a table against the inference schema.
///
/// A `label` column, if present, is ignored.
pub fn validate_inference(table: &RawTable) -> Result<CleanDataset<InferenceRow>> {
    let columns = resolve_columns(table, &INFERENCE_COLUMNS)?;

    let mut bad_timestamp_rows = 0;
    let mut bad_sensor_rows = 0;
    let mut rows = Vec::with_capacity(table.row_count());

    for row in 0..table.row_count() {
        let parsed = parse_common(table, row, &columns);

        bad_timestamp_rows += usize::from(parsed.timestamp.is_none());
        bad_sensor_rows += usize::from(parsed.readings.is_none());

        if let (Some(timestamp), Some(readings)) = (parsed.timestamp, parsed.readings) {
            rows.push(InferenceRow {
                timestamp,
                asset_id: parsed.asset_id,
                readings,
            });
        }
    }

    if bad_timestamp_rows > 0 || bad_sensor_rows > 0 {
        return Err(AppError::InvalidValues {
            bad_timestamp_rows,
            bad_sensor_rows,
            bad_label_rows: None,
        });
    }

    Ok(CleanDataset::from_validated(rows))
}
