//! Raw CSV ingestion and the processed training table.

use crate::error::{Error, Result, SchemaError, TrainingDataError};
use crate::features::{
    is_categorical, FeatureCodec, FeatureRecord, RawRecord, RawValue, CATEGORICAL_FEATURES,
    FEATURE_COLUMNS, FEATURE_COUNT, LABEL_COLUMN,
};
use crate::model::Target;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

/// Legacy raw column names and their canonical feature names.
pub const COLUMN_ALIASES: [(&str, &str); 2] = [
    ("Charging_Type", "Charging Type"),
    ("Charging_Station_Location", "Charging Station Location"),
];

/// Identifier and timestamp columns that never reach a model.
pub const DROPPED_COLUMNS: [&str; 5] = [
    "Rider_ID",
    "Date",
    "Trip_ID",
    "Charging_Start_Time",
    "Charging_End_Time",
];

const MISSING_MARKERS: [&str; 6] = ["", "NA", "N/A", "NaN", "nan", "null"];

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell)
}

pub fn canonical_column(name: &str) -> &str {
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

fn processed_headers() -> Vec<&'static str> {
    FEATURE_COLUMNS
        .iter()
        .copied()
        .chain(Target::ALL.iter().map(|t| t.column()))
        .collect()
}

/// Unprocessed tabular input, cells kept as text.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawDataset {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingRow {
    pub features: FeatureRecord,
    pub energy_kwh: f64,
    pub battery_health_percent: f64,
    pub estimated_range_km: f64,
    pub recommended_action: u32,
}

impl TrainingRow {
    pub fn target(&self, target: Target) -> f64 {
        match target {
            Target::Usage => self.energy_kwh,
            Target::Lifespan => self.battery_health_percent,
            Target::Degradation => self.estimated_range_km,
            Target::Recommendation => f64::from(self.recommended_action),
        }
    }
}

/// Clean, fully numeric table consumed by the trainer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingTable {
    rows: Vec<TrainingRow>,
}

impl TrainingTable {
    pub fn new(rows: Vec<TrainingRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TrainingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn features(&self) -> Vec<FeatureRecord> {
        self.rows.iter().map(|r| r.features).collect()
    }

    pub fn target_values(&self, target: Target) -> Vec<f64> {
        self.rows.iter().map(|r| r.target(target)).collect()
    }

    pub fn labels(&self) -> Vec<u32> {
        self.rows.iter().map(|r| r.recommended_action).collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(processed_headers())?;
        for row in &self.rows {
            let mut record: Vec<String> =
                row.features.values().iter().map(f64::to_string).collect();
            record.push(row.energy_kwh.to_string());
            record.push(row.battery_health_percent.to_string());
            record.push(row.estimated_range_km.to_string());
            record.push(row.recommended_action.to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv(file)
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let expected = processed_headers();
        for name in &expected {
            if !headers.iter().any(|h| h == name) {
                return Err(SchemaError::MissingColumn(name.to_string()).into());
            }
        }
        if let Some(extra) = headers.iter().find(|h| !expected.contains(&h.as_str())) {
            return Err(SchemaError::UnexpectedColumn(extra.clone()).into());
        }
        let index: Vec<usize> = expected
            .iter()
            .map(|name| headers.iter().position(|h| h == name).unwrap_or_default())
            .collect();

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let row_no = i + 1;
            let cell = |col: usize| -> Result<f64> {
                let name = expected[col];
                let text = record.get(index[col]).unwrap_or_default();
                parse_number(text).ok_or_else(|| malformed(row_no, name, text))
            };
            let mut features = [0.0; FEATURE_COUNT];
            for (col, slot) in features.iter_mut().enumerate() {
                *slot = cell(col)?;
            }
            let action = cell(FEATURE_COUNT + 3)?;
            if action < 0.0 || action.fract() != 0.0 || action > f64::from(u32::MAX) {
                return Err(malformed(row_no, LABEL_COLUMN, &action.to_string()));
            }
            rows.push(TrainingRow {
                features: FeatureRecord::from_values(features),
                energy_kwh: cell(FEATURE_COUNT)?,
                battery_health_percent: cell(FEATURE_COUNT + 1)?,
                estimated_range_km: cell(FEATURE_COUNT + 2)?,
                recommended_action: action as u32,
            });
        }
        Ok(Self { rows })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::read_csv(file)
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn malformed(row: usize, column: &str, value: &str) -> Error {
    SchemaError::MalformedValue {
        row,
        column: column.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Output of [`prepare`]: the clean table plus the codec fitted on it.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub table: TrainingTable,
    pub codec: FeatureCodec,
}

/// Maps every required canonical column to its index in the raw headers.
fn resolve_columns(headers: &[String]) -> Result<HashMap<&'static str, usize>> {
    let required: Vec<&'static str> = FEATURE_COLUMNS
        .iter()
        .copied()
        .chain(Target::ALL.iter().map(|t| t.column()))
        .collect();

    let mut index = HashMap::new();
    for (pos, header) in headers.iter().enumerate() {
        if DROPPED_COLUMNS.contains(&header.as_str()) {
            continue;
        }
        let canonical = canonical_column(header);
        let Some(name) = required.iter().find(|r| **r == canonical) else {
            return Err(SchemaError::UnexpectedColumn(header.clone()).into());
        };
        if index.insert(*name, pos).is_some() {
            // e.g. both `Charging_Type` and `Charging Type`
            return Err(SchemaError::UnexpectedColumn(header.clone()).into());
        }
    }

    if let Some(missing) = required.iter().find(|r| !index.contains_key(*r)) {
        return Err(SchemaError::MissingColumn(missing.to_string()).into());
    }
    Ok(index)
}

/// Turns a raw dataset into a training table and the codec fitted over it.
///
/// Missing continuous targets are filled with the column mean computed once
/// over the present values. Missing features or labels are errors.
pub fn prepare(raw: &RawDataset) -> Result<PreparedDataset> {
    if raw.is_empty() {
        return Err(TrainingDataError::EmptyDataset.into());
    }
    let index = resolve_columns(&raw.headers)?;

    let continuous: Vec<Target> = Target::ALL
        .iter()
        .copied()
        .filter(|t| !t.is_classification())
        .collect();

    let mut records = Vec::with_capacity(raw.len());
    let mut labels = Vec::with_capacity(raw.len());
    let mut targets: Vec<Vec<Option<f64>>> =
        vec![Vec::with_capacity(raw.len()); continuous.len()];

    for (i, row) in raw.rows.iter().enumerate() {
        let row_no = i + 1;
        let cell = |name: &str| row.get(index[name]).map(String::as_str).unwrap_or_default();

        let mut values: Vec<RawValue> = Vec::with_capacity(FEATURE_COUNT);
        for feature in FEATURE_COLUMNS {
            let text = cell(feature);
            if is_missing(text) {
                return Err(malformed(row_no, feature, text));
            }
            if is_categorical(feature) {
                values.push(RawValue::Text(text.to_string()));
            } else {
                let v = parse_number(text).ok_or_else(|| malformed(row_no, feature, text))?;
                values.push(RawValue::Number(v));
            }
        }
        let values: [RawValue; FEATURE_COUNT] = values
            .try_into()
            .map_err(|_| malformed(row_no, "<row>", "wrong feature count"))?;
        records.push(RawRecord::new(values));

        let label = cell(LABEL_COLUMN);
        if is_missing(label) {
            return Err(malformed(row_no, LABEL_COLUMN, label));
        }
        labels.push(label);

        for (slot, target) in targets.iter_mut().zip(&continuous) {
            let text = cell(target.column());
            if is_missing(text) {
                slot.push(None);
            } else {
                let v = parse_number(text)
                    .ok_or_else(|| malformed(row_no, target.column(), text))?;
                slot.push(Some(v));
            }
        }
    }

    let codec = FeatureCodec::fit(&records, &labels)?;
    for column in CATEGORICAL_FEATURES.iter().copied().chain([LABEL_COLUMN]) {
        if let Some(codes) = codec.encodings().column(column) {
            tracing::info!("encoded {}: {:?}", column, codes.categories());
        }
    }

    let mut filled: Vec<Vec<f64>> = Vec::with_capacity(continuous.len());
    for (column, target) in targets.iter().zip(&continuous) {
        filled.push(impute_mean(target.column(), column)?);
    }

    let mut rows = Vec::with_capacity(raw.len());
    for (i, record) in records.iter().enumerate() {
        rows.push(TrainingRow {
            features: codec.encode(record)?,
            energy_kwh: filled[0][i],
            battery_health_percent: filled[1][i],
            estimated_range_km: filled[2][i],
            recommended_action: codec.encode_label(labels[i])?,
        });
    }

    tracing::info!(rows = rows.len(), "dataset prepared");
    Ok(PreparedDataset {
        table: TrainingTable::new(rows),
        codec,
    })
}

/// Fills gaps with the mean of the present values.
pub fn impute_mean(column: &str, values: &[Option<f64>]) -> Result<Vec<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let missing = values.len() - present.len();
    if present.is_empty() {
        return Err(TrainingDataError::NoObservedValues {
            column: column.to_string(),
        }
        .into());
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    let filled: Vec<f64> = values.iter().map(|v| v.unwrap_or(mean)).collect();
    let remaining = count_missing(&filled);
    if missing > 0 {
        tracing::info!(column, missing, remaining, mean, "imputed missing target values");
    } else {
        tracing::debug!(column, remaining, "no missing target values");
    }
    Ok(filled)
}

/// Cells with no usable value (NaN or infinite).
pub fn count_missing(values: &[f64]) -> usize {
    values.iter().filter(|v| !v.is_finite()).count()
}
