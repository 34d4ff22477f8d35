//! Workbook export reader
//!
//! The Impuestos sheet exported as `label,amount` rows. The period comes
//! from a `YYYYMM_` file-name prefix, else from optional `Ejercicio`,
//! `Periodo` and `Periodicidad` rows.

use action_primitives::parse_currency;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ValueSource;
use crate::errors::EngineError;
use crate::values::{ExternalValue, ExternalValueSet, Period};

const YEAR_ROW: &str = "Ejercicio";
const MONTH_ROW: &str = "Periodo";
const PERIODICITY_ROW: &str = "Periodicidad";

pub struct CsvValueSource {
    path: PathBuf,
}

impl CsvValueSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ValueSource for CsvValueSource {
    fn load(&self) -> Result<ExternalValueSet, EngineError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|err| prerequisite(&self.path, err))?;

        let mut values = ExternalValueSet::default();
        let mut period_rows = Period::default();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|err| prerequisite(&self.path, err))?;
            let Some(label) = record.get(0).filter(|l| !l.is_empty()) else {
                continue;
            };
            let raw = record.get(1).unwrap_or_default();

            match label {
                YEAR_ROW => period_rows.year = raw.parse().ok(),
                MONTH_ROW => period_rows.month = raw.parse().ok(),
                PERIODICITY_ROW => period_rows.periodicidad = raw.parse().ok(),
                _ => {}
            }

            match cell_value(raw) {
                Some(value) => values.insert(label, value),
                None => debug!(line = line + 1, label, raw, "non-numeric cell; skipped"),
            }
        }

        if values.is_empty() {
            return Err(EngineError::Prerequisite(format!(
                "workbook export has no rows: {}",
                self.path.display()
            )));
        }

        values.period = match period_from_file_name(&self.path) {
            Some((year, month)) => Period {
                year: Some(year),
                month: Some(month),
                periodicidad: period_rows.periodicidad.or(Some(1)),
            },
            None => {
                warn!(path = %self.path.display(), "no YYYYMM_ prefix; period taken from sheet rows");
                Period {
                    periodicidad: period_rows.periodicidad.or(Some(1)),
                    ..period_rows
                }
            }
        };
        values.origin = Some(self.path.clone());
        info!(
            path = %self.path.display(),
            labels = values.len(),
            period = %values.period,
            "workbook values loaded"
        );
        Ok(values)
    }
}

/// `-` and empty cells are `Missing`; text that holds no figure is dropped.
fn cell_value(raw: &str) -> Option<ExternalValue> {
    let trimmed = raw.trim().trim_start_matches('$').trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Some(ExternalValue::Missing);
    }
    parse_currency(raw).map(ExternalValue::Amount)
}

fn period_from_file_name(path: &Path) -> Option<(i32, u32)> {
    let name = path.file_name()?.to_str()?;
    let prefix = name.get(..7)?;
    let (digits, sep) = prefix.split_at(6);
    if sep != "_" || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = digits[..4].parse().ok()?;
    let month = digits[4..].parse().ok()?;
    Some((year, month))
}

fn prerequisite(path: &Path, err: csv::Error) -> EngineError {
    EngineError::Prerequisite(format!("cannot read workbook export {}: {err}", path.display()))
}
