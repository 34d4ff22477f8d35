use tracing::info;

use super::ValueSource;
use crate::errors::EngineError;
use crate::values::{ExternalValueSet, Period};

/// Fixed figures for the dry-run modes that have no workbook.
#[derive(Debug, Clone)]
pub struct StaticValueSource {
    values: ExternalValueSet,
}

impl StaticValueSource {
    pub fn new(values: ExternalValueSet) -> Self {
        Self { values }
    }

    /// Period only, no figures.
    pub fn period(year: i32, month: u32, periodicidad: u32) -> Self {
        Self::new(ExternalValueSet::new(Period {
            year: Some(year),
            month: Some(month),
            periodicidad: Some(periodicidad),
        }))
    }
}

impl ValueSource for StaticValueSource {
    fn load(&self) -> Result<ExternalValueSet, EngineError> {
        info!(period = %self.values.period, labels = self.values.len(), "static values");
        Ok(self.values.clone())
    }
}
