//! External figures the declaration is filled and checked against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::catalog::{self, DEFAULT_DECLARATION_TYPE};

/// One workbook cell. `Missing` is an explicit "no data" marker and is
/// distinct from both an absent label and a zero amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExternalValue {
    Amount(f64),
    Missing,
}

impl ExternalValue {
    pub fn amount(&self) -> Option<f64> {
        match self {
            ExternalValue::Amount(v) => Some(*v),
            ExternalValue::Missing => None,
        }
    }
}

/// Period fields of the declaration. Any of them may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub periodicidad: Option<u32>,
}

impl Period {
    pub fn periodicity_letter(&self) -> &'static str {
        catalog::periodicity_letter(self.periodicidad.unwrap_or(1))
    }

    pub fn month_name(&self) -> Option<&'static str> {
        self.month.and_then(catalog::month_name)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = self.year.map(|y| y.to_string()).unwrap_or_else(|| "-".into());
        let month = self
            .month
            .map(|m| format!("{m:02}"))
            .unwrap_or_else(|| "-".into());
        write!(f, "{year}/{month} ({})", self.periodicity_letter())
    }
}

/// Label to value map plus period, built once per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalValueSet {
    label_map: BTreeMap<String, ExternalValue>,
    pub period: Period,
    pub declaration_type: Option<String>,
    pub origin: Option<PathBuf>,
}

impl ExternalValueSet {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }

    pub fn with_amount(mut self, label: &str, amount: f64) -> Self {
        self.insert(label, ExternalValue::Amount(amount));
        self
    }

    pub fn with_missing(mut self, label: &str) -> Self {
        self.insert(label, ExternalValue::Missing);
        self
    }

    pub fn insert(&mut self, label: &str, value: ExternalValue) {
        self.label_map.insert(label.trim().to_string(), value);
    }

    pub fn get(&self, label: &str) -> Option<ExternalValue> {
        self.label_map.get(label).copied()
    }

    /// Amount for `label`. Absent labels and `Missing` markers are `None`.
    pub fn amount(&self, label: &str) -> Option<f64> {
        self.get(label).and_then(|v| v.amount())
    }

    /// Amount for `label`, with absent and `Missing` read as zero.
    pub fn amount_or_zero(&self, label: &str) -> f64 {
        self.amount(label).unwrap_or(0.0)
    }

    /// Amount for `label` only when it is present and not zero.
    pub fn nonzero_amount(&self, label: &str) -> Option<f64> {
        self.amount(label).filter(|v| v.abs() >= 0.005)
    }

    pub fn declaration_type(&self) -> &str {
        self.declaration_type
            .as_deref()
            .unwrap_or(DEFAULT_DECLARATION_TYPE)
    }

    pub fn len(&self) -> usize {
        self.label_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_map.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.label_map.keys().map(String::as_str)
    }
}

/// Renders an amount the way the portal's text inputs take it.
pub fn format_amount(amount: f64) -> String {
    if amount.fract().abs() < 0.005 {
        format!("{:.0}", amount)
    } else {
        format!("{:.2}", amount)
    }
}
