//! Value reconciliation
//!
//! Compares external figures with what the portal already computed:
//! - the two income disclosures (decrease / increase), which never fire together
//! - the submission gate over ISR, IVA and their total

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{EXPECTED_INCOME_LABELS, ISR_DUE_LABEL, IVA_DUE_LABEL};
use crate::values::ExternalValueSet;

/// Tolerance, in pesos, for the income disclosures.
pub const DISCLOSURE_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Yes,
    No,
}

impl Decision {
    /// Option label of the portal's Sí/No questions.
    pub fn label(self) -> &'static str {
        match self {
            Decision::Yes => "Sí",
            Decision::No => "No",
        }
    }

    pub fn is_yes(self) -> bool {
        self == Decision::Yes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Portal shows more income than the workbook.
    Decrease,
    /// Workbook shows more income than the portal.
    Increase,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub direction: Direction,
    pub observed: f64,
    pub expected: f64,
    /// `observed - expected`
    pub delta: f64,
    pub threshold: f64,
    pub decision: Decision,
}

impl ReconciliationResult {
    /// Whole-peso amount of the corrective entry.
    pub fn corrective_amount(&self) -> u64 {
        self.delta.abs().trunc() as u64
    }
}

/// One disclosure check on the `expected`/`observed` pair.
pub fn reconcile(
    direction: Direction,
    expected: f64,
    observed: f64,
    tolerance: f64,
) -> ReconciliationResult {
    let delta = observed - expected;
    let fires = match direction {
        Direction::Decrease => delta > tolerance,
        Direction::Increase => -delta > tolerance,
    };
    ReconciliationResult {
        direction,
        observed,
        expected,
        delta,
        threshold: tolerance,
        decision: if fires { Decision::Yes } else { Decision::No },
    }
}

/// Decrease and increase checks for one income figure.
pub fn income_disclosures(
    expected: f64,
    observed: f64,
    tolerance: f64,
) -> (ReconciliationResult, ReconciliationResult) {
    (
        reconcile(Direction::Decrease, expected, observed, tolerance),
        reconcile(Direction::Increase, expected, observed, tolerance),
    )
}

/// First workbook income figure that is present and nonzero, with its label.
pub fn expected_income(values: &ExternalValueSet) -> Option<(&'static str, f64)> {
    EXPECTED_INCOME_LABELS
        .iter()
        .find_map(|label| values.nonzero_amount(label).map(|v| (*label, v)))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TotalsCheck {
    pub name: &'static str,
    pub expected: f64,
    pub observed: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedTotals {
    pub isr: f64,
    pub iva: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalsVerdict {
    pub checks: [TotalsCheck; 3],
    pub tolerance: f64,
}

impl TotalsVerdict {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

impl fmt::Display for TotalsVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [isr, iva, total] = &self.checks;
        write!(
            f,
            "expected ISR={:.2} IVA={:.2} Total={:.2}; observed ISR={:.2} IVA={:.2} Total={:.2} (tolerance ±{})",
            isr.expected,
            iva.expected,
            total.expected,
            isr.observed,
            iva.observed,
            total.observed,
            self.tolerance
        )
    }
}

/// Submission gate. Every check must be within `tolerance`.
pub fn check_totals(
    values: &ExternalValueSet,
    observed: ObservedTotals,
    tolerance: f64,
) -> TotalsVerdict {
    let expected_isr = values.amount_or_zero(ISR_DUE_LABEL);
    let expected_iva = values.amount_or_zero(IVA_DUE_LABEL);
    let observed_total = if observed.total == 0.0 && (observed.isr != 0.0 || observed.iva != 0.0) {
        observed.isr + observed.iva
    } else {
        observed.total
    };

    let check = |name, expected: f64, observed: f64| TotalsCheck {
        name,
        expected,
        observed,
        passed: (expected - observed).abs() <= tolerance,
    };
    TotalsVerdict {
        checks: [
            check("ISR", expected_isr, observed.isr),
            check("IVA", expected_iva, observed.iva),
            check("Total", expected_isr + expected_iva, observed_total),
        ],
        tolerance,
    }
}
