//! Fuzzy engine — maps indicator values into a bounded [0, 1] feature space.
//!
//! A `FuzzyGroup` is the ordered collection of named sets attached to one
//! indicator; evaluating it against a scalar produces the membership vector
//! in declaration order. Sets need not partition and need not sum to 1.
//!
//! All configuration problems (unknown indicator reference, duplicate set
//! names, malformed parameters) surface at construction time, never during
//! evaluation.

pub mod membership;

pub use membership::MembershipFn;

use ndarray::Array2;
use std::collections::BTreeMap;

use crate::error::{KtrdrError, Result};
use crate::indicators::IndicatorValues;

/// A named membership function.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuzzySet {
    pub name: String,
    pub function: MembershipFn,
}

/// The ordered fuzzy sets attached to one indicator instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuzzyGroup {
    /// Canonical indicator instance name (e.g. "rsi_14").
    pub indicator: String,
    pub sets: Vec<FuzzySet>,
}

impl FuzzyGroup {
    /// Membership vector for a scalar, in set declaration order.
    pub fn evaluate(&self, x: f64) -> Vec<f64> {
        self.sets.iter().map(|s| s.function.evaluate(x)).collect()
    }

    /// Batch evaluation: one column per set, `xs.len()` rows.
    pub fn evaluate_series(&self, xs: &[f64]) -> Vec<Vec<f64>> {
        self.sets
            .iter()
            .map(|s| s.function.evaluate_series(xs))
            .collect()
    }
}

/// The full fuzzy layer: ordered groups over ordered sets.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FuzzyEngine {
    groups: Vec<FuzzyGroup>,
}

impl FuzzyEngine {
    /// Validate and build. Rejects empty groups, duplicate set names within
    /// a group, duplicate indicator references, and malformed parameters.
    pub fn new(groups: Vec<FuzzyGroup>) -> Result<Self> {
        let mut seen_indicators = std::collections::BTreeSet::new();
        for group in &groups {
            if group.sets.is_empty() {
                return Err(KtrdrError::Config(format!(
                    "fuzzy group '{}' has no sets",
                    group.indicator
                )));
            }
            if !seen_indicators.insert(group.indicator.clone()) {
                return Err(KtrdrError::Config(format!(
                    "duplicate fuzzy group for indicator '{}'",
                    group.indicator
                )));
            }
            let mut seen_sets = std::collections::BTreeSet::new();
            for set in &group.sets {
                if !seen_sets.insert(set.name.as_str()) {
                    return Err(KtrdrError::Config(format!(
                        "duplicate fuzzy set '{}' in group '{}'",
                        set.name, group.indicator
                    )));
                }
                set.function.validate()?;
            }
        }
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[FuzzyGroup] {
        &self.groups
    }

    /// Check that every group references a known indicator instance.
    /// Called at load time with the names the indicator engine will produce.
    pub fn check_references(&self, available: &[String]) -> Result<()> {
        for group in &self.groups {
            if !available.iter().any(|n| n == &group.indicator) {
                return Err(KtrdrError::Config(format!(
                    "fuzzy group references unknown indicator '{}'",
                    group.indicator
                )));
            }
        }
        Ok(())
    }

    /// Total membership vector width across all groups.
    pub fn width(&self) -> usize {
        self.groups.iter().map(|g| g.sets.len()).sum()
    }

    /// Feature column names, `"{indicator}_{set}"`, in group then set order.
    pub fn feature_names(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.sets
                    .iter()
                    .map(move |s| format!("{}_{}", g.indicator, s.name))
            })
            .collect()
    }

    /// Scalar mode: one membership vector from current indicator values.
    ///
    /// A missing indicator key is a config-level fault (references were
    /// checked at load time); a NaN value propagates NaN memberships.
    pub fn evaluate_scalar(&self, values: &BTreeMap<String, f64>) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.width());
        for group in &self.groups {
            let x = values.get(&group.indicator).copied().ok_or_else(|| {
                KtrdrError::Config(format!(
                    "no value provided for fuzzy group indicator '{}'",
                    group.indicator
                ))
            })?;
            out.extend(group.evaluate(x));
        }
        Ok(out)
    }

    /// Batch mode: an `n_bars x width` membership matrix from precomputed
    /// indicator series. The hot path at training time.
    pub fn evaluate_batch(&self, series: &IndicatorValues, n_bars: usize) -> Result<Array2<f64>> {
        let mut matrix = Array2::from_elem((n_bars, self.width()), f64::NAN);
        let mut col = 0usize;
        for group in &self.groups {
            let xs = series.get_series(&group.indicator).ok_or_else(|| {
                KtrdrError::Config(format!(
                    "no series provided for fuzzy group indicator '{}'",
                    group.indicator
                ))
            })?;
            if xs.len() != n_bars {
                return Err(KtrdrError::Data {
                    message: format!(
                        "series '{}' has {} values, expected {n_bars}",
                        group.indicator,
                        xs.len()
                    ),
                    bar_index: None,
                });
            }
            for column in group.evaluate_series(xs) {
                for (row, v) in column.into_iter().enumerate() {
                    matrix[[row, col]] = v;
                }
                col += 1;
            }
        }
        Ok(matrix)
    }
}

/// Default fuzzy sets for an RSI group: one-sided `low`/`high` shoulders and
/// a `neutral` triangle. Strategy configs override these per indicator.
pub fn default_rsi_sets() -> Vec<FuzzySet> {
    vec![
        FuzzySet {
            name: "low".into(),
            function: MembershipFn::Triangular {
                a: 0.0,
                b: 0.0,
                c: 45.0,
            },
        },
        FuzzySet {
            name: "neutral".into(),
            function: MembershipFn::Triangular {
                a: 30.0,
                b: 50.0,
                c: 70.0,
            },
        },
        FuzzySet {
            name: "high".into(),
            function: MembershipFn::Triangular {
                a: 55.0,
                b: 100.0,
                c: 100.0,
            },
        },
    ]
}
