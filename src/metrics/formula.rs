//! Pure formula evaluation for benchmark metrics.
//!
//! Each metric's value is derived from named raw input fields (ARR figures,
//! spend, churn, headcount) according to its `MetricFormula`. Evaluation is
//! deterministic: the same inputs always produce the same output, rounded to
//! a fixed precision.
//!
//! ## Formulas
//! ```text
//! revenue growth        = (current - previous) / previous * 100
//! net dollar retention  = (begin + expansion - contraction - churn) / begin * 100
//! magic number          = net_new_arr / sales_spend
//! ebitda margin         = ebitda / revenue * 100
//! ```
//! and the remaining catalog entries in `apply_formula`.

use super::error::{MetricsError, Result};
use super::models::{MetricDefinition, MetricFormula};
use std::collections::HashMap;
use tracing::debug;

/// Fixed constants for formula evaluation.
pub mod constants {
    /// Decimal digits every computed value is rounded to.
    pub const RESULT_PRECISION_DIGITS: u32 = 4;
}

pub struct FormulaEngine;

impl FormulaEngine {
    /// Compute a metric's value from raw input fields.
    ///
    /// Validates required fields, applies the formula, rounds to
    /// [`constants::RESULT_PRECISION_DIGITS`], and enforces the definition's
    /// valid range. Out-of-range results fail, never clamp.
    pub fn compute(definition: &MetricDefinition, inputs: &HashMap<String, f64>) -> Result<f64> {
        Self::validate_inputs(definition, inputs)?;

        let raw = Self::apply_formula(definition, inputs)?;

        if !raw.is_finite() {
            return Err(MetricsError::Calculation {
                metric_id: definition.id.clone(),
                reason: format!("non-finite result {raw}"),
            });
        }

        let value = round_to_precision(raw, constants::RESULT_PRECISION_DIGITS);

        let (min, max) = definition.valid_range;
        if value < min || value > max {
            return Err(MetricsError::ValueOutOfRange {
                metric_id: definition.id.clone(),
                value,
                min,
                max,
            });
        }

        debug!(metric_id = %definition.id, value, "computed metric value");
        Ok(value)
    }

    fn validate_inputs(
        definition: &MetricDefinition,
        inputs: &HashMap<String, f64>,
    ) -> Result<()> {
        let mut bad_fields: Vec<String> = Vec::new();

        for field in &definition.required_fields {
            match inputs.get(field) {
                Some(v) if v.is_finite() => {}
                _ => bad_fields.push(field.clone()),
            }
        }

        if bad_fields.is_empty() {
            Ok(())
        } else {
            Err(MetricsError::MissingFields {
                metric_id: definition.id.clone(),
                fields: bad_fields,
            })
        }
    }

    fn apply_formula(
        definition: &MetricDefinition,
        inputs: &HashMap<String, f64>,
    ) -> Result<f64> {
        let field = |name: &str| -> f64 {
            // Presence and finiteness were established by validate_inputs.
            *inputs.get(name).unwrap_or(&f64::NAN)
        };
        let divide = |numerator: f64, denominator: f64, what: &str| -> Result<f64> {
            if denominator == 0.0 || !denominator.is_finite() {
                return Err(MetricsError::Calculation {
                    metric_id: definition.id.clone(),
                    reason: format!("division by zero or non-finite {what}"),
                });
            }
            Ok(numerator / denominator)
        };

        match definition.formula {
            MetricFormula::RevenueGrowth => {
                let previous = field("previous_arr");
                Ok(divide(field("current_arr") - previous, previous, "previous_arr")? * 100.0)
            }
            MetricFormula::NetDollarRetention => {
                let begin = field("beginning_arr");
                let retained =
                    begin + field("expansion") - field("contraction") - field("churn");
                Ok(divide(retained, begin, "beginning_arr")? * 100.0)
            }
            MetricFormula::GrossRevenueRetention => {
                let begin = field("beginning_arr");
                let retained = begin - field("contraction") - field("churn");
                Ok(divide(retained, begin, "beginning_arr")? * 100.0)
            }
            MetricFormula::LogoChurnRate => Ok(divide(
                field("churned_customers"),
                field("beginning_customers"),
                "beginning_customers",
            )? * 100.0),
            MetricFormula::MagicNumber => {
                divide(field("net_new_arr"), field("sales_spend"), "sales_spend")
            }
            MetricFormula::BurnMultiple => {
                divide(field("net_burn"), field("net_new_arr"), "net_new_arr")
            }
            MetricFormula::EbitdaMargin => {
                Ok(divide(field("ebitda"), field("revenue"), "revenue")? * 100.0)
            }
            MetricFormula::GrossMargin => {
                let revenue = field("revenue");
                Ok(divide(revenue - field("cogs"), revenue, "revenue")? * 100.0)
            }
            MetricFormula::RuleOf40 => Ok(field("growth_rate") + field("profit_margin")),
            MetricFormula::ArrPerEmployee => {
                divide(field("arr"), field("employees"), "employees")
            }
        }
    }
}

fn round_to_precision(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}
