//! Process-wide read-only registry of metric definitions.
//!
//! Built once at startup and shared by reference with collaborators; there
//! is no hidden global lookup and nothing mutates a definition after load.

use super::models::{MetricCategory, MetricDefinition, MetricFormula, MetricUnit};
use std::collections::HashMap;

pub struct MetricRegistry {
    definitions: HashMap<String, MetricDefinition>,
}

impl MetricRegistry {
    pub fn new(definitions: Vec<MetricDefinition>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        Self { definitions }
    }

    /// The built-in SaaS benchmark KPI catalog.
    pub fn builtin() -> Self {
        let defs = vec![
            MetricDefinition {
                id: "revenue_growth".to_string(),
                name: "ARR Growth Rate".to_string(),
                category: MetricCategory::Growth,
                unit: MetricUnit::Percentage,
                formula: MetricFormula::RevenueGrowth,
                required_fields: vec!["current_arr".to_string(), "previous_arr".to_string()],
                valid_range: (-100.0, 1000.0),
            },
            MetricDefinition {
                id: "net_dollar_retention".to_string(),
                name: "Net Dollar Retention".to_string(),
                category: MetricCategory::Retention,
                unit: MetricUnit::Percentage,
                formula: MetricFormula::NetDollarRetention,
                required_fields: vec![
                    "beginning_arr".to_string(),
                    "expansion".to_string(),
                    "contraction".to_string(),
                    "churn".to_string(),
                ],
                valid_range: (0.0, 300.0),
            },
            MetricDefinition {
                id: "gross_revenue_retention".to_string(),
                name: "Gross Revenue Retention".to_string(),
                category: MetricCategory::Retention,
                unit: MetricUnit::Percentage,
                formula: MetricFormula::GrossRevenueRetention,
                required_fields: vec![
                    "beginning_arr".to_string(),
                    "contraction".to_string(),
                    "churn".to_string(),
                ],
                valid_range: (0.0, 100.0),
            },
            MetricDefinition {
                id: "logo_churn_rate".to_string(),
                name: "Logo Churn Rate".to_string(),
                category: MetricCategory::Retention,
                unit: MetricUnit::Percentage,
                formula: MetricFormula::LogoChurnRate,
                required_fields: vec![
                    "churned_customers".to_string(),
                    "beginning_customers".to_string(),
                ],
                valid_range: (0.0, 100.0),
            },
            MetricDefinition {
                id: "magic_number".to_string(),
                name: "SaaS Magic Number".to_string(),
                category: MetricCategory::Efficiency,
                unit: MetricUnit::Ratio,
                formula: MetricFormula::MagicNumber,
                required_fields: vec!["net_new_arr".to_string(), "sales_spend".to_string()],
                valid_range: (-10.0, 10.0),
            },
            MetricDefinition {
                id: "burn_multiple".to_string(),
                name: "Burn Multiple".to_string(),
                category: MetricCategory::Efficiency,
                unit: MetricUnit::Ratio,
                formula: MetricFormula::BurnMultiple,
                required_fields: vec!["net_burn".to_string(), "net_new_arr".to_string()],
                valid_range: (-50.0, 50.0),
            },
            MetricDefinition {
                id: "ebitda_margin".to_string(),
                name: "EBITDA Margin".to_string(),
                category: MetricCategory::Profitability,
                unit: MetricUnit::Percentage,
                formula: MetricFormula::EbitdaMargin,
                required_fields: vec!["ebitda".to_string(), "revenue".to_string()],
                valid_range: (-300.0, 100.0),
            },
            MetricDefinition {
                id: "gross_margin".to_string(),
                name: "Gross Margin".to_string(),
                category: MetricCategory::Profitability,
                unit: MetricUnit::Percentage,
                formula: MetricFormula::GrossMargin,
                required_fields: vec!["revenue".to_string(), "cogs".to_string()],
                valid_range: (-100.0, 100.0),
            },
            MetricDefinition {
                id: "rule_of_40".to_string(),
                name: "Rule of 40".to_string(),
                category: MetricCategory::Growth,
                unit: MetricUnit::Percentage,
                formula: MetricFormula::RuleOf40,
                required_fields: vec!["growth_rate".to_string(), "profit_margin".to_string()],
                valid_range: (-200.0, 300.0),
            },
            MetricDefinition {
                id: "arr_per_employee".to_string(),
                name: "ARR per Employee".to_string(),
                category: MetricCategory::Efficiency,
                unit: MetricUnit::Currency,
                formula: MetricFormula::ArrPerEmployee,
                required_fields: vec!["arr".to_string(), "employees".to_string()],
                valid_range: (0.0, 10_000_000.0),
            },
        ];

        Self::new(defs)
    }

    pub fn get(&self, metric_id: &str) -> Option<&MetricDefinition> {
        self.definitions.get(metric_id)
    }

    pub fn contains(&self, metric_id: &str) -> bool {
        self.definitions.contains_key(metric_id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.values()
    }
}
