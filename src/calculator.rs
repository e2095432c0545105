//! Pure metric and result evaluation shared by every handler.

use std::cmp::Ordering;

use crate::error::{AppError, Result};
use crate::registry::{CalculationType, MarketMapping, SpecialLogic};
use crate::source::StatRecord;
use crate::types::{MetricValue, Outcome, SelectionResult, SelectionType};

/// Metric for a record under a mapping.
///
/// Game-outcome mappings derive the metric from `home_score`/`away_score`
/// (home perspective for spreads); everything else sums `metric_columns`,
/// treating null or missing cells as 0.
pub fn calculate_metric_value(record: &dyn StatRecord, mapping: &MarketMapping) -> Option<f64> {
    if let Some(calculation_type) = mapping.calculation_type {
        let home = record.stat("home_score")?;
        let away = record.stat("away_score")?;
        return match calculation_type {
            CalculationType::TotalPoints => Some(home + away),
            CalculationType::PointDifferentialVsSpread => Some(home - away),
            CalculationType::WinnerDetermination => None,
        };
    }

    if mapping.metric_columns.is_empty() {
        return None;
    }
    Some(
        mapping
            .metric_columns
            .iter()
            .map(|column| record.stat(column).unwrap_or(0.0))
            .sum(),
    )
}

pub struct SelectionInput<'a> {
    pub market_type: &'a str,
    pub metric_value: Option<f64>,
    pub selection: &'a SelectionType,
    pub line: Option<f64>,
    pub mapping: &'a MarketMapping,
}

impl SpecialLogic {
    /// Whether the metric satisfies a yes/no prop. `None` for line-based variants.
    pub fn hit(self, metric_value: f64) -> Option<bool> {
        match self {
            SpecialLogic::AnytimeTouchdown | SpecialLogic::FirstTouchdownScorer => {
                Some(metric_value > 0.0)
            }
            SpecialLogic::TwoPlusTouchdowns => Some(metric_value >= 2.0),
            SpecialLogic::CountReceptions | SpecialLogic::CountAttempts => None,
        }
    }
}

pub fn determine_selection_result(input: &SelectionInput<'_>) -> Result<Option<SelectionResult>> {
    let Some(metric) = input.metric_value else {
        return Ok(None);
    };

    if let Some(hit) = input.mapping.special_logic.and_then(|logic| logic.hit(metric)) {
        return match input.selection {
            SelectionType::Yes if hit => Ok(Some(SelectionResult::Won)),
            SelectionType::Yes => Ok(Some(SelectionResult::Lost)),
            SelectionType::No if hit => Ok(Some(SelectionResult::Lost)),
            SelectionType::No => Ok(Some(SelectionResult::Won)),
            other => Err(AppError::UnknownSelectionType(other.to_string())),
        };
    }

    let line = input
        .line
        .ok_or_else(|| AppError::MissingLine(input.market_type.to_string()))?;

    if input.mapping.is_spread() {
        let adjusted_margin = metric + line;
        return Ok(Some(sign_result(adjusted_margin.partial_cmp(&0.0))));
    }

    match input.selection {
        SelectionType::Over => Ok(Some(sign_result(metric.partial_cmp(&line)))),
        SelectionType::Under => Ok(Some(sign_result(line.partial_cmp(&metric)))),
        other => Err(AppError::UnknownSelectionType(other.to_string())),
    }
}

fn sign_result(ordering: Option<Ordering>) -> SelectionResult {
    match ordering {
        Some(Ordering::Greater) => SelectionResult::Won,
        Some(Ordering::Less) => SelectionResult::Lost,
        // NaN never reaches here: metrics come from finite stats and lines.
        Some(Ordering::Equal) | None => SelectionResult::Push,
    }
}

/// Evaluate a numeric metric into the outcome a handler returns.
pub fn numeric_outcome(
    market_type: &str,
    metric_value: Option<f64>,
    selection: &SelectionType,
    line: Option<f64>,
    mapping: &MarketMapping,
) -> Result<Outcome> {
    let selection_result = determine_selection_result(&SelectionInput {
        market_type,
        metric_value,
        selection,
        line,
        mapping,
    })?;
    Ok(Outcome {
        metric_value: metric_value.map(MetricValue::Number),
        selection_result,
    })
}
