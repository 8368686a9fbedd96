use std::cmp::Ordering;

use crate::models::{ProductSignalRow, ScoredProduct};

/// Population z-score of a column. Non-finite inputs count as zero, and a
/// column without spread standardizes to all zeros.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let cleaned: Vec<f64> = values
        .iter()
        .map(|value| if value.is_finite() { *value } else { 0.0 })
        .collect();

    if cleaned.iter().all(|value| *value == cleaned[0]) {
        return vec![0.0; cleaned.len()];
    }

    let count = cleaned.len() as f64;
    let mean = cleaned.iter().sum::<f64>() / count;
    let variance = cleaned
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / count;
    let std_dev = variance.sqrt();

    // rounding in the mean leaves a residual spread on near-constant columns
    if !std_dev.is_finite() || std_dev <= f64::EPSILON * mean.abs().max(1.0) {
        return vec![0.0; cleaned.len()];
    }
    cleaned.iter().map(|value| (value - mean) / std_dev).collect()
}

fn column(rows: &[ProductSignalRow], field: fn(&ProductSignalRow) -> f64) -> Vec<f64> {
    standardize(&rows.iter().map(field).collect::<Vec<_>>())
}

pub fn score_products(rows: &[ProductSignalRow]) -> Vec<ScoredProduct> {
    let mention = column(rows, |row| row.mention_rate);
    let trend = column(rows, |row| row.trend_score);
    let tiktok = column(rows, |row| row.tiktok_velocity);
    let intent = column(rows, |row| row.purchase_intent_pct);
    let spend = column(rows, |row| row.sustained_spend);
    let velocity = column(rows, |row| row.velocity);

    let scored = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let demand_score = mention[i] + trend[i] + tiktok[i] + intent[i];
            let competition_score = spend[i] + velocity[i];
            ScoredProduct {
                signals: row.clone(),
                demand_score,
                competition_score,
                gap_score: demand_score - competition_score,
            }
        })
        .collect();

    rank(scored)
}

/// Highest gap first; equal scores keep their incoming order.
pub fn rank(mut scored: Vec<ScoredProduct>) -> Vec<ScoredProduct> {
    scored.sort_by(|a, b| b.gap_score.partial_cmp(&a.gap_score).unwrap_or(Ordering::Equal));
    scored
}

pub fn top(scored: &[ScoredProduct], limit: usize) -> &[ScoredProduct] {
    &scored[..limit.min(scored.len())]
}
