use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{ClassifiedProduct, EngagementTable, NormalizedAd, ProductSignalRow, TrendPoint};

const ENGAGEMENT_MARKERS: [&str; 3] = ["view", "like", "comment"];

/// Which ads feed the velocity and sustained-spend columns of a product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionScope {
    /// Mean over every normalized ad; identical for all products.
    #[default]
    AllAds,
    /// Mean over the ads whose text mentions the product.
    MentioningAds,
}

struct ProductGroup<'a> {
    first: &'a ClassifiedProduct,
    intent_total: f64,
    intent_count: usize,
}

pub fn aggregate_signals(
    classified: &[ClassifiedProduct],
    ads: &[NormalizedAd],
    trends: &[TrendPoint],
    engagement: &EngagementTable,
    scope: CompetitionScope,
) -> Vec<ProductSignalRow> {
    if classified.is_empty() {
        return Vec::new();
    }

    let folded_texts: Vec<String> = ads.iter().map(|ad| ad.unified_text.to_lowercase()).collect();
    let trend_means = trend_means(trends);
    let tiktok_velocity = engagement_velocity(engagement);
    let global_velocity = mean(ads.iter().map(|ad| ad.velocity));
    let global_spend = mean(ads.iter().map(|ad| ad.sustained_spend));

    // groups come out ordered by product label
    let mut groups: BTreeMap<&str, ProductGroup> = BTreeMap::new();
    for row in classified {
        let group = groups
            .entry(row.product.as_str())
            .or_insert_with(|| ProductGroup {
                first: row,
                intent_total: 0.0,
                intent_count: 0,
            });
        if row.purchase_intent_pct.is_finite() {
            group.intent_total += row.purchase_intent_pct;
            group.intent_count += 1;
        }
    }

    let rows: Vec<ProductSignalRow> = groups
        .values()
        .map(|group| {
            let product = group.first.product.as_str();
            let mentions: Vec<usize> = folded_texts
                .iter()
                .enumerate()
                .filter(|(_, text)| text.contains(product))
                .map(|(index, _)| index)
                .collect();

            let mention_rate = if ads.is_empty() {
                0.0
            } else {
                mentions.len() as f64 / ads.len() as f64
            };

            let (velocity, sustained_spend) = match scope {
                CompetitionScope::AllAds => (global_velocity, global_spend),
                CompetitionScope::MentioningAds => (
                    mean(mentions.iter().map(|&index| ads[index].velocity)),
                    mean(mentions.iter().map(|&index| ads[index].sustained_spend)),
                ),
            };

            ProductSignalRow {
                product: product.to_string(),
                synonyms: group.first.synonyms.clone(),
                angles: group.first.angles.clone(),
                objections: group.first.objections.clone(),
                purchase_intent_pct: if group.intent_count == 0 {
                    0.0
                } else {
                    group.intent_total / group.intent_count as f64
                },
                mention_rate,
                velocity,
                sustained_spend,
                trend_score: trend_means.get(product).copied().unwrap_or(0.0),
                tiktok_velocity,
            }
        })
        .collect();

    tracing::debug!(
        classified = classified.len(),
        products = rows.len(),
        ads = ads.len(),
        ?scope,
        "aggregated product signals"
    );
    rows
}

fn trend_means(trends: &[TrendPoint]) -> HashMap<&str, f64> {
    let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
    for point in trends {
        if !point.trend_score.is_finite() {
            continue;
        }
        let entry = totals.entry(point.keyword.as_str()).or_insert((0.0, 0));
        entry.0 += point.trend_score;
        entry.1 += 1;
    }
    totals
        .into_iter()
        .map(|(keyword, (total, count))| (keyword, total / count as f64))
        .collect()
}

pub fn engagement_columns(table: &EngagementTable) -> Vec<usize> {
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            let name = name.to_lowercase();
            ENGAGEMENT_MARKERS.iter().any(|marker| name.contains(marker))
        })
        .filter(|(index, _)| column_is_numeric(table, *index))
        .map(|(index, _)| index)
        .collect()
}

fn column_is_numeric(table: &EngagementTable, index: usize) -> bool {
    let mut seen = false;
    for row in &table.rows {
        let cell = row.get(index).map(|cell| cell.trim()).unwrap_or("");
        if cell.is_empty() {
            continue;
        }
        if cell.parse::<f64>().is_err() {
            return false;
        }
        seen = true;
    }
    seen
}

pub fn engagement_velocity(table: &EngagementTable) -> f64 {
    if table.is_empty() {
        return 0.0;
    }
    let columns = engagement_columns(table);
    if columns.is_empty() {
        return 0.0;
    }

    let total: f64 = table
        .rows
        .iter()
        .flat_map(|row| columns.iter().filter_map(move |&index| row.get(index)))
        .filter_map(|cell| cell.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .sum();
    total / table.rows.len().max(1) as f64
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (total, count) = values.fold((0.0, 0usize), |(total, count), value| {
        (total + value, count + 1)
    });
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
