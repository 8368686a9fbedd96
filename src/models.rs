use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAdRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub page_name: String,
    #[serde(default)]
    pub ad_delivery_start_time: Option<String>,
    #[serde(default)]
    pub ad_delivery_stop_time: Option<String>,
    #[serde(default)]
    pub ad_snapshot_url: String,
    #[serde(default, deserialize_with = "string_items")]
    pub ad_creative_bodies: Vec<String>,
    #[serde(default, deserialize_with = "string_items")]
    pub ad_creative_link_titles: Vec<String>,
    #[serde(default, deserialize_with = "string_items")]
    pub ad_creative_link_descriptions: Vec<String>,
    #[serde(default)]
    pub impressions: Option<ImpressionRange>,
    #[serde(default, rename = "_keyword")]
    pub keyword: String,
}

/// Impression bucket as reported by the ad archive. Bounds arrive as strings
/// or numbers depending on the export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImpressionRange {
    #[serde(default)]
    pub lower_bound: Option<serde_json::Value>,
    #[serde(default)]
    pub upper_bound: Option<serde_json::Value>,
}

impl ImpressionRange {
    pub fn midpoint(&self) -> Option<f64> {
        let lower = self.lower_bound.as_ref().and_then(numeric_value);
        let upper = self.upper_bound.as_ref().and_then(numeric_value);
        match (lower, upper) {
            (Some(lower), Some(upper)) => Some((lower + upper) / 2.0),
            (Some(bound), None) | (None, Some(bound)) => Some(bound),
            (None, None) => None,
        }
    }
}

fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0)
}

// Creative fragment lists may be null, missing, or hold non-string entries.
fn string_items<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let items = match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(items)
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizedAd {
    pub keyword: String,
    pub ad_id: String,
    pub advertiser_id: String,
    pub advertiser_name: String,
    pub snapshot_url: String,
    pub unified_text: String,
    pub language: String,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub age_hours: f64,
    pub velocity: f64,
    pub sustained_spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedProduct {
    pub product: String,
    #[serde(default)]
    pub synonyms: String,
    #[serde(default)]
    pub angles: String,
    #[serde(default)]
    pub objections: String,
    #[serde(default, deserialize_with = "zero_when_empty")]
    pub purchase_intent_pct: f64,
}

fn zero_when_empty<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendPoint {
    pub keyword: String,
    pub trend_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EngagementTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl EngagementTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductSignalRow {
    pub product: String,
    pub synonyms: String,
    pub angles: String,
    pub objections: String,
    pub purchase_intent_pct: f64,
    pub mention_rate: f64,
    pub velocity: f64,
    pub sustained_spend: f64,
    pub trend_score: f64,
    pub tiktok_velocity: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredProduct {
    pub signals: ProductSignalRow,
    pub demand_score: f64,
    pub competition_score: f64,
    pub gap_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapRow {
    pub product: String,
    pub synonyms: String,
    pub angles: String,
    pub objections: String,
    pub demand_score: f64,
    pub competition_score: f64,
    pub gap_score: f64,
}

#[derive(Debug, Clone)]
pub struct AdvertiserSummary {
    pub advertiser_id: String,
    pub advertiser_name: String,
    pub ad_count: usize,
    pub active_count: usize,
    pub avg_sustained_spend: f64,
}

#[derive(Debug, Clone)]
pub struct KeywordCoverage {
    pub keyword: String,
    pub ad_count: usize,
    pub active_count: usize,
}
