use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::models::{NormalizedAd, RawAdRecord};

pub const TEXT_CAP: usize = 5000;
pub const DUPLICATION_PREFIX: usize = 120;
const FRAGMENT_SEPARATOR: &str = " | ";

/// Supplies the engagement count behind the per-ad velocity signal.
pub trait EngagementSource {
    fn engagement_count(&self, record: &RawAdRecord) -> Option<f64>;
}

/// The ad archive exposes no engagement counts, so velocity stays at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEngagement;

impl EngagementSource for NoEngagement {
    fn engagement_count(&self, _record: &RawAdRecord) -> Option<f64> {
        None
    }
}

/// Uses the midpoint of the reported impression bucket as the engagement count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpressionsMidpoint;

impl EngagementSource for ImpressionsMidpoint {
    fn engagement_count(&self, record: &RawAdRecord) -> Option<f64> {
        record.impressions.as_ref().and_then(|range| range.midpoint())
    }
}

pub fn normalize_ads(
    records: &[RawAdRecord],
    now: DateTime<Utc>,
    engagement: &dyn EngagementSource,
) -> Vec<NormalizedAd> {
    let mut ads: Vec<NormalizedAd> = records
        .iter()
        .map(|record| normalize_record(record, now, engagement))
        .collect();

    let keys: Vec<String> = ads
        .iter()
        .map(|ad| duplication_key(&ad.advertiser_id, &ad.unified_text))
        .collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in &keys {
        *counts.entry(key.as_str()).or_insert(0) += 1;
    }

    for (ad, key) in ads.iter_mut().zip(keys.iter()) {
        let repeats = counts.get(key.as_str()).copied().unwrap_or(1);
        ad.sustained_spend = repeats as f64 + ad.age_hours / 24.0;
    }

    tracing::debug!(
        ads = ads.len(),
        distinct_keys = counts.len(),
        "normalized ad batch"
    );
    ads
}

fn normalize_record(
    record: &RawAdRecord,
    now: DateTime<Utc>,
    engagement: &dyn EngagementSource,
) -> NormalizedAd {
    let unified_text = unify_text(record);
    let language = detect_language(&unified_text);
    let start_time = record.ad_delivery_start_time.as_deref().and_then(parse_timestamp);
    let stop_time = record.ad_delivery_stop_time.as_deref().and_then(parse_timestamp);

    if start_time.is_none() && record.ad_delivery_start_time.is_some() {
        tracing::debug!(ad_id = %record.id, "unparsable delivery start time");
    }

    let age_hours = start_time
        .map(|start| (now - start).num_milliseconds() as f64 / 3_600_000.0)
        .unwrap_or(0.0)
        .max(0.0);
    let velocity = velocity(engagement.engagement_count(record), age_hours);

    NormalizedAd {
        keyword: record.keyword.clone(),
        ad_id: record.id.clone(),
        advertiser_id: record.page_id.clone(),
        advertiser_name: record.page_name.clone(),
        snapshot_url: record.ad_snapshot_url.clone(),
        unified_text,
        language,
        start_time,
        is_active: stop_time.is_none(),
        stop_time,
        age_hours,
        velocity,
        sustained_spend: 0.0,
    }
}

pub fn unify_text(record: &RawAdRecord) -> String {
    let joined = record
        .ad_creative_bodies
        .iter()
        .chain(record.ad_creative_link_titles.iter())
        .chain(record.ad_creative_link_descriptions.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR);
    truncate_chars(&joined, TEXT_CAP)
}

pub fn detect_language(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    whatlang::detect(text)
        .map(|info| info.lang().code().to_string())
        .unwrap_or_default()
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

pub fn duplication_key(advertiser_id: &str, unified_text: &str) -> String {
    format!(
        "{}::{}",
        advertiser_id,
        truncate_chars(unified_text, DUPLICATION_PREFIX)
    )
}

fn velocity(engagement: Option<f64>, age_hours: f64) -> f64 {
    let divisor = if age_hours > 0.0 { age_hours } else { 1.0 };
    match engagement {
        Some(count) if count.is_finite() && count > 0.0 => count / divisor,
        _ => 0.0,
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
