use std::collections::HashMap;
use std::fmt::Write;
use std::io;

use anyhow::Context;

use crate::models::{AdvertiserSummary, GapRow, KeywordCoverage, NormalizedAd, ScoredProduct};
use crate::score;

pub fn gap_rows(scored: &[ScoredProduct]) -> Vec<GapRow> {
    scored
        .iter()
        .map(|item| GapRow {
            product: item.signals.product.clone(),
            synonyms: item.signals.synonyms.clone(),
            angles: item.signals.angles.clone(),
            objections: item.signals.objections.clone(),
            demand_score: item.demand_score,
            competition_score: item.competition_score,
            gap_score: item.gap_score,
        })
        .collect()
}

pub fn write_gap_csv<W: io::Write>(writer: W, scored: &[ScoredProduct]) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if scored.is_empty() {
        csv_writer.write_record([
            "product",
            "synonyms",
            "angles",
            "objections",
            "demand_score",
            "competition_score",
            "gap_score",
        ])?;
    }
    for row in gap_rows(scored) {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush().context("failed to flush gap csv")?;
    Ok(())
}

pub fn read_gap_csv<R: io::Read>(reader: R) -> anyhow::Result<Vec<GapRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<GapRow>() {
        rows.push(result.context("malformed gap csv row")?);
    }
    Ok(rows)
}

pub fn summarize_by_advertiser(ads: &[NormalizedAd]) -> Vec<AdvertiserSummary> {
    let mut map: HashMap<&str, AdvertiserSummary> = HashMap::new();
    let mut spend_totals: HashMap<&str, f64> = HashMap::new();

    for ad in ads {
        let entry = map
            .entry(ad.advertiser_id.as_str())
            .or_insert_with(|| AdvertiserSummary {
                advertiser_id: ad.advertiser_id.clone(),
                advertiser_name: ad.advertiser_name.clone(),
                ad_count: 0,
                active_count: 0,
                avg_sustained_spend: 0.0,
            });
        entry.ad_count += 1;
        if ad.is_active {
            entry.active_count += 1;
        }
        *spend_totals.entry(ad.advertiser_id.as_str()).or_insert(0.0) += ad.sustained_spend;
    }

    let mut summaries: Vec<AdvertiserSummary> = map
        .into_iter()
        .map(|(id, mut summary)| {
            let total = spend_totals.get(id).copied().unwrap_or(0.0);
            summary.avg_sustained_spend = total / summary.ad_count as f64;
            summary
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.ad_count
            .cmp(&a.ad_count)
            .then_with(|| a.advertiser_id.cmp(&b.advertiser_id))
    });
    summaries
}

pub fn keyword_coverage(ads: &[NormalizedAd]) -> Vec<KeywordCoverage> {
    let mut coverage: Vec<KeywordCoverage> = Vec::new();
    for ad in ads {
        let index = match coverage.iter().position(|item| item.keyword == ad.keyword) {
            Some(index) => index,
            None => {
                coverage.push(KeywordCoverage {
                    keyword: ad.keyword.clone(),
                    ad_count: 0,
                    active_count: 0,
                });
                coverage.len() - 1
            }
        };
        coverage[index].ad_count += 1;
        if ad.is_active {
            coverage[index].active_count += 1;
        }
    }
    coverage
}

pub fn build_report(
    country: &str,
    ads: &[NormalizedAd],
    scored: &[ScoredProduct],
    limit: usize,
) -> String {
    let advertisers = summarize_by_advertiser(ads);
    let keywords = keyword_coverage(ads);

    let mut output = String::new();

    let _ = writeln!(output, "# Market Gap Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} ads across {} keywords, {} products)",
        country,
        ads.len(),
        keywords.len(),
        scored.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Gap Opportunities");

    if scored.is_empty() {
        let _ = writeln!(output, "No results to show yet. Try more keywords or a larger ad sample.");
    } else {
        for (rank, item) in score::top(scored, limit).iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} gap {:.2} (demand {:.2}, competition {:.2})",
                rank + 1,
                item.signals.product,
                item.gap_score,
                item.demand_score,
                item.competition_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Signal Breakdown");

    if scored.is_empty() {
        let _ = writeln!(output, "No product signals for this run.");
    } else {
        let _ = writeln!(
            output,
            "| product | mentions | trend | video engagement | intent % | sustained spend | velocity |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        for item in score::top(scored, limit) {
            let signals = &item.signals;
            let _ = writeln!(
                output,
                "| {} | {:.1}% | {:.1} | {:.1} | {:.1} | {:.2} | {:.2} |",
                signals.product,
                signals.mention_rate * 100.0,
                signals.trend_score,
                signals.tiktok_velocity,
                signals.purchase_intent_pct,
                signals.sustained_spend,
                signals.velocity
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Advertiser Saturation");

    if advertisers.is_empty() {
        let _ = writeln!(output, "No ads collected for this run.");
    } else {
        for summary in advertisers.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}): {} ads, {} active (avg sustained spend {:.1})",
                summary.advertiser_name,
                summary.advertiser_id,
                summary.ad_count,
                summary.active_count,
                summary.avg_sustained_spend
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Keyword Coverage");

    if keywords.is_empty() {
        let _ = writeln!(output, "No ads collected for this run.");
    } else {
        for item in &keywords {
            let _ = writeln!(
                output,
                "- {}: {} ads ({} active)",
                item.keyword, item.ad_count, item.active_count
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductSignalRow;

    fn scored(product: &str, demand: f64, competition: f64) -> ScoredProduct {
        ScoredProduct {
            signals: ProductSignalRow {
                product: product.to_string(),
                synonyms: "couch, settee".to_string(),
                angles: "\"free\" delivery".to_string(),
                objections: String::new(),
                purchase_intent_pct: 12.5,
                mention_rate: 0.25,
                velocity: 0.0,
                sustained_spend: 2.0,
                trend_score: 80.0,
                tiktok_velocity: 0.0,
            },
            demand_score: demand,
            competition_score: competition,
            gap_score: demand - competition,
        }
    }

    fn ad(advertiser: &str, keyword: &str, active: bool, spend: f64) -> NormalizedAd {
        NormalizedAd {
            keyword: keyword.to_string(),
            ad_id: "1".to_string(),
            advertiser_id: advertiser.to_string(),
            advertiser_name: format!("{advertiser} store"),
            snapshot_url: String::new(),
            unified_text: "sofa".to_string(),
            language: "eng".to_string(),
            start_time: None,
            stop_time: None,
            is_active: active,
            age_hours: 0.0,
            velocity: 0.0,
            sustained_spend: spend,
        }
    }

    #[test]
    fn csv_export_has_exact_columns() {
        let mut buffer = Vec::new();
        write_gap_csv(&mut buffer, &[scored("sofa", 1.0, 0.5)]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "product,synonyms,angles,objections,demand_score,competition_score,gap_score"
        );
    }

    #[test]
    fn empty_export_still_writes_header() {
        let mut buffer = Vec::new();
        write_gap_csv(&mut buffer, &[]).unwrap();
        let rows = read_gap_csv(buffer.as_slice()).unwrap();
        assert!(rows.is_empty());
        assert!(String::from_utf8(buffer).unwrap().starts_with("product,"));
    }

    #[test]
    fn csv_round_trip_preserves_gap_scores() {
        let items = vec![
            scored("sofa", 1.0 / 3.0, -0.123456789012345),
            scored("سرير مع", -2.718281828459045, 0.1),
        ];
        let mut buffer = Vec::new();
        write_gap_csv(&mut buffer, &items).unwrap();
        let rows = read_gap_csv(buffer.as_slice()).unwrap();

        assert_eq!(rows.len(), 2);
        for (row, item) in rows.iter().zip(items.iter()) {
            assert_eq!(row.product, item.signals.product);
            assert_eq!(row.angles, item.signals.angles);
            assert!((row.gap_score - item.gap_score).abs() < 1e-9);
        }
    }

    #[test]
    fn advertisers_sorted_by_volume() {
        let ads = vec![
            ad("page-2", "sofa", true, 1.0),
            ad("page-1", "sofa", true, 2.0),
            ad("page-1", "bed", false, 4.0),
        ];
        let summaries = summarize_by_advertiser(&ads);
        assert_eq!(summaries[0].advertiser_id, "page-1");
        assert_eq!(summaries[0].ad_count, 2);
        assert_eq!(summaries[0].active_count, 1);
        assert!((summaries[0].avg_sustained_spend - 3.0).abs() < 1e-9);
    }

    #[test]
    fn keyword_coverage_keeps_first_seen_order() {
        let ads = vec![
            ad("page-1", "sofa", true, 1.0),
            ad("page-1", "bed", false, 1.0),
            ad("page-2", "sofa", false, 1.0),
        ];
        let coverage = keyword_coverage(&ads);
        assert_eq!(coverage[0].keyword, "sofa");
        assert_eq!(coverage[0].ad_count, 2);
        assert_eq!(coverage[0].active_count, 1);
        assert_eq!(coverage[1].keyword, "bed");
    }

    #[test]
    fn report_handles_empty_run() {
        let report = build_report("JO", &[], &[], 25);
        assert!(report.contains("# Market Gap Report"));
        assert!(report.contains("No results to show yet."));
        assert!(report.contains("No ads collected for this run."));
    }

    #[test]
    fn report_lists_ranked_products() {
        let ads = vec![ad("page-1", "sofa", true, 1.0)];
        let report = build_report(
            "SA",
            &ads,
            &[scored("sofa", 2.0, 0.5), scored("bed", 0.0, 1.0)],
            1,
        );
        assert!(report.contains("Generated for SA (1 ads across 1 keywords, 2 products)"));
        assert!(report.contains("1. sofa gap 1.50"));
        assert!(!report.contains("2. bed"));
        assert!(report.contains("- sofa: 1 ads (1 active)"));
    }
}
