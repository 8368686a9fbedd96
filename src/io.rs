use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::Context;

use crate::models::{ClassifiedProduct, EngagementTable, NormalizedAd, RawAdRecord, TrendPoint};

pub fn load_raw_ads(path: &Path) -> anyhow::Result<Vec<RawAdRecord>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open ads file {}", path.display()))?;
    parse_raw_ads(BufReader::new(file))
        .with_context(|| format!("failed to parse ads file {}", path.display()))
}

/// Accepts either a bare array of ad records or an archive page of the form
/// `{ "data": [...] }`.
pub fn parse_raw_ads<R: io::Read>(reader: R) -> anyhow::Result<Vec<RawAdRecord>> {
    let document: serde_json::Value = serde_json::from_reader(reader)?;
    let items = match document {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut page) => match page.remove("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => anyhow::bail!("expected a `data` array in ads page"),
        },
        _ => anyhow::bail!("expected a JSON array of ads"),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<RawAdRecord>(item) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(index, error = %err, "skipping malformed ad record"),
        }
    }
    Ok(records)
}

pub fn load_trends(path: Option<&Path>) -> anyhow::Result<Vec<TrendPoint>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let file = File::open(path)
        .with_context(|| format!("failed to open trends file {}", path.display()))?;
    parse_trends(file)
}

pub fn parse_trends<R: io::Read>(reader: R) -> anyhow::Result<Vec<TrendPoint>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut points = Vec::new();
    for (index, result) in csv_reader.deserialize::<TrendPoint>().enumerate() {
        match result {
            Ok(point) => points.push(point),
            Err(err) => tracing::warn!(row = index + 1, error = %err, "skipping malformed trend row"),
        }
    }
    Ok(points)
}

/// The short-video export is optional: no path or a missing file both mean no
/// engagement data.
pub fn load_engagement(path: Option<&Path>) -> anyhow::Result<EngagementTable> {
    let Some(path) = path else {
        return Ok(EngagementTable::default());
    };
    if !path.exists() {
        tracing::info!(path = %path.display(), "engagement export not found, continuing without it");
        return Ok(EngagementTable::default());
    }
    let file = File::open(path)
        .with_context(|| format!("failed to open engagement file {}", path.display()))?;
    parse_engagement(file)
        .with_context(|| format!("failed to parse engagement file {}", path.display()))
}

pub fn parse_engagement<R: io::Read>(reader: R) -> anyhow::Result<EngagementTable> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    // exports are not always valid UTF-8; undecodable bytes are replaced
    let headers: Vec<String> = csv_reader
        .byte_headers()?
        .iter()
        .map(|header| String::from_utf8_lossy(header).trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, result) in csv_reader.byte_records().enumerate() {
        match result {
            Ok(record) => rows.push(
                record
                    .iter()
                    .map(|cell| String::from_utf8_lossy(cell).into_owned())
                    .collect(),
            ),
            Err(err) => tracing::warn!(row = index + 1, error = %err, "skipping malformed engagement row"),
        }
    }
    Ok(EngagementTable { headers, rows })
}

pub fn load_classified(path: &Path) -> anyhow::Result<Vec<ClassifiedProduct>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open classification file {}", path.display()))?;
    parse_classified(file)
}

pub fn parse_classified<R: io::Read>(reader: R) -> anyhow::Result<Vec<ClassifiedProduct>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for (index, result) in csv_reader.deserialize::<ClassifiedProduct>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(err) => tracing::warn!(row = index + 1, error = %err, "skipping malformed classification row"),
        }
    }
    Ok(rows)
}

pub fn write_normalized<W: io::Write>(writer: W, ads: &[NormalizedAd]) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for ad in ads {
        csv_writer.serialize(ad)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ad_archive_page() {
        let json = r#"{
            "data": [
                {
                    "id": "101",
                    "page_id": "55",
                    "page_name": "Home Comfort",
                    "ad_delivery_start_time": "2026-01-05T10:00:00+0000",
                    "ad_creative_bodies": ["Corner sofa", null, 7],
                    "impressions": {"lower_bound": "1000", "upper_bound": "1999"},
                    "ad_creation_time": "2026-01-04T09:00:00+0000",
                    "publisher_platforms": ["facebook", "instagram"],
                    "languages": ["ar"],
                    "_keyword": "كنب"
                },
                "not an ad"
            ],
            "paging": {}
        }"#;
        let records = parse_raw_ads(json.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.keyword, "كنب");
        assert_eq!(record.ad_creative_bodies, vec!["Corner sofa".to_string()]);
        assert!(record.ad_creative_link_titles.is_empty());
        assert!(record.ad_delivery_stop_time.is_none());
        assert_eq!(record.impressions.as_ref().and_then(|i| i.midpoint()), Some(1499.5));
    }

    #[test]
    fn parses_bare_array_and_rejects_scalars() {
        let records = parse_raw_ads(r#"[{"id": "1"}, {"id": "2"}]"#.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(parse_raw_ads("42".as_bytes()).is_err());
        assert!(parse_raw_ads(r#"{"paging": {}}"#.as_bytes()).is_err());
    }

    #[test]
    fn parses_long_form_trends() {
        let csv = "date,keyword,trend_score\n2026-01-04,sofa,80\n2026-01-11,sofa,oops\n2026-01-11,bed,12\n";
        let points = parse_trends(csv.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].keyword, "sofa");
        assert_eq!(points[1].trend_score, 12.0);
    }

    #[test]
    fn parses_engagement_with_arbitrary_columns() {
        let csv = "ad_id,Views,likes,country\n1,100,5,JO\n2,200,,JO\n";
        let table = parse_engagement(csv.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["ad_id", "Views", "likes", "country"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][2], "");
    }

    #[test]
    fn engagement_with_undecodable_bytes_still_loads() {
        let mut bytes = b"ad_id,views\xff,likes\n1,100,5\n".to_vec();
        bytes.extend_from_slice(b"2,\xfe200,7\n");
        let table = parse_engagement(bytes.as_slice()).unwrap();
        assert_eq!(table.headers.len(), 3);
        assert!(table.headers[1].starts_with("views"));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], "100");
        // the garbled views column no longer parses, likes still counts
        assert_eq!(crate::aggregate::engagement_velocity(&table), 6.0);
    }

    #[test]
    fn missing_engagement_file_is_empty_table() {
        let table = load_engagement(Some(Path::new("definitely/not/here.csv"))).unwrap();
        assert!(table.is_empty());
        assert!(load_engagement(None).unwrap().is_empty());
    }

    #[test]
    fn parses_classification_rows_with_defaults() {
        let csv = "product,synonyms,angles,objections,purchase_intent_pct\nsofa,couch,comfort,price,40\nbed,,,,\n";
        let rows = parse_classified(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].purchase_intent_pct, 40.0);
        assert_eq!(rows[1].product, "bed");
    }

    #[test]
    fn writes_normalized_table_with_nullable_times() {
        let record = RawAdRecord {
            id: "101".to_string(),
            page_id: "55".to_string(),
            ad_creative_bodies: vec!["Corner sofa".to_string()],
            ..RawAdRecord::default()
        };
        let ads = crate::normalize::normalize_ads(
            &[record],
            chrono::Utc::now(),
            &crate::normalize::NoEngagement,
        );
        let mut buffer = Vec::new();
        write_normalized(&mut buffer, &ads).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("keyword,ad_id,advertiser_id"));
        assert!(lines.next().unwrap().contains(",,,true,0.0,0.0,1.0"));
    }
}
