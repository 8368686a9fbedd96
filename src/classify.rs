use crate::models::{ClassifiedProduct, NormalizedAd};

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Maps one ad's text to a product label plus the qualitative fields that
/// travel with it into the aggregated table.
pub trait ProductClassifier {
    fn classify(&self, ad_text: &str) -> Option<ClassifiedProduct>;
}

/// Stand-in classifier: the first two words of the case-folded ad text become
/// the product label. No synonyms, angles, objections, or intent estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl ProductClassifier for HeuristicClassifier {
    fn classify(&self, ad_text: &str) -> Option<ClassifiedProduct> {
        let text = ad_text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        let product = text.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
        Some(ClassifiedProduct {
            product,
            synonyms: String::new(),
            angles: String::new(),
            objections: String::new(),
            purchase_intent_pct: 0.0,
        })
    }
}

pub fn classify_ads(
    ads: &[NormalizedAd],
    classifier: &dyn ProductClassifier,
    batch_size: usize,
) -> Vec<ClassifiedProduct> {
    let mut rows = Vec::new();

    for (index, batch) in ads.chunks(batch_size.max(1)).enumerate() {
        let before = rows.len();
        for ad in batch {
            if let Some(row) = classifier.classify(&ad.unified_text) {
                rows.push(row);
            }
        }
        tracing::debug!(
            batch = index,
            ads = batch.len(),
            classified = rows.len() - before,
            "classified ad batch"
        );
    }

    rows
}
