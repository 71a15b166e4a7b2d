use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use strsim::normalized_levenshtein;

use super::parser::MatrixRow;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// One record from a previously scraped product listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedProduct {
    #[serde(alias = "product_name")]
    pub name: String,
    #[serde(default, alias = "product_url")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    ExactNormalized,
    Fuzzy,
    Partial,
}

impl MatchType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::ExactNormalized => "exact_normalized",
            Self::Fuzzy => "fuzzy",
            Self::Partial => "partial",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A match between a matrix product name and a scraped record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMatch {
    pub matrix_name: String,
    pub scraped_name: String,
    pub scraped_url: Option<String>,
    pub scraped_data: ScrapedProduct,
    /// Similarity score in [0, 1].
    pub confidence: f64,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchReport {
    pub matched: Vec<ProductMatch>,
    pub unmatched: Vec<String>,
    pub match_rate: f64,
}

/// Matches matrix product names against scraped records with a cascade:
/// exact, exact-normalized, fuzzy (edit-distance ratio), partial
/// containment.
///
/// The normalized index is ordered, so fuzzy and partial scans are
/// deterministic: ties at the best score go to the lexicographically
/// smallest normalized name.
pub struct ProductMatcher {
    products: Vec<ScrapedProduct>,
    threshold: f64,
    exact: HashMap<String, usize>,
    normalized: BTreeMap<String, usize>,
}

impl ProductMatcher {
    #[must_use]
    pub fn new(products: Vec<ScrapedProduct>, threshold: f64) -> Self {
        let mut exact = HashMap::new();
        let mut normalized = BTreeMap::new();

        for (idx, product) in products.iter().enumerate() {
            if product.name.is_empty() {
                continue;
            }
            exact.insert(product.name.clone(), idx);
            normalized.insert(normalize(&product.name), idx);
        }

        tracing::info!(products = products.len(), "product matcher initialized");
        Self {
            products,
            threshold,
            exact,
            normalized,
        }
    }

    /// Find the best matching scraped product, first strategy wins.
    #[must_use]
    pub fn match_product(&self, matrix_name: &str) -> Option<ProductMatch> {
        if matrix_name.is_empty() {
            return None;
        }

        // Strategy 1: exact match on the raw name.
        if let Some(&idx) = self.exact.get(matrix_name) {
            return Some(self.build_match(matrix_name, idx, 1.0, MatchType::Exact));
        }

        // Strategy 2: exact match on the normalized name.
        let needle = normalize(matrix_name);
        if let Some(&idx) = self.normalized.get(&needle) {
            return Some(self.build_match(matrix_name, idx, 1.0, MatchType::ExactNormalized));
        }

        // Strategy 3: fuzzy match, strict best score over all candidates.
        let mut best: Option<(usize, f64)> = None;
        for (candidate, &idx) in &self.normalized {
            let score = normalized_levenshtein(&needle, candidate);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }
        if let Some((idx, score)) = best {
            if score >= self.threshold {
                return Some(self.build_match(matrix_name, idx, score, MatchType::Fuzzy));
            }
        }

        // Strategy 4: partial containment with at least 50% length overlap.
        for (candidate, &idx) in &self.normalized {
            if needle.contains(candidate.as_str()) || candidate.contains(needle.as_str()) {
                let longer = needle.len().max(candidate.len());
                if longer == 0 {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let len_ratio = needle.len().min(candidate.len()) as f64 / longer as f64;
                if len_ratio >= 0.5 {
                    return Some(self.build_match(matrix_name, idx, len_ratio, MatchType::Partial));
                }
            }
        }

        None
    }

    /// Match every row's product name and report the partition.
    #[must_use]
    pub fn match_report(&self, rows: &[MatrixRow]) -> MatchReport {
        let mut matched = Vec::new();
        let mut unmatched = Vec::new();

        for row in rows {
            match self.match_product(&row.product_name) {
                Some(m) => matched.push(m),
                None => unmatched.push(row.product_name.clone()),
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let match_rate = if rows.is_empty() {
            0.0
        } else {
            matched.len() as f64 / rows.len() as f64
        };

        tracing::info!(
            matched = matched.len(),
            total = rows.len(),
            match_rate,
            "product matching complete"
        );
        if !unmatched.is_empty() {
            tracing::warn!(count = unmatched.len(), "unmatched products remain");
        }

        MatchReport {
            matched,
            unmatched,
            match_rate,
        }
    }

    /// Look up a scraped product by exact, then normalized, name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ScrapedProduct> {
        self.exact
            .get(name)
            .or_else(|| self.normalized.get(&normalize(name)))
            .map(|&idx| &self.products[idx])
    }

    fn build_match(
        &self,
        matrix_name: &str,
        idx: usize,
        confidence: f64,
        match_type: MatchType,
    ) -> ProductMatch {
        let product = &self.products[idx];
        ProductMatch {
            matrix_name: matrix_name.to_string(),
            scraped_name: product.name.clone(),
            scraped_url: product.url.clone(),
            scraped_data: product.clone(),
            confidence,
            match_type,
        }
    }
}

/// Matching normalization: lowercase, strip non-alphanumeric characters
/// to spaces, collapse whitespace. Distinct from the display
/// normalization in the extractor.
fn normalize(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraped(name: &str) -> ScrapedProduct {
        ScrapedProduct {
            name: name.to_string(),
            url: Some(format!("https://example.com/{}", normalize(name).replace(' ', "-"))),
            extra: Map::new(),
        }
    }

    fn matcher(names: &[&str]) -> ProductMatcher {
        ProductMatcher::new(
            names.iter().map(|n| scraped(n)).collect(),
            DEFAULT_MATCH_THRESHOLD,
        )
    }

    #[test]
    fn test_exact_match() {
        let m = matcher(&["3D-Gloss", "Acid Wash"]);
        let result = m.match_product("3D-Gloss").unwrap();

        assert_eq!(result.match_type, MatchType::Exact);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.scraped_name, "3D-Gloss");
    }

    #[test]
    fn test_exact_normalized_match() {
        let m = matcher(&["3D-Gloss"]);
        let result = m.match_product("3D GLOSS").unwrap();

        assert_eq!(result.match_type, MatchType::ExactNormalized);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let m = matcher(&["3D-Gloss"]);
        // "3d glos" vs "3d gloss": one edit over eight chars.
        let result = m.match_product("3D GLOS").unwrap();

        assert_eq!(result.match_type, MatchType::Fuzzy);
        assert!(result.confidence >= DEFAULT_MATCH_THRESHOLD);
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn test_no_match_below_threshold() {
        let m = matcher(&["3D-Gloss"]);

        assert!(m.match_product("ZINC PHOSPHATE REMOVER").is_none());
    }

    #[test]
    fn test_partial_match_with_length_ratio() {
        let m = matcher(&["Citrus Spotter Plus"]);
        let result = m.match_product("Citrus Spotter").unwrap();

        assert_eq!(result.match_type, MatchType::Partial);
        let expected = 14.0 / 19.0;
        assert!((result.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_partial_rejected_below_half_overlap() {
        let m = matcher(&["Wash"]);

        // "wash" is contained, but 4/21 is far below the 0.5 ratio floor.
        assert!(m.match_product("Heavy Duty Machine Acid Wash!").is_none());
    }

    #[test]
    fn test_fuzzy_tie_breaks_lexicographically() {
        let m = ProductMatcher::new(vec![scraped("abcf"), scraped("abce")], 0.5);
        let result = m.match_product("abcd").unwrap();

        // Both candidates score 0.75; the lexicographically smaller wins.
        assert_eq!(result.match_type, MatchType::Fuzzy);
        assert_eq!(result.scraped_name, "abce");
    }

    #[test]
    fn test_match_report_partitions() {
        let m = matcher(&["3D-Gloss"]);
        let rows = vec![
            MatrixRow::new("3D-GLOSS".into()),
            MatrixRow::new("UNKNOWN PRODUCT".into()),
        ];

        let report = m.match_report(&rows);

        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.unmatched, vec!["UNKNOWN PRODUCT"]);
        assert!((report.match_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_match_report_empty_rows() {
        let m = matcher(&["3D-Gloss"]);
        let report = m.match_report(&[]);

        assert!((report.match_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_find_by_normalized_name() {
        let m = matcher(&["3D-Gloss"]);

        assert!(m.find("3d gloss").is_some());
        assert!(m.find("missing").is_none());
    }

    #[test]
    fn test_scraped_product_field_aliases() {
        let json = r#"{"product_name": "3D-Gloss", "product_url": "https://example.com/p", "category": "sealers"}"#;
        let product: ScrapedProduct = serde_json::from_str(json).unwrap();

        assert_eq!(product.name, "3D-Gloss");
        assert_eq!(product.url.as_deref(), Some("https://example.com/p"));
        assert_eq!(product.extra["category"], "sealers");
    }
}
