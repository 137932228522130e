//! Duplicate candidate detection.
//!
//! Two signals, either of which flags a pair:
//! - cosine similarity of text embeddings, at or above
//!   [`DuplicateConfig::cosine_threshold`]; skipped when either side has no
//!   embedding,
//! - trigram distance of the records' comparable text, at or below
//!   [`DuplicateConfig::trigram_distance_threshold`].
//!
//! Trigrams follow pg_trgm: text is lower-cased and split into alphanumeric
//! words, each padded with two leading blanks and one trailing blank.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::config::DuplicateConfig;
use crate::error::GraphResult;
use crate::record::{Record, RecordId};
use crate::storage::RecordStore;

/// Tolerance applied to both thresholds.
pub const THRESHOLD_EPSILON: f64 = 1e-6;

/// Cosine similarity, accumulated in f64.
///
/// `None` when the vectors have different lengths or are empty. A zero
/// vector has similarity 0 with everything.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let xf = f64::from(x);
        let yf = f64::from(y);
        dot += xf * yf;
        norm_a += xf * xf;
        norm_b += yf * yf;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return Some(0.0);
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    Some(if sim.is_finite() { sim } else { 0.0 })
}

/// The pg_trgm trigram set of `text`.
#[must_use]
pub fn trigrams(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut out = BTreeSet::new();
    for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let padded: Vec<char> = "  ".chars().chain(word.chars()).chain(" ".chars()).collect();
        for window in padded.windows(3) {
            out.insert(window.iter().collect());
        }
    }
    out
}

/// `|A ∩ B| / |A ∪ B|` over trigram sets; 0 when either side has none.
#[must_use]
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let a = trigrams(a);
    let b = trigrams(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.len() + b.len() - shared;
    #[allow(clippy::cast_precision_loss)]
    let sim = shared as f64 / union as f64;
    sim
}

/// `1 - trigram_similarity`.
#[must_use]
pub fn trigram_distance(a: &str, b: &str) -> f64 {
    1.0 - trigram_similarity(a, b)
}

/// A flagged pair, lower id first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCandidate {
    /// Lower id of the pair.
    pub a: RecordId,
    /// Higher id of the pair.
    pub b: RecordId,
    /// Embedding similarity, when both records are embedded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosine: Option<f64>,
    /// Trigram distance of the comparable text, when both have some.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigram_distance: Option<f64>,
}

impl DuplicateCandidate {
    /// The stronger of the two signals, on a similarity scale.
    #[must_use]
    pub fn strength(&self) -> f64 {
        let cosine = self.cosine.unwrap_or(f64::MIN);
        let trigram = self.trigram_distance.map_or(f64::MIN, |d| 1.0 - d);
        cosine.max(trigram)
    }

    fn rank(&self, other: &Self) -> Ordering {
        other
            .strength()
            .total_cmp(&self.strength())
            .then_with(|| (self.a, self.b).cmp(&(other.a, other.b)))
    }
}

/// Flags likely-duplicate records.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateDetector {
    config: DuplicateConfig,
}

impl DuplicateDetector {
    /// A detector using the given thresholds.
    #[must_use]
    pub const fn new(config: DuplicateConfig) -> Self {
        Self { config }
    }

    /// Compares two records. `None` unless the pair is a candidate.
    ///
    /// A record is never a duplicate of itself. Hierarchy is not consulted:
    /// a child with its parent's text is still flagged.
    #[must_use]
    pub fn compare(&self, x: &Record, y: &Record) -> Option<DuplicateCandidate> {
        if x.id == y.id {
            return None;
        }

        let cosine = match (x.embedding(), y.embedding()) {
            (Some(a), Some(b)) => cosine_similarity(a, b),
            _ => None,
        };
        let distance = match (x.comparable_text(), y.comparable_text()) {
            (Some(a), Some(b)) => Some(trigram_distance(a, b)),
            _ => None,
        };

        let by_cosine = cosine.is_some_and(|c| c >= self.config.cosine_threshold - THRESHOLD_EPSILON);
        let by_trigram =
            distance.is_some_and(|d| d <= self.config.trigram_distance_threshold + THRESHOLD_EPSILON);
        if !(by_cosine || by_trigram) {
            return None;
        }

        let (a, b) = if x.id < y.id { (x.id, y.id) } else { (y.id, x.id) };
        Some(DuplicateCandidate {
            a,
            b,
            cosine,
            trigram_distance: distance,
        })
    }

    /// Every candidate pair in `records`, strongest first, capped at
    /// `max_results`.
    #[must_use]
    pub fn scan(&self, records: &[Record]) -> Vec<DuplicateCandidate> {
        let mut out = Vec::new();
        for (i, x) in records.iter().enumerate() {
            for y in &records[i + 1..] {
                if let Some(candidate) = self.compare(x, y) {
                    out.push(candidate);
                }
            }
        }
        debug!(records = records.len(), candidates = out.len(), "duplicate scan");
        self.finish(out, self.config.max_results)
    }

    /// Candidates pairing `record` with a member of `pool`, strongest first.
    #[must_use]
    pub fn candidates_for(&self, record: &Record, pool: &[Record], limit: usize) -> Vec<DuplicateCandidate> {
        let out = pool.iter().filter_map(|other| self.compare(record, other)).collect();
        self.finish(out, limit.min(self.config.max_results))
    }

    /// Scans every record in a store.
    pub fn scan_store(&self, store: &dyn RecordStore) -> GraphResult<Vec<DuplicateCandidate>> {
        Ok(self.scan(&store.list()?))
    }

    fn finish(&self, mut candidates: Vec<DuplicateCandidate>, limit: usize) -> Vec<DuplicateCandidate> {
        candidates.sort_by(DuplicateCandidate::rank);
        candidates.truncate(limit);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use chrono::Utc;

    fn record(id: u64, title: Option<&str>, embedding: Option<Vec<f32>>) -> Record {
        let mut r = Record::new(RecordId::new(id), RecordType::Document, Utc::now());
        r.title = title.map(str::to_string);
        r.text_embedding = embedding;
        r
    }

    fn unit(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    #[test]
    fn trigrams_match_pg_trgm() {
        let t = trigrams("Cat");
        let expected: BTreeSet<String> = ["  c", " ca", "cat", "at "].iter().map(|s| s.to_string()).collect();
        assert_eq!(t, expected);
        assert!(trigrams("  ,, ").is_empty());
    }

    #[test]
    fn trigram_distance_bounds() {
        assert!(trigram_distance("The Left Hand of Darkness", "the left hand of darkness").abs() < 1e-12);
        assert!((trigram_distance("abc", "xyz") - 1.0).abs() < 1e-12);
        assert!((trigram_distance("", "") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_edge_cases() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
        let same = cosine_similarity(&[0.3, 0.4], &[0.6, 0.8]).unwrap();
        assert!((same - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_threshold_is_inclusive() {
        let detector = DuplicateDetector::default();
        let base = record(1, None, Some(vec![1.0, 0.0]));

        let at_threshold = record(2, None, Some(unit(0.8)));
        assert!(detector.compare(&base, &at_threshold).is_some());

        let below = record(3, None, Some(unit(0.79)));
        assert!(detector.compare(&base, &below).is_none());
    }

    #[test]
    fn missing_embedding_falls_back_to_trigrams() {
        let detector = DuplicateDetector::default();
        let a = record(1, Some("Seeing Like a State"), Some(vec![1.0, 0.0]));
        let b = record(2, Some("Seeing like a state."), None);
        let candidate = detector.compare(&a, &b).unwrap();
        assert!(candidate.cosine.is_none());
        assert!(candidate.trigram_distance.unwrap() < 0.01);

        let c = record(3, Some("Gödel, Escher, Bach"), None);
        assert!(detector.compare(&a, &c).is_none());
    }

    #[test]
    fn parent_and_child_are_compared_like_any_pair() {
        let detector = DuplicateDetector::default();
        let parent = record(1, Some("Same title"), Some(vec![1.0, 0.0]));
        let mut child = record(2, Some("Same title"), Some(vec![1.0, 0.0]));
        child.parent_id = Some(parent.id);

        let candidate = detector.compare(&parent, &child).unwrap();
        assert!((candidate.cosine.unwrap() - 1.0).abs() < 1e-9);
        assert!(candidate.trigram_distance.unwrap().abs() < 1e-12);
        assert!(detector.compare(&parent, &parent).is_none());
    }

    #[test]
    fn scan_orders_by_strength_and_caps() {
        let detector = DuplicateDetector::new(DuplicateConfig {
            max_results: 2,
            ..DuplicateConfig::default()
        });
        let records = vec![
            record(1, None, Some(vec![1.0, 0.0])),
            record(2, None, Some(unit(0.85))),
            record(3, None, Some(unit(0.99))),
            record(4, None, Some(vec![0.0, 1.0])),
        ];
        let found = detector.scan(&records);
        assert_eq!(found.len(), 2);
        assert!(found[0].strength() >= found[1].strength());
        assert_eq!((found[0].a, found[0].b), (RecordId::new(1), RecordId::new(3)));

        let for_one = detector.candidates_for(&records[0], &records, 10);
        assert_eq!(for_one.len(), 2);
        assert_eq!(for_one[0].b, RecordId::new(3));
    }
}
