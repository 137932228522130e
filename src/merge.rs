//! Folding a duplicate record into a survivor.
//!
//! [`merge_records`] is the pure field policy. [`apply_merge`] is the store
//! transaction around it: every edge, media row, child and staging
//! write-back that referenced the losing record is moved to the survivor
//! before the loser is deleted.
//!
//! | Field | Rule |
//! |---|---|
//! | `summary`, `content`, `notes` | `target ++ "\n---\n" ++ source` when both are non-empty |
//! | `sources` | union |
//! | `rating` | max |
//! | `is_private`, `is_curated` | OR |
//! | `record_created_at`, `content_created_at` | earliest, non-null wins |
//! | `content_updated_at` | latest |
//! | `record_updated_at` | merge time |
//! | `text_embedding` | cleared |
//! | everything else | target if set, else source |

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{GraphResult, MergeError};
use crate::order_key::generate_order_keys_after;
use crate::record::{non_empty, Record, RecordId};
use crate::staging::CanonicalRef;
use crate::storage::{GraphStores, RepointStats};

/// Separator placed between concatenated text fields.
pub const TEXT_SEPARATOR: &str = "\n---\n";

/// Ancestor walks give up after this many hops.
const MAX_ANCESTOR_HOPS: usize = 128;

/// Computes the fields `target` adopts when `source` is merged into it.
///
/// The roles are not symmetric: for plain scalar fields the target wins.
///
/// # Errors
/// `SelfMerge` if both records have the same id.
pub fn merge_records(source: &Record, target: &Record, now: DateTime<Utc>) -> Result<Record, MergeError> {
    if source.id == target.id {
        return Err(MergeError::SelfMerge { id: source.id });
    }

    let mut merged = target.clone();

    merged.summary = concat(&target.summary, &source.summary);
    merged.content = concat(&target.content, &source.content);
    merged.notes = concat(&target.notes, &source.notes);

    merged.title = prefer(&target.title, &source.title);
    merged.media_caption = prefer(&target.media_caption, &source.media_caption);
    merged.url = prefer(&target.url, &source.url);

    merged.sources.extend(source.sources.iter().copied());
    merged.rating = target.rating.max(source.rating);
    merged.is_private = target.is_private || source.is_private;
    merged.is_curated = target.is_curated || source.is_curated;

    merged.record_created_at = target.record_created_at.min(source.record_created_at);
    merged.content_created_at = earliest(target.content_created_at, source.content_created_at);
    merged.content_updated_at = latest(target.content_updated_at, source.content_updated_at);
    merged.record_updated_at = now;
    merged.text_embedding = None;

    // Parent, child type and order key only make sense together.
    let (parent_id, child_type, order_key) = if target.parent_id.is_some() {
        (target.parent_id, target.child_type, target.order_key.clone())
    } else {
        (source.parent_id, source.child_type, source.order_key.clone())
    };
    if parent_id.is_some_and(|p| p == source.id || p == target.id) {
        merged.parent_id = None;
        merged.child_type = None;
        merged.order_key = None;
    } else {
        merged.parent_id = parent_id;
        merged.child_type = child_type;
        merged.order_key = order_key;
    }

    Ok(merged)
}

fn concat(target: &Option<String>, source: &Option<String>) -> Option<String> {
    match (non_empty(target.as_deref()), non_empty(source.as_deref())) {
        (Some(t), Some(s)) => Some(format!("{t}{TEXT_SEPARATOR}{s}")),
        (Some(t), None) => Some(t.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    }
}

fn prefer(target: &Option<String>, source: &Option<String>) -> Option<String> {
    non_empty(target.as_deref())
        .or_else(|| non_empty(source.as_deref()))
        .map(str::to_string)
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// What a merge transaction moved.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    /// The surviving record as persisted.
    pub merged: Record,
    /// The record that was folded in and deleted.
    pub source_id: RecordId,
    /// Links repointed from the source.
    pub links: RepointStats,
    /// Index relations repointed from the source.
    pub index_relations: RepointStats,
    /// Media rows handed to the survivor.
    pub media_moved: usize,
    /// Children reparented onto the survivor.
    pub children_moved: usize,
    /// Staging rows whose canonical ref now names the survivor.
    pub staging_repointed: usize,
    /// Natural keys redirected from the source to the survivor.
    pub keys_redirected: usize,
    /// Records whose embedding was invalidated, the survivor excluded.
    pub neighbours_invalidated: usize,
}

/// Merges `source_id` into `target_id` and deletes the source.
///
/// # Errors
/// `MergeError` for a self-merge or a missing record, raised before any
/// mutation. Storage errors abort the transaction part-way; every step is an
/// idempotent repoint, so re-running the merge completes it.
pub fn apply_merge(stores: &GraphStores, source_id: RecordId, target_id: RecordId) -> GraphResult<MergeReport> {
    if source_id == target_id {
        return Err(MergeError::SelfMerge { id: source_id }.into());
    }
    let source = stores
        .records
        .get(source_id)?
        .ok_or(MergeError::RecordNotFound { id: source_id })?;
    let target = stores
        .records
        .get(target_id)?
        .ok_or(MergeError::RecordNotFound { id: target_id })?;

    let mut merged = merge_records(&source, &target, Utc::now())?;
    if let Some(parent) = merged.parent_id {
        if descends_from(stores, parent, &[source_id, target_id])? {
            merged.parent_id = None;
            merged.child_type = None;
            merged.order_key = None;
        }
    }

    let mut neighbours = BTreeSet::new();
    for id in [source_id, target_id] {
        for link in stores.links.links_from(id)?.into_iter().chain(stores.links.links_to(id)?) {
            neighbours.insert(link.other_end(id));
        }
    }
    // Children embed their parent's label, which the merge may change.
    for child in stores.records.children(target_id)? {
        neighbours.insert(child.id);
    }

    let links = stores.links.repoint_links(source_id, target_id)?;
    let index_relations = stores.links.repoint_index_relations(source_id, target_id)?;
    let media_moved = stores.media.repoint_owner(source_id, target_id)?;
    let staging_repointed = stores
        .staging
        .repoint_canonical(CanonicalRef::Record(source_id), CanonicalRef::Record(target_id))?;
    let keys_redirected = stores.records.redirect_keys(source_id, target_id)?;

    let orphans: Vec<Record> = stores
        .records
        .children(source_id)?
        .into_iter()
        .filter(|child| child.id != target_id)
        .collect();
    let last_key = stores
        .records
        .children(target_id)?
        .into_iter()
        .filter_map(|r| r.order_key)
        .max();
    let keys = generate_order_keys_after(last_key.as_deref(), orphans.len())?;
    for (child, key) in orphans.iter().zip(keys) {
        stores
            .records
            .set_parent(child.id, Some(target_id), child.child_type, Some(key))?;
        neighbours.insert(child.id);
    }

    stores.records.delete(source_id)?;
    stores.records.update(merged.clone())?;

    neighbours.remove(&source_id);
    neighbours.remove(&target_id);
    let mut neighbours_invalidated = 0;
    for id in &neighbours {
        stores.records.invalidate_embedding(*id)?;
        neighbours_invalidated += 1;
    }

    info!(
        source = %source_id,
        target = %target_id,
        links_moved = links.moved,
        links_dropped = links.dropped,
        media_moved,
        children_moved = orphans.len(),
        "records merged"
    );

    Ok(MergeReport {
        merged,
        source_id,
        links,
        index_relations,
        media_moved,
        children_moved: orphans.len(),
        staging_repointed,
        keys_redirected,
        neighbours_invalidated,
    })
}

/// True if `start` or one of its ancestors is in `ids`.
fn descends_from(stores: &GraphStores, start: RecordId, ids: &[RecordId]) -> GraphResult<bool> {
    let mut current = Some(start);
    for _ in 0..MAX_ANCESTOR_HOPS {
        match current {
            None => return Ok(false),
            Some(id) if ids.contains(&id) => return Ok(true),
            Some(id) => current = stores.records.get(id)?.and_then(|r| r.parent_id),
        }
    }
    Ok(current.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ChildType, RecordType, SourceTag};
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn record(id: u64) -> Record {
        Record::new(RecordId::new(id), RecordType::Document, at(10))
    }

    #[test]
    fn rating_and_flags() {
        let mut a = record(1);
        a.rating = 1;
        let mut b = record(2);
        b.rating = 3;
        b.is_private = true;

        let merged = merge_records(&a, &b, at(20)).unwrap();
        assert_eq!(merged.rating, 3);
        assert!(merged.is_private);
        assert!(!merged.is_curated);
        assert_eq!(merged.id, b.id);
    }

    #[test]
    fn text_fields_concatenate_target_first() {
        let mut source = record(1);
        source.content = Some("from source".to_string());
        source.notes = Some("   ".to_string());
        source.summary = Some("only source".to_string());
        let mut target = record(2);
        target.content = Some("from target".to_string());
        target.notes = Some("target note".to_string());

        let merged = merge_records(&source, &target, at(20)).unwrap();
        assert_eq!(merged.content.as_deref(), Some("from target\n---\nfrom source"));
        assert_eq!(merged.notes.as_deref(), Some("target note"));
        assert_eq!(merged.summary.as_deref(), Some("only source"));
    }

    #[test]
    fn scalars_prefer_target() {
        let mut source = record(1);
        source.title = Some("Source title".to_string());
        source.url = Some("https://example.com/s".to_string());
        let mut target = record(2);
        target.title = Some("Target title".to_string());

        let merged = merge_records(&source, &target, at(20)).unwrap();
        assert_eq!(merged.title.as_deref(), Some("Target title"));
        assert_eq!(merged.url.as_deref(), Some("https://example.com/s"));

        let swapped = merge_records(&target, &source, at(20)).unwrap();
        assert_eq!(swapped.title.as_deref(), Some("Source title"));
    }

    #[test]
    fn dates_and_sources() {
        let mut source = record(1);
        source.record_created_at = at(2);
        source.content_created_at = Some(at(3));
        source.content_updated_at = Some(at(4));
        source.sources.insert(SourceTag::Readwise);
        let mut target = record(2);
        target.content_updated_at = Some(at(9));
        target.sources.insert(SourceTag::BrowserHistory);
        target.sources.insert(SourceTag::Readwise);

        let merged = merge_records(&source, &target, at(20)).unwrap();
        assert_eq!(merged.record_created_at, at(2));
        assert_eq!(merged.content_created_at, Some(at(3)));
        assert_eq!(merged.content_updated_at, Some(at(9)));
        assert_eq!(merged.record_updated_at, at(20));
        assert_eq!(merged.sources.len(), 2);
    }

    #[test]
    fn merge_is_deterministic_and_clears_embedding() {
        let mut source = record(1);
        source.text_embedding = Some(vec![0.1, 0.2]);
        let mut target = record(2);
        target.text_embedding = Some(vec![0.3, 0.4]);

        let first = merge_records(&source, &target, at(20)).unwrap();
        let second = merge_records(&source, &target, at(20)).unwrap();
        assert_eq!(first, second);
        assert!(first.text_embedding.is_none());
    }

    #[test]
    fn parent_pointing_at_either_record_is_dropped() {
        let mut source = record(1);
        let mut target = record(2);
        target.parent_id = Some(source.id);
        target.child_type = Some(ChildType::PartOf);
        target.order_key = Some("a".to_string());
        let merged = merge_records(&source, &target, at(20)).unwrap();
        assert!(merged.parent_id.is_none());
        assert!(merged.order_key.is_none());

        target.parent_id = None;
        source.parent_id = Some(RecordId::new(7));
        source.child_type = Some(ChildType::ExcerptOf);
        source.order_key = Some("b".to_string());
        let merged = merge_records(&source, &target, at(20)).unwrap();
        assert_eq!(merged.parent_id, Some(RecordId::new(7)));
        assert_eq!(merged.child_type, Some(ChildType::ExcerptOf));
        assert_eq!(merged.order_key.as_deref(), Some("b"));
    }

    #[test]
    fn self_merge_is_rejected() {
        let a = record(1);
        assert_eq!(
            merge_records(&a, &a, at(20)).unwrap_err(),
            MergeError::SelfMerge { id: a.id }
        );
    }
}
