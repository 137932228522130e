//! Pass 2: parent resolution.
//!
//! Children are collected from two places: rows mapped in this run that name
//! a parent, and rows mapped in an earlier run whose parent only arrived now
//! (adoption). Children of one parent are keyed together, after the parent's
//! current last child, in source position order.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use super::{PendingRow, SyncEngine, WriteBack};
use crate::error::GraphResult;
use crate::mapping::{MapContext, SourceMapper};
use crate::order_key::generate_order_keys_after;
use crate::record::{ChildType, RecordId};
use crate::staging::{CanonicalRef, StagingRef};
use crate::sync::SyncReport;

/// Longest ancestor chain walked before assuming a cycle.
const MAX_ANCESTOR_HOPS: usize = 128;

#[derive(Debug)]
struct Child {
    staging: StagingRef,
    record: RecordId,
    parent: StagingRef,
    child_type: ChildType,
    position: Option<i64>,
}

pub(super) fn link_parents(
    engine: &SyncEngine,
    mapper: &dyn SourceMapper,
    ctx: &MapContext<'_>,
    written: &WriteBack,
    pending: &[PendingRow],
    report: &mut SyncReport,
) -> GraphResult<()> {
    let children = collect_children(engine, mapper, ctx, pending)?;

    let mut by_parent: BTreeMap<RecordId, Vec<Child>> = BTreeMap::new();
    for child in children {
        let parent = engine
            .resolve(written, &child.parent)?
            .and_then(CanonicalRef::record_id);
        match parent {
            Some(parent) => by_parent.entry(parent).or_default().push(child),
            None => {
                warn!(staging = %child.staging, parent = %child.parent, "parent not mapped; leaving unlinked");
                report.table_mut(child.staging.table).parents_unresolved += 1;
            }
        }
    }

    let records = &engine.stores.records;
    for (parent, mut group) in by_parent {
        group.sort_by(|a, b| {
            a.position
                .unwrap_or(i64::MAX)
                .cmp(&b.position.unwrap_or(i64::MAX))
                .then_with(|| a.staging.external_id.cmp(&b.staging.external_id))
        });

        let last_key = records
            .children(parent)?
            .into_iter()
            .filter_map(|r| r.order_key)
            .max();
        let keys = generate_order_keys_after(last_key.as_deref(), group.len())?;

        for (child, key) in group.into_iter().zip(keys) {
            if would_cycle(engine, child.record, parent)? {
                warn!(staging = %child.staging, record = %child.record, parent = %parent, "refusing parent: would create a cycle");
                report.table_mut(child.staging.table).parents_unresolved += 1;
                continue;
            }
            records.set_parent(child.record, Some(parent), Some(child.child_type), Some(key))?;
            // The parent's label is part of the child's embedded text.
            records.invalidate_embedding(child.record)?;
            debug!(record = %child.record, parent = %parent, "parent linked");
            report.table_mut(child.staging.table).parents_linked += 1;
        }
    }
    Ok(())
}

fn collect_children(
    engine: &SyncEngine,
    mapper: &dyn SourceMapper,
    ctx: &MapContext<'_>,
    pending: &[PendingRow],
) -> GraphResult<Vec<Child>> {
    let records = &engine.stores.records;
    let mut seen = HashSet::new();
    let mut children = Vec::new();

    for row in pending {
        let CanonicalRef::Record(record) = row.canonical else {
            continue;
        };
        let Some(parent_id) = row.parent_external_id.as_deref() else {
            continue;
        };
        // A matched record may already hang somewhere; curation wins.
        if has_parent(engine, record)? || !seen.insert(record) {
            continue;
        }
        children.push(Child {
            staging: row.staging.clone(),
            record,
            parent: StagingRef::new(row.staging.table, parent_id),
            child_type: row.child_type.unwrap_or(ChildType::PartOf),
            position: row.position,
        });
    }

    for row in pending {
        if row.canonical.record_id().is_none() {
            continue;
        }
        for orphan in engine
            .stores
            .staging
            .find_children(row.staging.table, &row.staging.external_id)?
        {
            let Some(record) = orphan.canonical.and_then(CanonicalRef::record_id) else {
                continue;
            };
            if seen.contains(&record) || records.get(record)?.map_or(true, |r| r.parent_id.is_some()) {
                continue;
            }
            // Only hierarchy fields are needed; the insert is not re-applied.
            let (child_type, position) = match mapper.map_row(&orphan, ctx) {
                Ok(mapped) => (mapped.child_type.unwrap_or(ChildType::PartOf), mapped.position),
                Err(_) => (ChildType::PartOf, None),
            };
            seen.insert(record);
            debug!(staging = %row.staging, orphan = %orphan.external_id, "adopting earlier child");
            children.push(Child {
                staging: StagingRef::new(orphan.table(), orphan.external_id.as_str()),
                record,
                parent: row.staging.clone(),
                child_type,
                position,
            });
        }
    }

    Ok(children)
}

fn has_parent(engine: &SyncEngine, record: RecordId) -> GraphResult<bool> {
    Ok(engine
        .stores
        .records
        .get(record)?
        .is_some_and(|r| r.parent_id.is_some()))
}

/// True if `parent` is `child` or descends from it. Chains longer than
/// [`MAX_ANCESTOR_HOPS`] count as cycles.
fn would_cycle(engine: &SyncEngine, child: RecordId, parent: RecordId) -> GraphResult<bool> {
    let mut current = Some(parent);
    for _ in 0..MAX_ANCESTOR_HOPS {
        match current {
            None => return Ok(false),
            Some(id) if id == child => return Ok(true),
            Some(id) => current = engine.stores.records.get(id)?.and_then(|r| r.parent_id),
        }
    }
    Ok(current.is_some())
}
