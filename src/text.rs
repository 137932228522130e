//! Semantic text of a record: the input to its embedding.
//!
//! Anything that appears here must invalidate the embedding when it changes,
//! which is why media alt text and graph neighbours are included.

use crate::error::GraphResult;
use crate::predicate::{slugs, Predicate};
use crate::record::{non_empty, ChildType, Record};
use crate::storage::GraphStores;

/// Builds the embedding text of `record` from its fields, its media and its
/// neighbours in the graph.
pub fn record_text(stores: &GraphStores, record: &Record) -> GraphResult<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut push = |label: &str, value: &str| {
        if let Some(value) = non_empty(Some(value)) {
            lines.push(format!("{label}: {}", value.trim()));
        }
    };

    push("Type", &record.record_type.to_string());
    for (label, value) in [
        ("Title", &record.title),
        ("Summary", &record.summary),
        ("Content", &record.content),
        ("Notes", &record.notes),
        ("Caption", &record.media_caption),
    ] {
        if let Some(value) = value {
            push(label, value);
        }
    }

    for media in stores.media.for_record(record.id)? {
        if let Some(alt) = media.alt_text.as_deref() {
            push("Media", alt);
        }
    }

    if let (Some(parent), Some(child_type)) = (record.parent_id, record.child_type) {
        if let Some(parent) = stores.records.get(parent)? {
            push(child_label(child_type), &parent.label());
        }
    }

    for relation in stores.links.index_relations(record.id)? {
        if let Some(entry) = stores.index_entries.get(relation.index_entry_id)? {
            push(Predicate::for_role(relation.role).name, &entry.name);
        }
    }

    for link in stores.links.links_from(record.id)? {
        if let (Some(predicate), Some(target)) = (Predicate::by_id(link.predicate_id), stores.records.get(link.target_id)?) {
            push(predicate.name, &target.label());
        }
    }
    for link in stores.links.links_to(record.id)? {
        if let (Some(predicate), Some(source)) = (Predicate::by_id(link.predicate_id), stores.records.get(link.source_id)?) {
            push(predicate.inverse_name, &source.label());
        }
    }

    Ok(lines.join("\n"))
}

fn child_label(child_type: ChildType) -> &'static str {
    match child_type {
        ChildType::PartOf => Predicate::by_slug(slugs::PART_OF).map_or("Part Of", |p| p.name),
        ChildType::ExcerptOf => "Excerpt Of",
        ChildType::ReplyTo => "Reply To",
        ChildType::VersionOf => "Version Of",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_entry::{IndexEntryDraft, IndexMainType};
    use crate::link::{IndexRelation, IndexRole, Link};
    use crate::record::{RecordDraft, RecordType, SourceTag};
    use crate::staging::StagingTable;

    #[test]
    fn text_names_neighbours_with_predicates() {
        let stores = GraphStores::in_memory();
        let essay = stores
            .records
            .upsert_by_natural_key(
                &RecordDraft::new(SourceTag::Readwise, RecordType::Document, StagingTable::ReadwiseDocuments, "d1")
                    .title(Some("The Ones Who Walk Away from Omelas")),
            )
            .unwrap()
            .id;
        let quote = stores
            .records
            .upsert_by_natural_key(
                &RecordDraft::new(SourceTag::Twitter, RecordType::Artifact, StagingTable::TwitterTweets, "t1")
                    .content(Some("they walk ahead into the darkness")),
            )
            .unwrap()
            .id;
        let author = stores
            .index_entries
            .upsert_by_natural_key(&IndexEntryDraft::new(SourceTag::Readwise, IndexMainType::Entity, "Ursula K. Le Guin"))
            .unwrap()
            .id;
        let quotes = Predicate::by_slug(slugs::QUOTES).unwrap();
        stores.links.insert_link(Link::new(quote, essay, quotes)).unwrap();
        stores
            .links
            .insert_index_relation(IndexRelation::new(essay, author, IndexRole::Creator))
            .unwrap();

        let record = stores.records.get(essay).unwrap().unwrap();
        let text = record_text(&stores, &record).unwrap();
        assert!(text.contains("Title: The Ones Who Walk Away from Omelas"));
        assert!(text.contains("Created By: Ursula K. Le Guin"));
        assert!(text.contains("Quoted By: artifact #"));
    }
}
