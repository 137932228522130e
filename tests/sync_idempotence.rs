use std::sync::Arc;

use commonplace::embedding::refresh_stale_embeddings;
use commonplace::mapping::sources::{airtable, browser_history, readwise};
use commonplace::storage::InMemoryStagingStore;
use commonplace::{
    CancellationToken, GraphStores, IndexRole, LexicalEmbedder, SourceTag, StagingPayload, StagingRow, StagingTable,
    SyncConfig, SyncEngine,
};

fn creator(id: &str, name: &str) -> StagingRow {
    StagingRow::new(
        id,
        StagingPayload::AirtableCreators(airtable::Creator {
            name: name.to_string(),
            ..airtable::Creator::default()
        }),
    )
}

fn extract(id: &str, title: &str, creators: &[&str], connections: &[&str]) -> StagingRow {
    StagingRow::new(
        id,
        StagingPayload::AirtableExtracts(airtable::Extract {
            title: Some(title.to_string()),
            michelin_stars: 2,
            creator_ids: creators.iter().map(|s| s.to_string()).collect(),
            connection_ids: connections.iter().map(|s| s.to_string()).collect(),
            ..airtable::Extract::default()
        }),
    )
}

fn airtable_snapshot() -> Vec<StagingRow> {
    vec![
        creator("c1", "Jane Jacobs"),
        creator("c2", "James C. Scott"),
        extract("e1", "The Death and Life of Great American Cities", &["c1"], &["e2"]),
        extract("e2", "Seeing Like a State", &["c2"], &["e1"]),
        extract("e3", "Eyes on the street", &["c1"], &[]).with_parent("e1"),
    ]
}

fn engine(stores: &GraphStores) -> SyncEngine {
    SyncEngine::new(
        stores.clone(),
        SyncConfig {
            batch_size: 2,
            ..SyncConfig::default()
        },
    )
}

#[test]
fn second_run_is_a_no_op() {
    let stores = GraphStores::in_memory();
    for row in airtable_snapshot() {
        stores.staging.upsert_row(row).unwrap();
    }
    let engine = engine(&stores);
    let cancel = CancellationToken::new();

    let first = engine.run_source(SourceTag::Airtable, &cancel).unwrap();
    let totals = first.totals();
    assert_eq!(totals.processed, 5);
    assert_eq!(totals.created, 5);
    assert_eq!(totals.failed, 0);
    assert_eq!(totals.parents_linked, 1);

    let records = stores.records.count().unwrap();
    let entries = stores.index_entries.count().unwrap();
    let links = stores.links.link_count().unwrap();
    let relations = stores.links.index_relation_count().unwrap();
    assert_eq!((records, entries, links, relations), (3, 2, 2, 3));

    let second = engine.run_source(SourceTag::Airtable, &cancel).unwrap();
    assert_eq!(second.totals().processed, 0);
    assert_eq!(stores.records.count().unwrap(), records);
    assert_eq!(stores.index_entries.count().unwrap(), entries);
    assert_eq!(stores.links.link_count().unwrap(), links);
    assert_eq!(stores.links.index_relation_count().unwrap(), relations);
}

#[test]
fn remapping_lost_write_backs_matches_existing_rows() {
    let stores = GraphStores::in_memory();
    for row in airtable_snapshot() {
        stores.staging.upsert_row(row).unwrap();
    }
    let cancel = CancellationToken::new();
    engine(&stores).run_source(SourceTag::Airtable, &cancel).unwrap();
    refresh_stale_embeddings(&stores, &LexicalEmbedder::default(), 100).unwrap();

    let counts = |s: &GraphStores| {
        (
            s.records.count().unwrap(),
            s.index_entries.count().unwrap(),
            s.links.link_count().unwrap(),
            s.links.index_relation_count().unwrap(),
        )
    };
    let before_counts = counts(&stores);
    let sorted = |s: &GraphStores| {
        let mut records = s.records.list().unwrap();
        records.sort_by_key(|r| r.id);
        records
    };
    let before_records = sorted(&stores);

    // Same canonical stores, but every write-back is gone, as after a crash
    // between the upsert and the staging update.
    let replay = GraphStores {
        staging: Arc::new(InMemoryStagingStore::new()),
        ..stores.clone()
    };
    for row in airtable_snapshot() {
        replay.staging.upsert_row(row).unwrap();
    }
    let report = engine(&replay).run_source(SourceTag::Airtable, &cancel).unwrap();
    let totals = report.totals();
    assert_eq!(totals.processed, 5);
    assert_eq!(totals.matched, totals.processed);
    assert_eq!(totals.created, 0);
    assert_eq!(totals.failed, 0);

    assert_eq!(counts(&stores), before_counts);
    // Field values, timestamps and embeddings are untouched.
    assert_eq!(sorted(&stores), before_records);
    assert!(before_records.iter().all(|r| r.text_embedding.is_some()));
}

#[test]
fn resyncing_staging_rows_does_not_unmap_them() {
    let stores = GraphStores::in_memory();
    for row in airtable_snapshot() {
        stores.staging.upsert_row(row).unwrap();
    }
    let engine = engine(&stores);
    let cancel = CancellationToken::new();
    engine.run_source(SourceTag::Airtable, &cancel).unwrap();

    // The upstream job writes the same rows again, without canonical refs.
    for row in airtable_snapshot() {
        stores.staging.upsert_row(row).unwrap();
    }
    assert_eq!(stores.staging.count_unmapped(StagingTable::AirtableExtracts).unwrap(), 0);
    let report = engine.run_source(SourceTag::Airtable, &cancel).unwrap();
    assert_eq!(report.totals().processed, 0);
    assert_eq!(stores.records.count().unwrap(), 3);
}

#[test]
fn shared_url_collapses_records_across_sources() {
    let stores = GraphStores::in_memory();
    let url = "https://example.com/essays/omelas";
    stores
        .staging
        .upsert_row(StagingRow::new(
            "v1",
            StagingPayload::BrowserHistory(browser_history::Visit {
                url: url.to_string(),
                title: Some("Omelas".to_string()),
                ..browser_history::Visit::default()
            }),
        ))
        .unwrap();
    stores
        .staging
        .upsert_row(StagingRow::new(
            "d1",
            StagingPayload::ReadwiseDocuments(readwise::Document {
                category: "article".to_string(),
                title: Some("The Ones Who Walk Away from Omelas".to_string()),
                author: Some("Ursula K. Le Guin".to_string()),
                source_url: Some(url.to_string()),
                ..readwise::Document::default()
            }),
        ))
        .unwrap();

    let engine = engine(&stores);
    let cancel = CancellationToken::new();
    let visits = engine.run_source(SourceTag::BrowserHistory, &cancel).unwrap();
    assert_eq!(visits.totals().created, 1);
    let docs = engine.run_source(SourceTag::Readwise, &cancel).unwrap();
    assert_eq!(docs.totals().created, 0);
    assert_eq!(docs.totals().matched, 1);

    let records = stores.records.list().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.sources.contains(&SourceTag::BrowserHistory));
    assert!(record.sources.contains(&SourceTag::Readwise));

    let relations = stores.links.index_relations(record.id).unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].role, IndexRole::Creator);
}

#[test]
fn invalid_rating_fails_only_its_row() {
    let stores = GraphStores::in_memory();
    let mut bad = extract("e9", "Too many stars", &[], &[]);
    if let StagingPayload::AirtableExtracts(e) = &mut bad.payload {
        e.michelin_stars = 7;
    }
    stores.staging.upsert_row(bad).unwrap();
    stores
        .staging
        .upsert_row(extract("e1", "Fine", &[], &[]))
        .unwrap();

    let report = engine(&stores)
        .run_source(SourceTag::Airtable, &CancellationToken::new())
        .unwrap();
    let extracts = report.tables[&StagingTable::AirtableExtracts];
    assert_eq!(extracts.failed, 1);
    assert_eq!(extracts.created, 1);
    assert_eq!(stores.staging.count_unmapped(StagingTable::AirtableExtracts).unwrap(), 1);
}
