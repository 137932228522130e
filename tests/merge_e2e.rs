use commonplace::mapping::sources::{airtable, github, lightroom};
use commonplace::predicate::slugs;
use commonplace::{
    apply_merge, CanonicalRef, CancellationToken, GraphError, GraphStores, Link, MergeError, Predicate,
    RecordId, SourceTag, StagingPayload, StagingRow, StagingTable, SyncConfig, SyncEngine,
};

fn record_of(stores: &GraphStores, table: StagingTable, id: &str) -> RecordId {
    stores
        .staging
        .get(table, id)
        .unwrap()
        .and_then(|row| row.canonical)
        .and_then(CanonicalRef::record_id)
        .unwrap()
}

/// A GitHub repository and a Lightroom photo of the same project, plus an
/// unrelated repository that links to both.
fn seeded() -> (GraphStores, RecordId, RecordId, RecordId) {
    let stores = GraphStores::in_memory();
    let repo = |id: &str, name: &str, topics: &[&str]| {
        StagingRow::new(
            id,
            StagingPayload::GithubRepositories(github::Repository {
                name: name.to_string(),
                description: Some(format!("{name} description")),
                topics: topics.iter().map(|s| s.to_string()).collect(),
                ..github::Repository::default()
            }),
        )
    };
    stores.staging.upsert_row(repo("r1", "loom", &["weaving"])).unwrap();
    stores.staging.upsert_row(repo("r2", "shuttle", &[])).unwrap();
    stores
        .staging
        .upsert_row(StagingRow::new(
            "p1",
            StagingPayload::LightroomImages(lightroom::Image {
                url: "https://photos.example.com/loom.jpg".to_string(),
                title: Some("Loom".to_string()),
                caption: Some("The loom on the workbench".to_string()),
                keywords: vec!["weaving".to_string(), "workshop".to_string()],
                ..lightroom::Image::default()
            }),
        ))
        .unwrap();

    let engine = SyncEngine::new(stores.clone(), SyncConfig::default());
    let cancel = CancellationToken::new();
    engine.run_source(SourceTag::Github, &cancel).unwrap();
    engine.run_source(SourceTag::Lightroom, &cancel).unwrap();

    let repo_id = record_of(&stores, StagingTable::GithubRepositories, "r1");
    let photo_id = record_of(&stores, StagingTable::LightroomImages, "p1");
    let other_id = record_of(&stores, StagingTable::GithubRepositories, "r2");

    let related = Predicate::by_slug(slugs::RELATED_TO).unwrap();
    stores.links.insert_link(Link::new(other_id, repo_id, related)).unwrap();
    stores.links.insert_link(Link::new(other_id, photo_id, related)).unwrap();
    stores.records.set_embedding(other_id, vec![1.0, 0.0]).unwrap();

    (stores, photo_id, repo_id, other_id)
}

#[test]
fn merge_repoints_every_reference() {
    let (stores, photo, repo, other) = seeded();

    let report = apply_merge(&stores, photo, repo).unwrap();
    assert_eq!(report.merged.id, repo);
    assert_eq!(report.media_moved, 1);
    assert_eq!(report.staging_repointed, 1);
    // The two links from `other` collapse into one.
    assert_eq!(report.links.moved + report.links.dropped, 1);
    assert_eq!(report.neighbours_invalidated, 1);

    assert!(stores.records.get(photo).unwrap().is_none());
    let merged = stores.records.get(repo).unwrap().unwrap();
    assert!(merged.sources.contains(&SourceTag::Github));
    assert!(merged.sources.contains(&SourceTag::Lightroom));
    assert_eq!(merged.title.as_deref(), Some("loom"));
    assert_eq!(merged.media_caption.as_deref(), Some("The loom on the workbench"));
    assert!(merged.text_embedding.is_none());

    assert_eq!(stores.media.for_record(repo).unwrap().len(), 1);
    assert_eq!(stores.links.links_to(repo).unwrap().len(), 1);
    assert!(stores.links.links_to(photo).unwrap().is_empty());
    // "weaving" was tagged on both; the duplicate relation is dropped.
    assert_eq!(stores.links.index_relations(repo).unwrap().len(), 2);
    assert!(stores.records.get(other).unwrap().unwrap().text_embedding.is_none());

    assert_eq!(record_of(&stores, StagingTable::LightroomImages, "p1"), repo);
}

#[test]
fn resync_after_merge_creates_nothing_new() {
    let (stores, photo, repo, _) = seeded();
    apply_merge(&stores, photo, repo).unwrap();
    let before = stores.records.count().unwrap();

    // The upstream job rewrites the photo row without a canonical ref.
    stores
        .staging
        .upsert_row(StagingRow::new(
            "p1",
            StagingPayload::LightroomImages(lightroom::Image {
                url: "https://photos.example.com/loom.jpg".to_string(),
                title: Some("Loom".to_string()),
                ..lightroom::Image::default()
            }),
        ))
        .unwrap();
    let report = SyncEngine::new(stores.clone(), SyncConfig::default())
        .run_source(SourceTag::Lightroom, &CancellationToken::new())
        .unwrap();
    assert_eq!(report.totals().processed, 0);
    assert_eq!(stores.records.count().unwrap(), before);
}

#[test]
fn merged_natural_key_resolves_to_target() {
    let (stores, photo, repo, _) = seeded();
    apply_merge(&stores, photo, repo).unwrap();

    // A fresh staging table row with the same origin, mapped from scratch,
    // lands on the target rather than resurrecting the source.
    let draft = commonplace::RecordDraft::new(
        SourceTag::Lightroom,
        commonplace::RecordType::Artifact,
        StagingTable::LightroomImages,
        "p1",
    );
    let upserted = stores.records.upsert_by_natural_key(&draft).unwrap();
    assert_eq!(upserted.id, repo);
    assert!(!upserted.created);
}

#[test]
fn merge_preconditions() {
    let (stores, photo, repo, _) = seeded();
    let err = apply_merge(&stores, repo, repo).unwrap_err();
    assert!(matches!(err, GraphError::Merge(MergeError::SelfMerge { .. })));

    let missing = RecordId::new(9_999);
    let err = apply_merge(&stores, missing, repo).unwrap_err();
    assert!(matches!(err, GraphError::Merge(MergeError::RecordNotFound { id }) if id == missing));

    // Nothing changed.
    assert!(stores.records.get(photo).unwrap().is_some());
}

#[test]
fn children_follow_the_merge() {
    let stores = GraphStores::in_memory();
    let extract = |id: &str, title: &str| {
        StagingRow::new(
            id,
            StagingPayload::AirtableExtracts(airtable::Extract {
                title: Some(title.to_string()),
                ..airtable::Extract::default()
            }),
        )
    };
    stores.staging.upsert_row(extract("a", "Book A")).unwrap();
    stores.staging.upsert_row(extract("a1", "Chapter A1").with_parent("a")).unwrap();
    stores.staging.upsert_row(extract("b", "Book B")).unwrap();
    stores.staging.upsert_row(extract("b1", "Chapter B1").with_parent("b")).unwrap();
    SyncEngine::new(stores.clone(), SyncConfig::default())
        .run_source(SourceTag::Airtable, &CancellationToken::new())
        .unwrap();

    let a = record_of(&stores, StagingTable::AirtableExtracts, "a");
    let a1 = record_of(&stores, StagingTable::AirtableExtracts, "a1");
    let b = record_of(&stores, StagingTable::AirtableExtracts, "b");
    let b1 = record_of(&stores, StagingTable::AirtableExtracts, "b1");

    stores.records.set_embedding(a1, vec![1.0, 0.0]).unwrap();
    stores.records.set_embedding(b1, vec![0.0, 1.0]).unwrap();

    let report = apply_merge(&stores, b, a).unwrap();
    assert_eq!(report.children_moved, 1);
    assert_eq!(report.neighbours_invalidated, 2);
    // Both the moved child and the target's own child see a new parent label.
    assert!(stores.records.get(a1).unwrap().unwrap().text_embedding.is_none());
    assert!(stores.records.get(b1).unwrap().unwrap().text_embedding.is_none());
    let children: Vec<RecordId> = stores.records.children(a).unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(children, vec![a1, b1]);
}
