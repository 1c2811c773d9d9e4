use chrono::{DateTime, TimeZone, Utc};

use curation_core::merge::{
    merge, MergeError, MergeOptions, RankedListDocument, RemovedPolicy,
};
use curation_core::types::{CategorizedRecord, ContentHash, RepoId, RepositoryRecord, ScoredRecord};

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 6, 0, 0).unwrap()
}

fn make_entry(full_name: &str, score: f64, stars: u64, categories: &[&str]) -> CategorizedRecord {
    let mut record = RepositoryRecord::new(RepoId::parse(full_name).unwrap(), at(1));
    record.stars = stars;
    CategorizedRecord {
        scored: ScoredRecord {
            record,
            score,
            weights_version: ContentHash::from_bytes(b"weights"),
        },
        categories: categories.iter().map(|c| c.to_string()).collect(),
    }
}

fn options(day: u32) -> MergeOptions {
    MergeOptions::new(at(day))
        .with_category_order(["Telemedicine", "Health Data"])
        .with_uncategorized("Uncategorized")
}

fn ids(document: &RankedListDocument, category: &str) -> Vec<String> {
    document
        .partition(category)
        .map(|p| p.entries.iter().map(|e| e.id().to_string()).collect())
        .unwrap_or_default()
}

#[test]
fn ties_break_on_stars_then_name() {
    let records = vec![
        make_entry("zeta/tool", 10.0, 5, &["Telemedicine"]),
        make_entry("Alpha/tool", 10.0, 5, &["Telemedicine"]),
        make_entry("beta/tool", 10.0, 9, &["Telemedicine"]),
        make_entry("alpha/Other", 10.0, 5, &["Telemedicine"]),
        make_entry("top/tool", 11.0, 0, &["Telemedicine"]),
    ];

    let outcome = merge(&RankedListDocument::empty(), records.clone(), &options(2)).unwrap();

    assert_eq!(
        ids(&outcome.document, "Telemedicine"),
        vec!["top/tool", "beta/tool", "alpha/Other", "Alpha/tool", "zeta/tool"]
    );

    // 1. Input order never matters
    let mut reversed = records;
    reversed.reverse();
    let again = merge(&RankedListDocument::empty(), reversed, &options(2)).unwrap();
    assert_eq!(again.document, outcome.document);
}

#[test]
fn merging_unchanged_results_is_a_noop() {
    let records = vec![
        make_entry("acme/one", 40.0, 10, &["Telemedicine"]),
        make_entry("acme/two", 30.0, 10, &["Health Data", "Telemedicine"]),
        make_entry("acme/three", 5.0, 1, &[]),
    ];

    let first = merge(&RankedListDocument::empty(), records.clone(), &options(2)).unwrap();
    assert_eq!(first.summary.added.len(), 3);
    assert!(first.summary.previous_hash.is_none());

    let second = merge(&first.document, records, &options(3)).unwrap();

    assert!(second.summary.is_noop());
    assert!(second.summary.added.is_empty());
    assert!(second.summary.removed.is_empty());
    assert!(second.summary.changed.is_empty());
    assert_eq!(second.summary.previous_hash, Some(first.summary.current_hash.clone()));
    assert_eq!(second.summary.current_hash, first.summary.current_hash);
    assert_eq!(second.document.partitions, first.document.partitions);
}

#[test]
fn star_change_that_flips_the_order_is_not_a_noop() {
    let before = vec![
        make_entry("acme/a", 10.0, 5, &["Telemedicine"]),
        make_entry("acme/b", 10.0, 10, &["Telemedicine"]),
    ];
    let first = merge(&RankedListDocument::empty(), before, &options(2)).unwrap();
    assert_eq!(ids(&first.document, "Telemedicine"), vec!["acme/b", "acme/a"]);

    let after = vec![
        make_entry("acme/a", 10.0, 50, &["Telemedicine"]),
        make_entry("acme/b", 10.0, 10, &["Telemedicine"]),
    ];
    let second = merge(&first.document, after, &options(3)).unwrap();

    assert_eq!(ids(&second.document, "Telemedicine"), vec!["acme/a", "acme/b"]);
    assert!(!second.summary.is_noop());
    assert!(second.summary.reordered);
    assert!(second.summary.changed.is_empty(), "score and categories are unchanged");
    assert_eq!(second.summary.refreshed, vec![RepoId::parse("acme/a").unwrap()]);
    assert_ne!(second.summary.current_hash, first.summary.current_hash);
}

#[test]
fn metadata_only_change_is_reported_as_refreshed() {
    let first = merge(
        &RankedListDocument::empty(),
        vec![make_entry("acme/one", 40.0, 10, &["Telemedicine"])],
        &options(2),
    )
    .unwrap();

    let mut edited = make_entry("acme/one", 40.0, 10, &["Telemedicine"]);
    edited.scored.record.description = "Now with a description".to_string();
    let second = merge(&first.document, vec![edited], &options(3)).unwrap();

    assert!(!second.summary.is_noop());
    assert!(!second.summary.reordered);
    assert_eq!(second.summary.refreshed, vec![RepoId::parse("acme/one").unwrap()]);
}

#[test]
fn content_hash_ignores_snapshot_time_and_weights_version() {
    let records = vec![
        make_entry("acme/one", 40.0, 10, &["Telemedicine"]),
        make_entry("acme/two", 30.0, 10, &["Health Data"]),
    ];
    let first = merge(&RankedListDocument::empty(), records.clone(), &options(2)).unwrap();

    let restamped: Vec<CategorizedRecord> = records
        .into_iter()
        .map(|mut entry| {
            entry.scored.record = entry.scored.record.restamped(at(3));
            entry.scored.weights_version = ContentHash::from_bytes(b"other weights");
            entry
        })
        .collect();
    let second = merge(&first.document, restamped, &options(3)).unwrap();

    assert_eq!(second.summary.current_hash, first.summary.current_hash);
    assert!(second.summary.is_noop());
    assert!(second.summary.refreshed.is_empty());
}

#[test]
fn category_move_reports_delta_and_relocates_entry() {
    let previous = merge(
        &RankedListDocument::empty(),
        vec![
            make_entry("acme/a", 70.0, 100, &["Telemedicine"]),
            make_entry("acme/b", 20.0, 3, &["Telemedicine"]),
        ],
        &options(2),
    )
    .unwrap()
    .document;

    let outcome = merge(
        &previous,
        vec![
            make_entry("acme/a", 65.0, 100, &["Health Data"]),
            make_entry("acme/b", 20.0, 3, &["Telemedicine"]),
        ],
        &options(3),
    )
    .unwrap();

    assert_eq!(outcome.summary.changed.len(), 1);
    let change = &outcome.summary.changed[0];
    assert_eq!(change.id.to_string(), "acme/a");
    assert_eq!(change.score_delta, -5.0);
    assert_eq!(change.score_before, 70.0);
    assert_eq!(change.score_after, 65.0);
    assert!(change.category_moved());
    assert_eq!(change.categories_before, vec!["Telemedicine"]);
    assert_eq!(change.categories_after, vec!["Health Data"]);

    assert_eq!(ids(&outcome.document, "Telemedicine"), vec!["acme/b"]);
    assert_eq!(ids(&outcome.document, "Health Data"), vec!["acme/a"]);
    let a = RepoId::parse("acme/a").unwrap();
    assert_eq!(outcome.document.categories_listing(&a), vec!["Health Data"]);
}

#[test]
fn vanished_repositories_are_reported_as_removed() {
    let previous = merge(
        &RankedListDocument::empty(),
        vec![
            make_entry("acme/stays", 10.0, 1, &["Telemedicine"]),
            make_entry("acme/gone", 50.0, 1, &["Health Data"]),
        ],
        &options(2),
    )
    .unwrap()
    .document;

    let outcome = merge(
        &previous,
        vec![make_entry("acme/stays", 10.0, 1, &["Telemedicine"])],
        &options(3),
    )
    .unwrap();

    assert!(!outcome.summary.is_noop());
    assert_eq!(outcome.summary.removed.len(), 1);
    let removed = &outcome.summary.removed[0];
    assert_eq!(removed.id.to_string(), "acme/gone");
    assert_eq!(removed.last_score, 50.0);
    assert_eq!(removed.last_categories, vec!["Health Data"]);
    assert!(!removed.archived);
    assert!(outcome.document.archived.is_empty());
    assert!(outcome.document.partition("Health Data").is_none());

    // 1. Previous document is untouched
    assert_eq!(ids(&previous, "Health Data"), vec!["acme/gone"]);
}

#[test]
fn archive_policy_keeps_removed_entries_until_relisted() {
    let archive = |day| options(day).with_removed(RemovedPolicy::Archive);

    let first = merge(
        &RankedListDocument::empty(),
        vec![
            make_entry("acme/stays", 10.0, 1, &["Telemedicine"]),
            make_entry("acme/gone", 50.0, 1, &["Health Data"]),
        ],
        &archive(2),
    )
    .unwrap();

    // 1. Removal moves the entry to the archive
    let second = merge(
        &first.document,
        vec![make_entry("acme/stays", 10.0, 1, &["Telemedicine"])],
        &archive(3),
    )
    .unwrap();
    assert!(second.summary.removed[0].archived);
    assert_eq!(second.document.archived.len(), 1);
    assert_eq!(second.document.archived[0].entry.id().to_string(), "acme/gone");
    assert_eq!(second.document.archived[0].archived_at, at(3));

    // 2. An unchanged cycle carries the archive forward
    let third = merge(
        &second.document,
        vec![make_entry("acme/stays", 10.0, 1, &["Telemedicine"])],
        &archive(4),
    )
    .unwrap();
    assert!(third.summary.is_noop());
    assert_eq!(third.document.archived, second.document.archived);
    assert_eq!(third.summary.current_hash, second.summary.current_hash);

    // 3. Rediscovery relists and reports it as added
    let fourth = merge(
        &third.document,
        vec![
            make_entry("acme/stays", 10.0, 1, &["Telemedicine"]),
            make_entry("acme/gone", 55.0, 1, &["Health Data"]),
        ],
        &archive(5),
    )
    .unwrap();
    assert!(fourth.document.archived.is_empty());
    assert_eq!(fourth.summary.added.len(), 1);
    assert_eq!(fourth.summary.added[0].id.to_string(), "acme/gone");
}

#[test]
fn partitions_follow_declaration_then_name_then_catch_all() {
    let records = vec![
        make_entry("acme/loose", 99.0, 1, &[]),
        make_entry("acme/zoo", 1.0, 1, &["Zoology"]),
        make_entry("acme/arch", 1.0, 1, &["Archives"]),
        make_entry("acme/data", 1.0, 1, &["Health Data"]),
        make_entry("acme/tele", 1.0, 1, &["Telemedicine"]),
    ];

    let outcome = merge(&RankedListDocument::empty(), records, &options(2)).unwrap();

    let order: Vec<&str> = outcome
        .document
        .partitions
        .iter()
        .map(|p| p.category.as_str())
        .collect();
    assert_eq!(
        order,
        vec!["Telemedicine", "Health Data", "Archives", "Zoology", "Uncategorized"]
    );
}

#[test]
fn without_catch_all_uncategorized_records_are_not_listed() {
    let options = MergeOptions::new(at(2)).with_category_order(["Telemedicine"]);
    let outcome = merge(
        &RankedListDocument::empty(),
        vec![
            make_entry("acme/loose", 99.0, 1, &[]),
            make_entry("acme/tele", 1.0, 1, &["Telemedicine"]),
        ],
        &options,
    )
    .unwrap();

    assert_eq!(outcome.document.len(), 1);
    assert_eq!(outcome.summary.added.len(), 1);
}

#[test]
fn score_floor_excludes_low_scores() {
    let outcome = merge(
        &RankedListDocument::empty(),
        vec![
            make_entry("acme/high", 25.0, 1, &["Telemedicine"]),
            make_entry("acme/edge", 10.0, 1, &["Telemedicine"]),
            make_entry("acme/low", 9.99, 1, &["Telemedicine"]),
        ],
        &options(2).with_min_score(10.0),
    )
    .unwrap();

    assert_eq!(ids(&outcome.document, "Telemedicine"), vec!["acme/high", "acme/edge"]);
}

#[test]
fn multi_category_records_appear_once_per_category_and_once_in_summary() {
    let outcome = merge(
        &RankedListDocument::empty(),
        vec![make_entry("acme/both", 5.0, 1, &["Telemedicine", "Health Data"])],
        &options(2),
    )
    .unwrap();

    assert_eq!(ids(&outcome.document, "Telemedicine"), vec!["acme/both"]);
    assert_eq!(ids(&outcome.document, "Health Data"), vec!["acme/both"]);
    assert_eq!(outcome.document.len(), 1);
    assert_eq!(outcome.summary.added.len(), 1);
}

#[test]
fn duplicate_input_is_rejected() {
    let result = merge(
        &RankedListDocument::empty(),
        vec![
            make_entry("acme/dup", 5.0, 1, &["Telemedicine"]),
            make_entry("ACME/Dup", 6.0, 1, &["Telemedicine"]),
        ],
        &options(2),
    );

    assert!(matches!(result, Err(MergeError::DuplicateRepository(_))));
}

#[test]
fn summary_lists_are_sorted_by_id() {
    let outcome = merge(
        &RankedListDocument::empty(),
        vec![
            make_entry("c/c", 1.0, 1, &["Telemedicine"]),
            make_entry("a/a", 3.0, 1, &["Telemedicine"]),
            make_entry("b/b", 2.0, 1, &["Health Data"]),
        ],
        &options(2),
    )
    .unwrap();

    let added: Vec<String> = outcome.summary.added.iter().map(|a| a.id.to_string()).collect();
    assert_eq!(added, vec!["a/a", "b/b", "c/c"]);
}
