use std::path::PathBuf;
use std::sync::Arc;

use jref_test_utils::{write_class_tree, write_jar};
use jref_usages::{
    DirectoryMirror, EventLog, IndexEvent, IndexManager, IndexOptions, RootsEvent,
    TransactionContext, TypesEvent, AUTOMATIC_BUILD_TAG,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::fixture::{class_using, committed_records, strings, users_of, Fixture, FlakyStores};

#[test]
fn listeners_see_one_ordered_batch_per_commit() {
    let fx = Fixture::on_disk();
    let log = Arc::new(EventLog::new());
    let _subscription = fx.manager.subscribe(log.clone());

    let jar = fx.path("lib/a.jar");
    let classes = fx.path("classes");
    write_jar(&jar, &[("a/A.class", class_using("a/A", "x/Base"))]);
    write_class_tree(&classes, &[("c/C.class", class_using("c/C", "x/Base"))]);
    let cancel = CancellationToken::new();

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    for root in [&jar, &classes] {
        let index = fx.manager.create_usages_query(root, false, &mut tx).unwrap();
        let mut analyser = index.binary_analyser(&mut tx).unwrap();
        let changes = analyser.analyse(root, &cancel).unwrap();
        tx.record_changes(root, Some("app"), &changes).unwrap();
    }
    assert!(log.is_empty());
    tx.commit().unwrap();

    let mut roots = vec![jar.clone(), classes.clone()];
    roots.sort();
    let added = |root: &PathBuf, types: &[&str]| {
        IndexEvent::TypesAdded(TypesEvent {
            root: root.clone(),
            module: Some("app".to_string()),
            types: strings(types),
        })
    };
    let mut expected = vec![IndexEvent::RootsAdded(RootsEvent { roots: roots.clone() })];
    for root in &roots {
        if root == &jar {
            expected.push(added(root, &["a.A"]));
        } else {
            expected.push(added(root, &["c.C"]));
        }
    }
    assert_eq!(log.take(), expected);

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    fx.manager.remove_root(&jar, &mut tx).unwrap();
    tx.commit().unwrap();
    assert_eq!(
        log.take(),
        vec![IndexEvent::RootsRemoved(RootsEvent { roots: vec![jar.clone()] })]
    );
    assert_eq!(fx.manager.roots(), vec![classes]);
}

#[test]
fn rolled_back_transactions_publish_nothing() {
    let fx = Fixture::on_disk();
    let log = Arc::new(EventLog::new());
    let _subscription = fx.manager.subscribe(log.clone());
    let root = fx.path("classes");
    write_class_tree(&root, &[("a/A.class", class_using("a/A", "x/Base"))]);

    {
        let mut tx = TransactionContext::begin(&fx.manager).unwrap();
        let index = fx.manager.create_usages_query(&root, false, &mut tx).unwrap();
        let mut analyser = index.binary_analyser(&mut tx).unwrap();
        let changes = analyser.analyse(&root, &CancellationToken::new()).unwrap();
        tx.record_changes(&root, None, &changes).unwrap();
        // Dropped without commit.
    }
    assert!(log.is_empty());
    assert!(users_of(&fx.index(&root), "x.Base").is_empty());
}

#[test]
fn rolled_back_scans_leave_the_change_state_alone() {
    let fx = Fixture::on_disk();
    let root = fx.path("classes");
    write_class_tree(&root, &[("a/A.class", class_using("a/A", "x/Base"))]);
    let cancel = CancellationToken::new();

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let index = fx.manager.create_usages_query(&root, false, &mut tx).unwrap();
    let mut analyser = index.binary_analyser(&mut tx).unwrap();
    let changes = analyser.analyse(&root, &cancel).unwrap();
    assert_eq!(changes.added, strings(&["a.A"]));
    tx.rollback().unwrap();
    assert!(!index.cache_dir().crc_path().exists());
    assert!(!index.cache_dir().timestamps_path().exists());

    let changes = fx.manager.scan_binary_root(&root, &cancel).unwrap();
    assert_eq!(changes.added, strings(&["a.A"]));
    assert_eq!(users_of(&fx.index(&root), "x.Base"), strings(&["a.A"]));
    assert!(index.cache_dir().crc_path().exists());
}

#[test]
fn rolled_back_source_takeover_keeps_the_binary_index() {
    let fx = Fixture::on_disk();
    let root = fx.path("classes");
    write_class_tree(&root, &[("a/A.class", class_using("a/A", "x/Base"))]);
    let cancel = CancellationToken::new();
    fx.manager.scan_binary_root(&root, &cancel).unwrap();

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let source = fx.manager.create_usages_query(&root, true, &mut tx).unwrap();
    assert_eq!(
        source.index_type(),
        jref_usages::IndexType::Empty(jref_usages::ContentType::Source)
    );
    tx.rollback().unwrap();

    let index = fx.index(&root);
    assert_eq!(index.index_type(), jref_usages::IndexType::Binary);
    assert_eq!(users_of(&index, "x.Base"), strings(&["a.A"]));
    assert!(index.cache_dir().crc_path().exists());
    assert!(fx
        .manager
        .scan_binary_root(&root, &cancel)
        .unwrap()
        .is_up_to_date());
}

#[test]
fn failed_commit_marks_the_root_for_reindex() {
    let stores = Arc::new(FlakyStores::default());
    let fx = Fixture::with(IndexOptions::default(), stores.clone());
    let log = Arc::new(EventLog::new());
    let _subscription = fx.manager.subscribe(log.clone());
    let root = fx.path("classes");
    write_class_tree(
        &root,
        &[
            ("a/A.class", class_using("a/A", "x/Base")),
            ("a/B.class", class_using("a/B", "x/Base")),
        ],
    );
    let cancel = CancellationToken::new();

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let index = fx.manager.create_usages_query(&root, false, &mut tx).unwrap();
    let mut analyser = index.binary_analyser(&mut tx).unwrap();
    let changes = analyser.analyse(&root, &cancel).unwrap();
    tx.record_changes(&root, None, &changes).unwrap();
    stores.last().fail_commits(true);
    tx.commit().unwrap();

    assert!(index.is_broken());
    assert!(committed_records(&index).is_empty());
    assert!(!index.cache_dir().crc_path().exists());
    assert!(log
        .take()
        .iter()
        .all(|event| matches!(event, IndexEvent::RootsAdded(_))));
    assert_eq!(fx.manager.take_pending_reindex(), vec![root.clone()]);
    assert!(fx.manager.take_pending_reindex().is_empty());

    stores.last().fail_commits(false);
    let changes = fx.manager.scan_binary_root(&root, &cancel).unwrap();
    assert_eq!(changes.added, strings(&["a.A", "a.B"]));
    assert!(!index.is_broken());
    assert_eq!(users_of(&index, "x.Base"), strings(&["a.A", "a.B"]));
}

#[test]
fn cache_files_are_mirrored_into_tagged_outputs() {
    let cache = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let mirror = Arc::new(DirectoryMirror::new());
    let manager = IndexManager::init_with(
        cache.path().to_path_buf(),
        IndexOptions::default(),
        mirror.clone(),
        Arc::new(FlakyStores::default()),
    );

    let root = work.path().join("src");
    let artifacts = work.path().join("artifacts");
    let output = work.path().join("build/classes");
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join(AUTOMATIC_BUILD_TAG), b"").unwrap();
    let built = write_class_tree(&artifacts, &[("p/A.class", class_using("p/A", "x/Base"))]);
    mirror.register(&root, &artifacts, &output);

    let mut tx = TransactionContext::begin(&manager).unwrap();
    tx.add_cache_files(&root, built.clone()).unwrap();
    tx.commit().unwrap();
    assert!(output.join("p/A.class").is_file());

    let mut tx = TransactionContext::begin(&manager).unwrap();
    tx.remove_cache_files(&root, built).unwrap();
    tx.commit().unwrap();
    assert!(!output.join("p/A.class").exists());
}

#[test]
fn indexes_survive_a_manager_restart() {
    let fx = Fixture::on_disk();
    let root = fx.path("classes");
    write_class_tree(&root, &[("a/A.class", class_using("a/A", "x/Base"))]);
    fx.manager
        .scan_binary_root(&root, &CancellationToken::new())
        .unwrap();
    fx.manager.teardown();

    let restarted = IndexManager::init_with(
        fx.cache.path().to_path_buf(),
        IndexOptions::default(),
        Arc::new(jref_usages::NoMirror),
        Arc::new(jref_usages::DiskStoreFactory),
    );
    let index = restarted.usages_query(&root, true).unwrap().unwrap();
    assert_eq!(index.index_type(), jref_usages::IndexType::Binary);
    assert_eq!(users_of(&index, "x.Base"), strings(&["a.A"]));
    assert!(restarted
        .scan_binary_root(&root, &CancellationToken::new())
        .unwrap()
        .is_up_to_date());
}
