use std::sync::Arc;

use jref_test_utils::{bump_mtime, write_class_tree, write_jar, ClassFileBuilder};
use jref_usages::{
    Changes, IndexOptions, ManualLowMemory, MemoryFileSystem, TransactionContext, UsageType,
};
use jref_config::UsagesLevel;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::fixture::{class_using, committed_records, strings, users_of, FlakyStores, Fixture};

#[test]
fn folder_rescan_is_incremental() {
    let fx = Fixture::on_disk();
    let root = fx.path("classes");
    let files = write_class_tree(
        &root,
        &[
            ("a/A.class", class_using("a/A", "x/Base")),
            ("a/B.class", class_using("a/B", "x/Base")),
            ("a/notes.txt", b"not a class".to_vec()),
        ],
    );
    let cancel = CancellationToken::new();

    let changes = fx.manager.scan_binary_root(&root, &cancel).unwrap();
    assert_eq!(changes.added, strings(&["a.A", "a.B"]));
    let index = fx.index(&root);
    assert_eq!(users_of(&index, "x.Base"), strings(&["a.A", "a.B"]));

    let before = index.store().stats();
    let rescan = fx.manager.scan_binary_root(&root, &cancel).unwrap();
    assert_eq!(rescan, Changes::UP_TO_DATE);
    assert_eq!(index.store().stats().tx_stores, before.tx_stores);
    assert_eq!(index.store().stats().clears, before.clears);

    std::fs::write(&files[0], class_using("a/A", "x/Other")).unwrap();
    bump_mtime(&files[0], 10);
    std::fs::remove_file(&files[1]).unwrap();
    let changes = fx.manager.scan_binary_root(&root, &cancel).unwrap();
    assert!(changes.added.is_empty());
    assert_eq!(changes.removed, strings(&["a.B"]));
    assert_eq!(changes.changed, strings(&["a.A"]));
    assert!(users_of(&index, "x.Base").is_empty());
    assert_eq!(users_of(&index, "x.Other"), strings(&["a.A"]));
}

#[test]
fn archive_roots_track_entry_checksums() {
    let fx = Fixture::on_disk();
    let jar = fx.path("lib/dep.jar");
    write_jar(
        &jar,
        &[
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
            ("p/A.class", class_using("p/A", "java/util/AbstractList")),
            ("p/B.class", class_using("p/B", "java/util/AbstractList")),
        ],
    );
    let cancel = CancellationToken::new();

    let changes = fx.manager.scan_binary_root(&jar, &cancel).unwrap();
    assert_eq!(changes.added, strings(&["p.A", "p.B"]));
    let index = fx.index(&jar);
    assert_eq!(
        users_of(&index, "java.util.AbstractList"),
        strings(&["p.A", "p.B"])
    );
    assert_eq!(
        fx.manager.scan_binary_root(&jar, &cancel).unwrap(),
        Changes::UP_TO_DATE
    );

    write_jar(&jar, &[("p/A.class", class_using("p/A", "java/util/AbstractList"))]);
    bump_mtime(&jar, 10);
    let changes = fx.manager.scan_binary_root(&jar, &cancel).unwrap();
    assert_eq!(changes.removed, strings(&["p.B"]));
    assert!(changes.changed.is_empty());
    assert_eq!(users_of(&index, "java.util.AbstractList"), strings(&["p.A"]));
}

#[test]
fn broken_archive_indexes_as_empty() {
    let fx = Fixture::on_disk();
    let jar = fx.path("broken.jar");
    std::fs::write(&jar, b"definitely not a zip").unwrap();

    let changes = fx
        .manager
        .scan_binary_root(&jar, &CancellationToken::new())
        .unwrap();
    assert!(changes.done);
    assert!(changes.added.is_empty());
    assert!(committed_records(&fx.index(&jar)).is_empty());
}

#[test]
fn deleted_root_removes_everything() {
    let fx = Fixture::on_disk();
    let root = fx.path("out");
    write_class_tree(&root, &[("q/Q.class", class_using("q/Q", "x/Base"))]);
    let cancel = CancellationToken::new();
    fx.manager.scan_binary_root(&root, &cancel).unwrap();

    std::fs::remove_dir_all(&root).unwrap();
    let changes = fx.manager.scan_binary_root(&root, &cancel).unwrap();
    assert_eq!(changes.removed, strings(&["q.Q"]));
    assert!(committed_records(&fx.index(&root)).is_empty());
}

#[test]
fn cancelled_scan_writes_nothing() {
    let fx = Fixture::on_disk();
    let root = fx.path("classes");
    write_class_tree(&root, &[("a/A.class", class_using("a/A", "x/Base"))]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let changes = fx.manager.scan_binary_root(&root, &cancel).unwrap();
    assert_eq!(changes, Changes::FAILURE);
    assert!(committed_records(&fx.index(&root)).is_empty());

    let changes = fx
        .manager
        .scan_binary_root(&root, &CancellationToken::new())
        .unwrap();
    assert_eq!(changes.added, strings(&["a.A"]));
}

#[test]
fn low_memory_flushes_do_not_change_the_result() {
    let build = |low_memory: Option<Arc<ManualLowMemory>>| {
        let mut options = IndexOptions::default().with_usages(UsagesLevel::All);
        if let Some(low_memory) = low_memory {
            options = options.with_low_memory(low_memory);
        }
        let fx = Fixture::with(options, Arc::new(FlakyStores::default()));
        let root = fx.path("classes");
        let files: Vec<(String, Vec<u8>)> = (0..12)
            .map(|i| {
                (
                    format!("p/C{i}.class"),
                    class_using(&format!("p/C{i}"), &format!("p/C{}", (i + 1) % 12)),
                )
            })
            .collect();
        let borrowed: Vec<(&str, Vec<u8>)> =
            files.iter().map(|(name, bytes)| (name.as_str(), bytes.clone())).collect();
        write_class_tree(&root, &borrowed);
        fx.manager
            .scan_binary_root(&root, &CancellationToken::new())
            .unwrap();
        committed_records(&fx.index(&root))
    };

    let pressure = Arc::new(ManualLowMemory::new());
    pressure.fire_every(1);
    let flushed = build(Some(Arc::clone(&pressure)));
    assert!(pressure.polls() >= 12);
    let buffered = build(None);
    assert_eq!(flushed.len(), 12);
    assert_eq!(flushed, buffered);
}

#[test]
fn virtual_roots_are_rescanned_when_modified() {
    let fx = Fixture::on_disk();
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("v/A.class", class_using("v/A", "x/Base"));
    fs.insert("v/readme.txt", b"ignored".to_vec());

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let root = fx.path("virtual");
    let index = fx.manager.create_usages_query(&root, false, &mut tx).unwrap();
    let mut analyser = index.binary_analyser(&mut tx).unwrap();
    let changes = analyser
        .analyse_virtual(fs.clone(), &CancellationToken::new())
        .unwrap();
    assert_eq!(changes.added, strings(&["v.A"]));
    let unchanged = analyser
        .analyse_virtual(fs.clone(), &CancellationToken::new())
        .unwrap();
    assert!(unchanged.is_up_to_date());

    fs.insert("v/B.class", class_using("v/B", "x/Base"));
    let changes = analyser
        .analyse_virtual(fs, &CancellationToken::new())
        .unwrap();
    assert_eq!(changes.added, strings(&["v.B"]));
    // Entries of virtual roots carry no checksum, so survivors count as changed.
    assert_eq!(changes.changed, strings(&["v.A"]));
    tx.commit().unwrap();
    assert_eq!(users_of(&index, "x.Base"), strings(&["v.A", "v.B"]));
}

#[test]
fn enumerated_files_drop_the_ones_not_listed() {
    let fx = Fixture::on_disk();
    let root = fx.path("classes");
    let files = write_class_tree(
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
    let changes = analyser.analyse_files(&root, files.clone(), &cancel).unwrap();
    assert_eq!(changes.added, strings(&["a.A", "a.B"]));
    let changes = analyser
        .analyse_files(&root, vec![files[0].clone()], &cancel)
        .unwrap();
    assert_eq!(changes.removed, strings(&["a.B"]));
    tx.commit().unwrap();
    assert_eq!(users_of(&index, "x.Base"), strings(&["a.A"]));
}

#[test]
fn class_filter_skips_rejected_classes() {
    let fx = Fixture::on_disk();
    let root = fx.path("classes");
    write_class_tree(
        &root,
        &[
            ("a/Keep.class", class_using("a/Keep", "x/Base")),
            ("a/Skip.class", class_using("a/Skip", "x/Base")),
        ],
    );

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let index = fx.manager.create_usages_query(&root, false, &mut tx).unwrap();
    let mut analyser = index
        .binary_analyser(&mut tx)
        .unwrap()
        .with_filter(|class| !class.this_class.ends_with("Skip"));
    analyser.analyse(&root, &CancellationToken::new()).unwrap();
    tx.commit().unwrap();
    assert_eq!(users_of(&index, "x.Base"), strings(&["a.Keep"]));
}

#[test]
fn generic_signatures_contribute_type_references() {
    let fx = Fixture::with(
        IndexOptions::default().with_usages(UsagesLevel::All),
        Arc::new(FlakyStores::default()),
    );
    let root = fx.path("classes");
    let bytes = ClassFileBuilder::new("g/Holder")
        .field(
            jref_test_utils::FieldSpec::new(0x0001, "items", "Ljava/util/List;")
                .signature("Ljava/util/List<Ljava/lang/String;>;"),
        )
        .build();
    write_class_tree(&root, &[("g/Holder.class", bytes)]);
    fx.manager
        .scan_binary_root(&root, &CancellationToken::new())
        .unwrap();

    let index = fx.index(&root);
    assert_eq!(users_of(&index, "java.lang.String"), strings(&["g.Holder"]));
    let records = committed_records(&index);
    assert_eq!(
        records[0].data.usage("java.util.List").map(|kinds| kinds.contains(UsageType::TypeReference)),
        Some(true)
    );
}
