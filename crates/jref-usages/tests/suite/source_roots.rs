use std::collections::BTreeSet;
use std::sync::Arc;

use jref_config::{IdentLevel, UsagesLevel};
use jref_test_utils::ClassFileBuilder;
use jref_usages::binary::analyse_class_bytes;
use jref_usages::source::tree::{ClassDecl, CompilationUnit, Expr, Member, Symbol, TypeRef};
use jref_usages::source::visit;
use jref_usages::{
    codec, ContentType, ElementKind, EventLog, IndexEvent, IndexType, NameKind, PackageFilter,
    TransactionContext, TypesEvent, UsageType,
};
use pretty_assertions::assert_eq;

use super::fixture::{strings, users_of, Fixture};

fn names(data: &jref_usages::UsagesData, kind: UsageType) -> BTreeSet<String> {
    data.names_with(kind).into_iter().map(str::to_string).collect()
}

fn service_unit() -> CompilationUnit {
    let call = Member::Method {
        name: "handle".to_string(),
        is_private: false,
        annotations: Vec::new(),
        return_type: Some(TypeRef::named("java.lang.String")),
        params: Vec::new(),
        throws: Vec::new(),
        body: vec![Expr::MethodCall {
            target: None,
            owner: Symbol::resolved("app.Repository"),
            name: "load".to_string(),
            args: Vec::new(),
        }],
    };
    CompilationUnit {
        file_name: "app/Service.java".to_string(),
        package: "app".to_string(),
        types: vec![
            ClassDecl::new("app.Service", ElementKind::Class)
                .extending(TypeRef::named("app.Base"))
                .implementing(TypeRef::named("java.lang.Runnable"))
                .with_member(call),
            ClassDecl::new("app.Helper", ElementKind::Class),
        ],
        ..CompilationUnit::default()
    }
}

#[test]
fn source_and_binary_agree_on_supertypes() {
    let bytes = ClassFileBuilder::new("app/Service")
        .super_class(Some("app/Base"))
        .interface("java/lang/Runnable")
        .build();
    let binary = analyse_class_bytes(&bytes, UsagesLevel::Basic, IdentLevel::Visible)
        .unwrap()
        .record;

    let source = visit(&service_unit(), UsagesLevel::Basic, IdentLevel::Visible);
    let source = source
        .records
        .iter()
        .find(|record| record.name.class_name() == "app.Service")
        .unwrap();

    for kind in [UsageType::SuperClass, UsageType::SuperInterface] {
        assert_eq!(names(&binary.data, kind), names(&source.data, kind), "{kind:?}");
    }
    assert_eq!(binary.name, source.name);
}

#[test]
fn source_roots_are_indexed_by_file() {
    let fx = Fixture::on_disk();
    let root = fx.path("src/main/java");

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let index = fx.manager.create_usages_query(&root, true, &mut tx).unwrap();
    assert_eq!(index.index_type(), IndexType::Empty(ContentType::Source));
    let mut analyser = index.source_analyser(&mut tx).unwrap();
    let aux = analyser.analyse(&service_unit());
    assert_eq!(aux.len(), 1);
    assert_eq!(aux[0].0.class_name(), "app.Helper");
    let changes = analyser.store().unwrap();
    assert_eq!(changes.added, strings(&["app.Helper", "app.Service"]));
    assert!(changes.changed.is_empty());
    tx.record_changes(&root, None, &changes).unwrap();
    tx.commit().unwrap();

    assert_eq!(index.index_type(), IndexType::Source);
    assert_eq!(users_of(&index, "app.Repository"), strings(&["app.Service"]));
    assert_eq!(
        index.get_source_name("app.Helper").unwrap().as_deref(),
        Some("app/Service.java")
    );
    let declared = index
        .get_declared_types("Serv", NameKind::Prefix, None, |doc| {
            codec::binary_name(doc).map(|n| n.class_name().to_string())
        })
        .unwrap();
    assert_eq!(declared, strings(&["app.Service"]));

    let scope = PackageFilter::for_scope(["other"]);
    let scoped = index
        .search(
            "app.Repository",
            jref_usages::UsageSet::empty(),
            jref_usages::Operator::Or,
            scope.as_ref(),
            codec::decode,
        )
        .unwrap();
    assert!(scoped.is_empty());

    // Re-analysing the file without its auxiliary type removes that type.
    let mut edited = service_unit();
    edited.types.truncate(1);
    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let mut analyser = index.source_analyser(&mut tx).unwrap();
    analyser.analyse(&edited);
    let changes = analyser.store().unwrap();
    assert!(changes.added.is_empty());
    assert_eq!(changes.removed, strings(&["app.Helper"]));
    assert_eq!(changes.changed, strings(&["app.Service"]));
    tx.commit().unwrap();
    assert_eq!(index.get_source_name("app.Helper").unwrap(), None);

    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let mut analyser = index.source_analyser(&mut tx).unwrap();
    analyser.delete("app/Service.java");
    let changes = analyser.store().unwrap();
    assert_eq!(changes.removed, strings(&["app.Service"]));
    tx.commit().unwrap();
    assert!(users_of(&index, "app.Repository").is_empty());
    assert_eq!(index.get_source_name("app.Helper").unwrap(), None);
}

#[test]
fn deleted_source_files_publish_their_types_as_removed() {
    let fx = Fixture::on_disk();
    let root = fx.path("src");
    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let index = fx.manager.create_usages_query(&root, true, &mut tx).unwrap();
    let mut analyser = index.source_analyser(&mut tx).unwrap();
    analyser.analyse(&service_unit());
    analyser.store().unwrap();
    tx.commit().unwrap();

    let log = Arc::new(EventLog::new());
    let _subscription = fx.manager.subscribe(log.clone());
    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let mut analyser = index.source_analyser(&mut tx).unwrap();
    analyser.delete("app/Service.java");
    let changes = analyser.store().unwrap();
    tx.record_changes(&root, None, &changes).unwrap();
    tx.commit().unwrap();

    assert_eq!(
        log.take(),
        vec![IndexEvent::TypesRemoved(TypesEvent {
            root: root.clone(),
            module: None,
            types: strings(&["app.Helper", "app.Service"]),
        })]
    );
}

#[test]
fn dirty_overlay_shadows_the_edited_file() {
    let fx = Fixture::on_disk();
    let root = fx.path("src");
    let mut tx = TransactionContext::begin(&fx.manager).unwrap();
    let index = fx.manager.create_usages_query(&root, true, &mut tx).unwrap();
    let mut analyser = index.source_analyser(&mut tx).unwrap();
    analyser.analyse(&service_unit());
    analyser.store().unwrap();
    tx.commit().unwrap();

    let mut edited = service_unit();
    edited.types.truncate(1);
    edited.types[0].extends = vec![TypeRef::named("app.NewBase")];
    let records = analyser.dirty_records(&edited);
    index.set_dirty("app/Service.java", records).unwrap();

    assert!(users_of(&index, "app.Base").is_empty());
    assert_eq!(users_of(&index, "app.NewBase"), strings(&["app.Service"]));
    let packages: Vec<_> = index.get_package_names("", false).unwrap().into_iter().collect();
    assert_eq!(packages, strings(&["app"]));

    index.clear_dirty();
    assert_eq!(users_of(&index, "app.Base"), strings(&["app.Service"]));
}

#[test]
fn compilation_units_deserialize_from_json() {
    let json = r#"{
        "file_name": "p/A.java",
        "package": "p",
        "imports": [{ "symbol": { "resolved": "java.util.Map" } }],
        "types": [{
            "name": { "resolved": "p.A" },
            "simple_name": "A",
            "kind": "class",
            "members": [{
                "member": "field",
                "name": "cache",
                "ty": { "symbol": { "error": "Missing" } }
            }]
        }]
    }"#;
    let unit: CompilationUnit = serde_json::from_str(json).unwrap();
    assert_eq!(unit.primary_type_name(), "A");

    let usages = visit(&unit, UsagesLevel::All, IdentLevel::Visible);
    assert_eq!(usages.records.len(), 1);
    let data = &usages.records[0].data;
    assert!(data.has_usage("java.util.Map"));
    assert!(!data.has_usage("Missing"));
    assert_eq!(data.feature_idents().collect::<Vec<_>>(), vec!["cache"]);
}
