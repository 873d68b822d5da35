use jref_classfile::{parse_method_signature, ClassFile, Error, ACC_INTERFACE};
use jref_test_utils::{ClassFileBuilder, FieldSpec, MethodSpec};
use pretty_assertions::assert_eq;

#[test]
fn parses_supertypes_members_and_attributes() {
    let bytes = ClassFileBuilder::new("com/example/Foo")
        .super_class(Some("com/example/Base"))
        .interface("java/lang/Runnable")
        .signature("Lcom/example/Base;Ljava/lang/Runnable;")
        .annotation("Lcom/example/Marker;")
        .field(FieldSpec::new(0x0002, "names", "Ljava/util/List;").signature(
            "Ljava/util/List<Ljava/lang/String;>;",
        ))
        .method(
            MethodSpec::new(0x0001, "run", "()V")
                .throws("java/io/IOException")
                .local("this", "Lcom/example/Foo;"),
        )
        .build();

    let class = ClassFile::parse(&bytes).unwrap();
    assert_eq!(class.this_class, "com/example/Foo");
    assert_eq!(class.super_class.as_deref(), Some("com/example/Base"));
    assert_eq!(class.interfaces, vec!["java/lang/Runnable".to_string()]);
    assert_eq!(
        class.signature.as_deref(),
        Some("Lcom/example/Base;Ljava/lang/Runnable;")
    );
    assert_eq!(
        class
            .annotations()
            .filter_map(|a| a.type_internal_name.clone())
            .collect::<Vec<_>>(),
        vec!["com/example/Marker".to_string()]
    );

    let field = &class.fields[0];
    assert!(field.is_private());
    assert_eq!(
        field.signature.as_deref(),
        Some("Ljava/util/List<Ljava/lang/String;>;")
    );

    let run = &class.methods[0];
    assert_eq!(run.exceptions, vec!["java/io/IOException".to_string()]);
    let code = run.code.as_ref().expect("code attribute");
    assert_eq!(code.local_variables[0].descriptor, "Lcom/example/Foo;");
    assert!(class.enclosing_method.is_none());
}

#[test]
fn interface_flags_and_enclosing_method() {
    let bytes = ClassFileBuilder::new("p/Outer$1Local")
        .access(0x0600 | ACC_INTERFACE)
        .enclosing_method("p/Outer", Some(("m", "()V")))
        .inner_class("p/Outer$1Local", None, Some("Local"), 0)
        .build();
    let class = ClassFile::parse(&bytes).unwrap();
    assert!(class.is_interface());
    let enclosing = class.enclosing_method.unwrap();
    assert_eq!(enclosing.class, "p/Outer");
    assert_eq!(enclosing.method, Some(("m".to_string(), "()V".to_string())));
    assert_eq!(class.inner_classes[0].inner_name.as_deref(), Some("Local"));
}

#[test]
fn module_info_attribute() {
    let bytes =
        ClassFileBuilder::module_info("com.example.app", &["com.example.api"], &["java/sql/Driver"])
            .build();
    let class = ClassFile::parse(&bytes).unwrap();
    assert!(class.is_module());
    let module = class.module.unwrap();
    assert_eq!(module.name, "com.example.app");
    assert_eq!(module.requires, vec!["java.base".to_string()]);
    assert_eq!(module.exports, vec!["com.example.api".to_string()]);
    assert_eq!(module.uses, vec!["java.sql.Driver".to_string()]);
}

#[test]
fn bad_magic_and_truncation() {
    assert!(matches!(
        ClassFile::parse(&[0, 0, 0, 0]),
        Err(Error::InvalidMagic(0))
    ));
    let bytes = ClassFileBuilder::new("p/A").build();
    assert!(ClassFile::parse(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn generic_method_signature_references() {
    let sig = parse_method_signature(
        "<T:Ljava/lang/Object;>(Ljava/util/List<Ljava/lang/String;>;)Ljava/lang/Integer;",
    )
    .unwrap();
    let mut names = sig.class_names();
    names.sort();
    assert_eq!(
        names,
        vec![
            "java/lang/Integer",
            "java/lang/Object",
            "java/lang/String",
            "java/util/List"
        ]
    );
}
