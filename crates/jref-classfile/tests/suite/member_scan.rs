use jref_classfile::{scan_member_accesses, ClassFile, CodeReference, FieldOp, InvokeOp};
use jref_test_utils::{ClassFileBuilder, Insn, MethodSpec};

#[test]
fn scans_field_and_method_access_in_order() {
    let bytes = ClassFileBuilder::new("p/User")
        .method(MethodSpec::new(0x0001, "go", "()V").code(vec![
            Insn::get_static("java/lang/System", "out", "Ljava/io/PrintStream;"),
            Insn::invoke_virtual("java/io/PrintStream", "flush", "()V"),
            Insn::New("p/Thing".into()),
            Insn::Pop,
            Insn::invoke_interface("java/lang/Runnable", "run", "()V"),
        ]))
        .build();
    let class = ClassFile::parse(&bytes).unwrap();
    let code = class.methods[0].code.as_ref().unwrap();
    let refs = scan_member_accesses(&code.bytes, &class.constant_pool).unwrap();

    assert_eq!(refs.len(), 4);
    match &refs[0] {
        CodeReference::Field { pc, op, member } => {
            assert_eq!(*pc, 0);
            assert_eq!(*op, FieldOp::GetStatic);
            assert_eq!(member.owner, "java/lang/System");
            assert_eq!(member.name, "out");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        &refs[1],
        CodeReference::Method { pc: 3, op: InvokeOp::Virtual, .. }
    ));
    assert!(matches!(&refs[2], CodeReference::Class { pc: 6, name } if name == "p/Thing"));
    // `pop` at 9, invokeinterface at 10 spans five bytes.
    assert!(matches!(
        &refs[3],
        CodeReference::Method { pc: 10, op: InvokeOp::Interface, member } if member.owner == "java/lang/Runnable"
    ));
}
