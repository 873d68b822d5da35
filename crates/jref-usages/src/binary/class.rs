//! Usage extraction from one class file.

use jref_classfile::{
    parse_class_signature, parse_field_descriptor, parse_field_signature,
    parse_method_descriptor, parse_method_signature, Annotation, ClassFile, ClassMember, CpInfo,
};
use jref_config::{IdentLevel, UsagesLevel};

use crate::binary_name::{BinaryName, ElementKind};
use crate::usage::{UsageRecord, UsageType, UsagesData};

pub const MODULE_INFO: &str = "module-info";
pub const MODULE_INFO_CLASS: &str = "module-info.class";

const INIT: &str = "<init>";
const CLINIT: &str = "<clinit>";
const OUTER_THIS_PREFIX: &str = "this$";
const ACCESS_METHOD_PREFIX: &str = "access$";
const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";

/// What one class file contributes to the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassAnalysis {
    /// Dotted class name, or the module name for `module-info`.
    pub class_name: String,
    /// Set for `module-info`, whose documents are addressed by file.
    pub file_name: Option<String>,
    pub record: UsageRecord,
}

pub fn analyse_class_bytes(
    bytes: &[u8],
    level: UsagesLevel,
    idents: IdentLevel,
) -> jref_classfile::Result<ClassAnalysis> {
    let cf = ClassFile::parse(bytes)?;
    Ok(analyse_class(&cf, level, idents))
}

pub fn analyse_class(cf: &ClassFile, level: UsagesLevel, idents: IdentLevel) -> ClassAnalysis {
    let (class_name, file_name) = match &cf.module {
        Some(module) if cf.is_module() => (module.name.clone(), Some(MODULE_INFO_CLASS.to_string())),
        _ => (dotted(&cf.this_class), None),
    };

    let mut processor = ClassProcessor {
        cf,
        level,
        idents,
        class_name: &class_name,
        usages: UsagesData::new(),
    };
    processor.visit_class();

    let name = BinaryName::new(
        &class_name,
        element_kind(cf),
        is_local(cf),
        simple_name_index(cf, &class_name),
    );
    let record = UsageRecord::new(name, file_name.clone(), processor.usages);
    ClassAnalysis {
        class_name,
        file_name,
        record,
    }
}

pub fn element_kind(cf: &ClassFile) -> ElementKind {
    if cf.is_enum() {
        ElementKind::Enum
    } else if cf.is_annotation() {
        ElementKind::Annotation
    } else if cf.is_module() {
        ElementKind::Module
    } else if cf.is_interface() {
        ElementKind::Interface
    } else if cf.is_record {
        ElementKind::Record
    } else {
        ElementKind::Class
    }
}

pub fn is_local(cf: &ClassFile) -> bool {
    cf.enclosing_method.is_some()
}

/// Offset of the simple name within the class name, taken from the
/// `InnerClasses` entry describing this class when there is one.
pub fn simple_name_index(cf: &ClassFile, class_name: &str) -> usize {
    if cf.is_module() {
        return 0;
    }
    let me = cf.this_class.as_str();
    let simple = internal_simple_name(me);
    let mut len = simple.len();

    if let Some(inner) = cf.inner_classes.iter().find(|ic| ic.inner_class == me) {
        let mut found = false;
        match inner.inner_name.as_deref().filter(|name| !name.is_empty()) {
            Some(inner_name) => {
                if simple.ends_with(inner_name) {
                    len = inner_name.len();
                    found = true;
                }
            }
            None => {
                if let Some(enclosing) = &cf.enclosing_method {
                    let enclosing_simple = internal_simple_name(&enclosing.class);
                    if simple.starts_with(enclosing_simple) {
                        len = len
                            .checked_sub(enclosing_simple.len() + 1)
                            .unwrap_or(simple.len());
                        found = true;
                    }
                }
            }
        }
        if !found {
            if let Some(sep) = simple.rfind('$').filter(|&sep| sep > 0) {
                len -= sep + 1;
            }
        }
    }
    class_name.len().saturating_sub(len)
}

fn internal_simple_name(internal: &str) -> &str {
    internal.rfind('/').map_or(internal, |idx| &internal[idx + 1..])
}

fn dotted(internal: &str) -> String {
    internal.replace('/', ".")
}

/// Element type of a `Class` constant, which may name an array type.
fn class_constant_type(internal: &str) -> Option<String> {
    if internal.starts_with('[') {
        parse_field_descriptor(internal)
            .ok()?
            .class_name()
            .map(dotted)
    } else {
        Some(dotted(internal))
    }
}

struct ClassProcessor<'a> {
    cf: &'a ClassFile,
    level: UsagesLevel,
    idents: IdentLevel,
    class_name: &'a str,
    usages: UsagesData,
}

impl ClassProcessor<'_> {
    fn full(&self) -> bool {
        self.level == UsagesLevel::All
    }

    fn visit_class(&mut self) {
        let cf = self.cf;
        if self.full() {
            self.handle_annotations(cf.annotations(), false);
        }
        if self.level >= UsagesLevel::ExecVarRefs {
            self.add_member_ref_owners();
        }

        if let Some(signature) = &cf.signature {
            match parse_class_signature(signature) {
                Ok(parsed) => {
                    for name in parsed.class_names() {
                        self.add_usage_internal(&name, UsageType::TypeReference);
                    }
                }
                Err(err) => tracing::warn!(
                    target: "jref.usages.scan",
                    class = self.class_name,
                    signature = %signature,
                    error = %err,
                    "cannot read class type signature"
                ),
            }
        }
        if let Some(super_class) = &cf.super_class {
            self.add_usage_internal(super_class, UsageType::SuperClass);
        }
        for iface in &cf.interfaces {
            self.add_usage_internal(iface, UsageType::SuperInterface);
        }
        self.handle_annotations(cf.annotations(), true);

        for method in &cf.methods {
            self.visit_method(method);
        }
        for field in &cf.fields {
            self.visit_field(field);
        }

        if self.full() {
            for (_, entry) in cf.constant_pool.iter() {
                let CpInfo::Class { name_index } = entry else {
                    continue;
                };
                let Ok(internal) = cf.constant_pool.get_utf8(*name_index) else {
                    continue;
                };
                if let Some(name) = class_constant_type(internal) {
                    if !self.usages.has_usage(&name) {
                        self.usages.add_usage(name, UsageType::TypeReference);
                    }
                }
            }
        }
    }

    fn add_member_ref_owners(&mut self) {
        let cp = &self.cf.constant_pool;
        for (index, entry) in cp.iter() {
            let kind = match entry {
                CpInfo::Fieldref { .. } => UsageType::FieldReference,
                CpInfo::Methodref { .. } | CpInfo::InterfaceMethodref { .. } => {
                    UsageType::MethodReference
                }
                _ => continue,
            };
            let member = match cp.get_member_ref(index) {
                Ok(member) => member,
                Err(err) => {
                    tracing::debug!(
                        target: "jref.usages.scan",
                        class = self.class_name,
                        index,
                        error = %err,
                        "skipping unresolvable member reference"
                    );
                    continue;
                }
            };
            if let Some(owner) = class_constant_type(&member.owner) {
                self.usages.add_usage(owner, kind);
            }
            if self.full() && member.name != INIT && member.name != CLINIT {
                self.usages.add_ident(member.name);
            }
        }
    }

    fn visit_method(&mut self, method: &ClassMember) {
        if self.full() {
            self.handle_annotations(method.annotations(), false);
            match parse_method_descriptor(&method.descriptor) {
                Ok(desc) => {
                    for name in desc.class_names() {
                        self.add_usage_internal(name, UsageType::TypeReference);
                    }
                }
                Err(err) => self.warn_member("method descriptor", method, &err),
            }
            for thrown in &method.exceptions {
                self.add_usage_internal(thrown, UsageType::TypeReference);
            }
            if let Some(signature) = &method.signature {
                match parse_method_signature(signature) {
                    Ok(parsed) => {
                        for name in parsed.class_names() {
                            self.add_usage_internal(&name, UsageType::TypeReference);
                        }
                    }
                    Err(err) => self.warn_member("method signature", method, &err),
                }
            }
            if let Some(code) = &method.code {
                for var in &code.local_variables {
                    if let Some(name) = parse_field_descriptor(&var.descriptor)
                        .ok()
                        .and_then(|ty| ty.class_name().map(str::to_string))
                    {
                        self.add_usage_internal(&name, UsageType::TypeReference);
                    }
                }
                for var in &code.local_variable_types {
                    match parse_field_signature(&var.descriptor) {
                        Ok(parsed) => {
                            for name in parsed.class_names() {
                                self.add_usage_internal(&name, UsageType::TypeReference);
                            }
                        }
                        Err(err) => self.warn_member("local variable signature", method, &err),
                    }
                }
            }
        }

        let name = method.name.as_str();
        if self.idents.accepts(method.is_private())
            && !method.is_synthetic()
            && name != INIT
            && name != CLINIT
            && !name.starts_with(ACCESS_METHOD_PREFIX)
        {
            self.usages.add_feature_ident(name);
            if self.full() {
                self.usages.add_ident(name);
            }
        }
    }

    fn visit_field(&mut self, field: &ClassMember) {
        if self.full() {
            self.handle_annotations(field.annotations(), false);
            if let Some(name) = parse_field_descriptor(&field.descriptor)
                .ok()
                .and_then(|ty| ty.class_name().map(str::to_string))
            {
                self.add_usage_internal(&name, UsageType::TypeReference);
            }
            if let Some(signature) = &field.signature {
                match parse_field_signature(signature) {
                    Ok(parsed) => {
                        for name in parsed.class_names() {
                            self.add_usage_internal(&name, UsageType::TypeReference);
                        }
                    }
                    Err(err) => self.warn_member("field signature", field, &err),
                }
            }
        }

        let name = field.name.as_str();
        if self.idents.accepts(field.is_private())
            && !field.is_synthetic()
            && !name.starts_with(OUTER_THIS_PREFIX)
            && name != ASSERTIONS_DISABLED
        {
            self.usages.add_feature_ident(name);
            if self.full() {
                self.usages.add_ident(name);
            }
        }
    }

    fn handle_annotations<'b>(
        &mut self,
        annotations: impl Iterator<Item = &'b Annotation>,
        only_top_level: bool,
    ) {
        for annotation in annotations {
            if only_top_level {
                if let Some(name) = &annotation.type_internal_name {
                    self.add_usage_internal(name, UsageType::TypeReference);
                }
            } else {
                for name in annotation.referenced_types() {
                    self.add_usage_internal(&name, UsageType::TypeReference);
                }
            }
        }
    }

    fn add_usage_internal(&mut self, internal: &str, kind: UsageType) {
        self.usages.add_usage(dotted(internal), kind);
    }

    fn warn_member(&self, what: &'static str, member: &ClassMember, err: &jref_classfile::Error) {
        tracing::warn!(
            target: "jref.usages.scan",
            class = self.class_name,
            member = %member.name,
            descriptor = %member.descriptor,
            signature = member.signature.as_deref().unwrap_or(""),
            error = %err,
            "invalid {what}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jref_test_utils::{ClassFileBuilder, FieldSpec, Insn, MethodSpec};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn analyse(bytes: Vec<u8>, level: UsagesLevel) -> ClassAnalysis {
        analyse_class_bytes(&bytes, level, IdentLevel::Visible).unwrap()
    }

    fn names(data: &UsagesData, kind: UsageType) -> BTreeSet<String> {
        data.names_with(kind).into_iter().map(str::to_string).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Vec<u8> {
        ClassFileBuilder::new("com/acme/Service")
            .super_class(Some("com/acme/Base"))
            .interface("java/lang/Runnable")
            .annotation("Lcom/acme/Marker;")
            .field(FieldSpec::new(0x0002, "cache", "Ljava/util/Map;"))
            .field(FieldSpec::new(0x1010, "this$0", "Lcom/acme/Outer;"))
            .method(
                MethodSpec::new(0x0001, "run", "()V").code(vec![
                    Insn::get_static("java/lang/System", "out", "Ljava/io/PrintStream;"),
                    Insn::invoke_virtual("java/io/PrintStream", "flush", "()V"),
                    Insn::Return,
                ]),
            )
            .method(MethodSpec::new(0x0001, "<init>", "()V").code(vec![Insn::Return]))
            .method(MethodSpec::new(0x1008, "access$000", "()V"))
            .method(
                MethodSpec::new(0x0001, "load", "(Ljava/nio/file/Path;)Ljava/util/List;")
                    .throws("java/io/IOException"),
            )
            .class_constant("com/acme/Unused")
            .build()
    }

    #[test]
    fn basic_records_supertypes_and_visible_member_idents() {
        let result = analyse(sample(), UsagesLevel::Basic);
        let data = &result.record.data;

        assert_eq!(result.class_name, "com.acme.Service");
        assert_eq!(result.file_name, None);
        assert_eq!(result.record.name.raw(), "com.acme.ServiceC");
        assert_eq!(names(data, UsageType::SuperClass), set(&["com.acme.Base"]));
        assert_eq!(names(data, UsageType::SuperInterface), set(&["java.lang.Runnable"]));
        assert_eq!(names(data, UsageType::TypeReference), set(&["com.acme.Marker"]));
        assert!(names(data, UsageType::MethodReference).is_empty());
        assert_eq!(
            data.feature_idents().collect::<Vec<_>>(),
            vec!["load", "run"]
        );
        assert_eq!(data.idents().count(), 0);
    }

    #[test]
    fn exec_var_refs_adds_member_ref_owners() {
        let result = analyse(sample(), UsagesLevel::ExecVarRefs);
        let data = &result.record.data;
        assert_eq!(names(data, UsageType::FieldReference), set(&["java.lang.System"]));
        assert_eq!(
            names(data, UsageType::MethodReference),
            set(&["java.io.PrintStream"])
        );
        assert!(!data.has_usage("com.acme.Unused"));
    }

    #[test]
    fn all_adds_member_types_and_remaining_constants() {
        let result = analyse(sample(), UsagesLevel::All);
        let data = &result.record.data;
        let types = names(data, UsageType::TypeReference);
        for expected in [
            "com.acme.Marker",
            "java.util.Map",
            "java.nio.file.Path",
            "java.util.List",
            "java.io.IOException",
            "com.acme.Unused",
        ] {
            assert!(types.contains(expected), "missing {expected} in {types:?}");
        }
        assert!(!data.has_usage("java.lang.Object"));
        // Owners already recorded with another kind are not duplicated as type refs.
        assert!(!types.contains("java.lang.System"));
        assert!(data.idents().any(|ident| ident == "flush"));
    }

    #[test]
    fn generic_method_signature_types_are_extracted() {
        let bytes = ClassFileBuilder::new("a/G")
            .method(
                MethodSpec::new(0x0001, "m", "(Ljava/util/List;)Ljava/lang/Integer;").signature(
                    "<T:Ljava/lang/Object;>(Ljava/util/List<Ljava/lang/String;>;)Ljava/lang/Integer;",
                ),
            )
            .build();
        let data = analyse(bytes, UsagesLevel::All).record.data;
        // The class constant of `a.G` itself is one of the remaining constants.
        assert_eq!(
            names(&data, UsageType::TypeReference),
            set(&["a.G", "java.lang.Integer", "java.lang.String", "java.util.List"])
        );
    }

    #[test]
    fn malformed_signature_only_skips_that_signature() {
        let bytes = ClassFileBuilder::new("a/Broken")
            .interface("java/io/Serializable")
            .field(FieldSpec::new(0x0001, "f", "Ljava/util/Set;").signature("Ljava/util/Set<"))
            .build();
        let data = analyse(bytes, UsagesLevel::All).record.data;
        assert!(data.has_usage("java.util.Set"));
        assert!(data.has_usage("java.io.Serializable"));
    }

    #[test]
    fn kinds_locality_and_simple_names() {
        let inner = ClassFileBuilder::new("a/Outer$Inner")
            .access(0x4031)
            .inner_class("a/Outer$Inner", Some("a/Outer"), Some("Inner"), 0x4019)
            .build();
        let result = analyse(inner, UsagesLevel::Basic);
        assert_eq!(result.record.name.raw(), "a.Outer$InnerE");
        assert_eq!(result.record.name.simple_name(), "Inner");

        let anon = ClassFileBuilder::new("a/Outer$1")
            .inner_class("a/Outer$1", None, None, 0)
            .enclosing_method("a/Outer", Some(("run", "()V")))
            .build();
        let result = analyse(anon, UsagesLevel::Basic);
        assert_eq!(result.record.name.raw(), "a.Outer$1c");
        assert!(result.record.name.is_local());
        assert_eq!(result.record.name.simple_name(), "1");

        let iface = ClassFileBuilder::new("a/Api").access(0x0601).build();
        assert_eq!(analyse(iface, UsagesLevel::Basic).record.name.raw(), "a.ApiI");

        let annotation = ClassFileBuilder::new("a/Tag").access(0x2601).build();
        assert_eq!(analyse(annotation, UsagesLevel::Basic).record.name.raw(), "a.TagA");
    }

    #[test]
    fn module_info_is_named_after_the_module() {
        let bytes = ClassFileBuilder::module_info("com.acme.core", &["com.acme.api"], &[]).build();
        let result = analyse(bytes, UsagesLevel::All);
        assert_eq!(result.class_name, "com.acme.core");
        assert_eq!(result.file_name.as_deref(), Some(MODULE_INFO_CLASS));
        assert_eq!(result.record.name.raw(), "com.acme.coreM");
        assert_eq!(result.record.name.simple_name(), "com.acme.core");
        assert_eq!(result.record.source.as_deref(), Some(MODULE_INFO_CLASS));
    }
}
