use std::collections::HashMap;

const MAJOR_JAVA_17: u16 = 61;

#[derive(Clone, PartialEq, Eq, Hash)]
enum Const {
    Utf8(String),
    Class(u16),
    NameAndType(u16, u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    Module(u16),
    Package(u16),
}

#[derive(Default)]
struct PoolBuilder {
    entries: Vec<Const>,
    index: HashMap<Const, u16>,
}

impl PoolBuilder {
    fn intern(&mut self, entry: Const) -> u16 {
        if let Some(idx) = self.index.get(&entry) {
            return *idx;
        }
        self.entries.push(entry.clone());
        let idx = self.entries.len() as u16;
        self.index.insert(entry, idx);
        idx
    }

    fn utf8(&mut self, value: &str) -> u16 {
        self.intern(Const::Utf8(value.to_string()))
    }

    fn class(&mut self, internal: &str) -> u16 {
        let name = self.utf8(internal);
        self.intern(Const::Class(name))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.intern(Const::NameAndType(name, descriptor))
    }

    fn member(&mut self, kind: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        self.intern(match kind {
            9 => Const::Fieldref(class, nat),
            10 => Const::Methodref(class, nat),
            _ => Const::InterfaceMethodref(class, nat),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        push_u16(out, self.entries.len() as u16 + 1);
        for entry in &self.entries {
            match entry {
                Const::Utf8(value) => {
                    out.push(1);
                    push_u16(out, value.len() as u16);
                    out.extend_from_slice(value.as_bytes());
                }
                Const::Class(name) => {
                    out.push(7);
                    push_u16(out, *name);
                }
                Const::NameAndType(name, descriptor) => {
                    out.push(12);
                    push_u16(out, *name);
                    push_u16(out, *descriptor);
                }
                Const::Fieldref(class, nat) => {
                    out.push(9);
                    push_u16(out, *class);
                    push_u16(out, *nat);
                }
                Const::Methodref(class, nat) => {
                    out.push(10);
                    push_u16(out, *class);
                    push_u16(out, *nat);
                }
                Const::InterfaceMethodref(class, nat) => {
                    out.push(11);
                    push_u16(out, *class);
                    push_u16(out, *nat);
                }
                Const::Module(name) => {
                    out.push(19);
                    push_u16(out, *name);
                }
                Const::Package(name) => {
                    out.push(20);
                    push_u16(out, *name);
                }
            }
        }
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// One instruction emitted into a method body.
#[derive(Clone, Debug)]
pub enum Insn {
    GetField { owner: String, name: String, descriptor: String },
    GetStatic { owner: String, name: String, descriptor: String },
    InvokeVirtual { owner: String, name: String, descriptor: String },
    InvokeStatic { owner: String, name: String, descriptor: String },
    InvokeInterface { owner: String, name: String, descriptor: String },
    New(String),
    CheckCast(String),
    Pop,
    Return,
}

impl Insn {
    pub fn get_field(owner: &str, name: &str, descriptor: &str) -> Self {
        Insn::GetField {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn get_static(owner: &str, name: &str, descriptor: &str) -> Self {
        Insn::GetStatic {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn invoke_virtual(owner: &str, name: &str, descriptor: &str) -> Self {
        Insn::InvokeVirtual {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn invoke_static(owner: &str, name: &str, descriptor: &str) -> Self {
        Insn::InvokeStatic {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn invoke_interface(owner: &str, name: &str, descriptor: &str) -> Self {
        Insn::InvokeInterface {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldSpec {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub annotations: Vec<String>,
}

impl FieldSpec {
    pub fn new(access: u16, name: &str, descriptor: &str) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn annotation(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.into());
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct MethodSpec {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub annotations: Vec<String>,
    pub code: Vec<Insn>,
    /// `(name, descriptor)` rows of the `LocalVariableTable`.
    pub locals: Vec<(String, String)>,
    /// `(name, signature)` rows of the `LocalVariableTypeTable`.
    pub local_types: Vec<(String, String)>,
}

impl MethodSpec {
    pub fn new(access: u16, name: &str, descriptor: &str) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn throws(mut self, internal: &str) -> Self {
        self.exceptions.push(internal.into());
        self
    }

    pub fn annotation(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.into());
        self
    }

    pub fn code(mut self, insns: Vec<Insn>) -> Self {
        self.code = insns;
        self
    }

    pub fn local(mut self, name: &str, descriptor: &str) -> Self {
        self.locals.push((name.into(), descriptor.into()));
        self
    }

    pub fn local_type(mut self, name: &str, signature: &str) -> Self {
        self.local_types.push((name.into(), signature.into()));
        self
    }
}

/// Builder for minimal class files (major version 61).
#[derive(Clone, Debug)]
pub struct ClassFileBuilder {
    this_class: String,
    access: u16,
    super_class: Option<String>,
    interfaces: Vec<String>,
    signature: Option<String>,
    annotations: Vec<String>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
    inner_classes: Vec<(String, Option<String>, Option<String>, u16)>,
    enclosing: Option<(String, Option<(String, String)>)>,
    module: Option<(String, Vec<String>, Vec<String>)>,
    extra_classes: Vec<String>,
}

impl ClassFileBuilder {
    pub fn new(internal_name: &str) -> Self {
        Self {
            this_class: internal_name.into(),
            access: 0x0021,
            super_class: Some("java/lang/Object".into()),
            interfaces: Vec::new(),
            signature: None,
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            enclosing: None,
            module: None,
            extra_classes: Vec::new(),
        }
    }

    /// `module-info.class` for `name`, exporting `exports` (dotted packages)
    /// and using `uses` (internal class names).
    pub fn module_info(name: &str, exports: &[&str], uses: &[&str]) -> Self {
        let mut builder = Self::new("module-info");
        builder.access = 0x8000;
        builder.super_class = None;
        builder.module = Some((
            name.into(),
            exports.iter().map(|p| p.replace('.', "/")).collect(),
            uses.iter().map(|u| u.to_string()).collect(),
        ));
        builder
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_class(mut self, internal: Option<&str>) -> Self {
        self.super_class = internal.map(str::to_string);
        self
    }

    pub fn interface(mut self, internal: &str) -> Self {
        self.interfaces.push(internal.into());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn annotation(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    pub fn inner_class(
        mut self,
        inner: &str,
        outer: Option<&str>,
        simple_name: Option<&str>,
        access: u16,
    ) -> Self {
        self.inner_classes.push((
            inner.into(),
            outer.map(str::to_string),
            simple_name.map(str::to_string),
            access,
        ));
        self
    }

    pub fn enclosing_method(mut self, class: &str, method: Option<(&str, &str)>) -> Self {
        self.enclosing = Some((
            class.into(),
            method.map(|(n, d)| (n.to_string(), d.to_string())),
        ));
        self
    }

    /// Adds an otherwise unused `Class` constant.
    pub fn class_constant(mut self, internal: &str) -> Self {
        self.extra_classes.push(internal.into());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut cp = PoolBuilder::default();
        let mut body = Vec::new();

        push_u16(&mut body, self.access);
        let this_index = cp.class(&self.this_class);
        push_u16(&mut body, this_index);
        let super_index = self.super_class.as_deref().map_or(0, |s| cp.class(s));
        push_u16(&mut body, super_index);
        push_u16(&mut body, self.interfaces.len() as u16);
        for iface in &self.interfaces {
            let idx = cp.class(iface);
            push_u16(&mut body, idx);
        }
        for extra in &self.extra_classes {
            cp.class(extra);
        }

        push_u16(&mut body, self.fields.len() as u16);
        for field in &self.fields {
            push_u16(&mut body, field.access);
            push_u16(&mut body, cp.utf8(&field.name));
            push_u16(&mut body, cp.utf8(&field.descriptor));
            let mut attrs = Vec::new();
            if let Some(sig) = &field.signature {
                attrs.push(signature_attr(&mut cp, sig));
            }
            if !field.annotations.is_empty() {
                attrs.push(annotations_attr(&mut cp, &field.annotations));
            }
            write_attrs(&mut body, &attrs);
        }

        push_u16(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            push_u16(&mut body, method.access);
            push_u16(&mut body, cp.utf8(&method.name));
            push_u16(&mut body, cp.utf8(&method.descriptor));
            let mut attrs = Vec::new();
            if let Some(sig) = &method.signature {
                attrs.push(signature_attr(&mut cp, sig));
            }
            if !method.annotations.is_empty() {
                attrs.push(annotations_attr(&mut cp, &method.annotations));
            }
            if !method.exceptions.is_empty() {
                let mut data = Vec::new();
                push_u16(&mut data, method.exceptions.len() as u16);
                for ex in &method.exceptions {
                    let idx = cp.class(ex);
                    push_u16(&mut data, idx);
                }
                attrs.push((cp.utf8("Exceptions"), data));
            }
            if !method.code.is_empty() || !method.locals.is_empty() {
                attrs.push(code_attr(&mut cp, method));
            }
            write_attrs(&mut body, &attrs);
        }

        let mut attrs = Vec::new();
        if let Some(sig) = &self.signature {
            attrs.push(signature_attr(&mut cp, sig));
        }
        if !self.annotations.is_empty() {
            attrs.push(annotations_attr(&mut cp, &self.annotations));
        }
        if !self.inner_classes.is_empty() {
            let mut data = Vec::new();
            push_u16(&mut data, self.inner_classes.len() as u16);
            for (inner, outer, simple, access) in &self.inner_classes {
                let inner_idx = cp.class(inner);
                push_u16(&mut data, inner_idx);
                let outer_idx = outer.as_deref().map_or(0, |o| cp.class(o));
                push_u16(&mut data, outer_idx);
                let simple_idx = simple.as_deref().map_or(0, |s| cp.utf8(s));
                push_u16(&mut data, simple_idx);
                push_u16(&mut data, *access);
            }
            attrs.push((cp.utf8("InnerClasses"), data));
        }
        if let Some((class, method)) = &self.enclosing {
            let mut data = Vec::new();
            let class_idx = cp.class(class);
            push_u16(&mut data, class_idx);
            let nat = method
                .as_ref()
                .map_or(0, |(name, desc)| cp.name_and_type(name, desc));
            push_u16(&mut data, nat);
            attrs.push((cp.utf8("EnclosingMethod"), data));
        }
        if let Some((name, exports, uses)) = &self.module {
            let mut data = Vec::new();
            let name_utf8 = cp.utf8(name);
            let module_idx = cp.intern(Const::Module(name_utf8));
            push_u16(&mut data, module_idx);
            push_u16(&mut data, 0); // flags
            push_u16(&mut data, 0); // version
            let base_utf8 = cp.utf8("java.base");
            let base = cp.intern(Const::Module(base_utf8));
            push_u16(&mut data, 1);
            push_u16(&mut data, base);
            push_u16(&mut data, 0x8000);
            push_u16(&mut data, 0);
            push_u16(&mut data, exports.len() as u16);
            for package in exports {
                let utf8 = cp.utf8(package);
                let idx = cp.intern(Const::Package(utf8));
                push_u16(&mut data, idx);
                push_u16(&mut data, 0);
                push_u16(&mut data, 0);
            }
            push_u16(&mut data, 0); // opens
            push_u16(&mut data, uses.len() as u16);
            for service in uses {
                let idx = cp.class(service);
                push_u16(&mut data, idx);
            }
            push_u16(&mut data, 0); // provides
            attrs.push((cp.utf8("Module"), data));
        }
        write_attrs(&mut body, &attrs);

        let mut out = Vec::new();
        push_u32(&mut out, 0xCAFE_BABE);
        push_u16(&mut out, 0);
        push_u16(&mut out, MAJOR_JAVA_17);
        cp.write(&mut out);
        out.extend_from_slice(&body);
        out
    }
}

fn signature_attr(cp: &mut PoolBuilder, signature: &str) -> (u16, Vec<u8>) {
    let mut data = Vec::new();
    push_u16(&mut data, cp.utf8(signature));
    (cp.utf8("Signature"), data)
}

fn annotations_attr(cp: &mut PoolBuilder, descriptors: &[String]) -> (u16, Vec<u8>) {
    let mut data = Vec::new();
    push_u16(&mut data, descriptors.len() as u16);
    for desc in descriptors {
        push_u16(&mut data, cp.utf8(desc));
        push_u16(&mut data, 0);
    }
    (cp.utf8("RuntimeVisibleAnnotations"), data)
}

fn code_attr(cp: &mut PoolBuilder, method: &MethodSpec) -> (u16, Vec<u8>) {
    let mut code = Vec::new();
    for insn in &method.code {
        match insn {
            Insn::GetField {
                owner,
                name,
                descriptor,
            } => {
                code.push(0xb4);
                push_u16(&mut code, cp.member(9, owner, name, descriptor));
            }
            Insn::GetStatic {
                owner,
                name,
                descriptor,
            } => {
                code.push(0xb2);
                push_u16(&mut code, cp.member(9, owner, name, descriptor));
            }
            Insn::InvokeVirtual {
                owner,
                name,
                descriptor,
            } => {
                code.push(0xb6);
                push_u16(&mut code, cp.member(10, owner, name, descriptor));
            }
            Insn::InvokeStatic {
                owner,
                name,
                descriptor,
            } => {
                code.push(0xb8);
                push_u16(&mut code, cp.member(10, owner, name, descriptor));
            }
            Insn::InvokeInterface {
                owner,
                name,
                descriptor,
            } => {
                code.push(0xb9);
                push_u16(&mut code, cp.member(11, owner, name, descriptor));
                code.push(1);
                code.push(0);
            }
            Insn::New(class) => {
                code.push(0xbb);
                push_u16(&mut code, cp.class(class));
            }
            Insn::CheckCast(class) => {
                code.push(0xc0);
                push_u16(&mut code, cp.class(class));
            }
            Insn::Pop => code.push(0x57),
            Insn::Return => code.push(0xb1),
        }
    }
    if !matches!(method.code.last(), Some(Insn::Return)) {
        code.push(0xb1);
    }

    let mut attrs = Vec::new();
    if !method.locals.is_empty() {
        attrs.push(local_table(cp, "LocalVariableTable", &method.locals, code.len()));
    }
    if !method.local_types.is_empty() {
        attrs.push(local_table(
            cp,
            "LocalVariableTypeTable",
            &method.local_types,
            code.len(),
        ));
    }

    let mut data = Vec::new();
    push_u16(&mut data, 4); // max_stack
    push_u16(&mut data, (method.locals.len() as u16).max(1)); // max_locals
    push_u32(&mut data, code.len() as u32);
    data.extend_from_slice(&code);
    push_u16(&mut data, 0); // exception table
    write_attrs(&mut data, &attrs);
    (cp.utf8("Code"), data)
}

fn local_table(
    cp: &mut PoolBuilder,
    attr: &str,
    rows: &[(String, String)],
    code_len: usize,
) -> (u16, Vec<u8>) {
    let mut data = Vec::new();
    push_u16(&mut data, rows.len() as u16);
    for (slot, (name, descriptor)) in rows.iter().enumerate() {
        push_u16(&mut data, 0);
        push_u16(&mut data, code_len as u16);
        push_u16(&mut data, cp.utf8(name));
        push_u16(&mut data, cp.utf8(descriptor));
        push_u16(&mut data, slot as u16);
    }
    (cp.utf8(attr), data)
}

fn write_attrs(out: &mut Vec<u8>, attrs: &[(u16, Vec<u8>)]) {
    push_u16(out, attrs.len() as u16);
    for (name, data) in attrs {
        push_u16(out, *name);
        push_u32(out, data.len() as u32);
        out.extend_from_slice(data);
    }
}
