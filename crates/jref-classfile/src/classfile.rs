use crate::annotation::Annotation;
use crate::constant_pool::ConstantPool;
use crate::error::{Error, Result};
use crate::module_info::ModuleAttribute;
use crate::reader::Reader;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_MODULE: u16 = 0x8000;

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<ClassMember>,
    pub methods: Vec<ClassMember>,
    pub signature: Option<String>,
    pub runtime_visible_annotations: Vec<Annotation>,
    pub runtime_invisible_annotations: Vec<Annotation>,
    pub inner_classes: Vec<InnerClassInfo>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub module: Option<ModuleAttribute>,
    pub is_record: bool,
    pub constant_pool: ConstantPool,
}

#[derive(Debug, Clone)]
pub struct ClassMember {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub runtime_visible_annotations: Vec<Annotation>,
    pub runtime_invisible_annotations: Vec<Annotation>,
    /// Internal names from the `Exceptions` attribute (methods only).
    pub exceptions: Vec<String>,
    pub code: Option<Code>,
}

#[derive(Debug, Clone, Default)]
pub struct Code {
    pub bytes: Vec<u8>,
    /// Internal names of the caught types in the exception table.
    pub catch_types: Vec<String>,
    /// `LocalVariableTable` entries; `descriptor` holds a field descriptor.
    pub local_variables: Vec<LocalVariable>,
    /// `LocalVariableTypeTable` entries; `descriptor` holds a field signature.
    pub local_variable_types: Vec<LocalVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub slot: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassInfo {
    pub inner_class: String,
    pub outer_class: Option<String>,
    pub inner_name: Option<String>,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class: String,
    pub method: Option<(String, String)>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_index = reader.read_u2()?;
        let this_class = cp.get_class_name(this_index)?;
        let super_class = match reader.read_u2()? {
            0 => None,
            idx => Some(cp.get_class_name(idx)?),
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?);
        }

        let fields = parse_members(&mut reader, &cp)?;
        let methods = parse_members(&mut reader, &cp)?;
        let attrs = parse_attributes(&mut reader, &cp, AttributeTarget::Class)?;

        reader.ensure_empty()?;

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            signature: attrs.signature,
            runtime_visible_annotations: attrs.runtime_visible_annotations,
            runtime_invisible_annotations: attrs.runtime_invisible_annotations,
            inner_classes: attrs.inner_classes,
            enclosing_method: attrs.enclosing_method,
            module: attrs.module,
            is_record: attrs.is_record,
            constant_pool: cp,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags & ACC_ANNOTATION != 0
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags & ACC_ENUM != 0
    }

    pub fn is_module(&self) -> bool {
        self.access_flags & ACC_MODULE != 0
    }

    /// Visible and invisible annotations, visible first.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.runtime_visible_annotations
            .iter()
            .chain(&self.runtime_invisible_annotations)
    }
}

impl ClassMember {
    pub fn is_synthetic(&self) -> bool {
        self.access_flags & ACC_SYNTHETIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.runtime_visible_annotations
            .iter()
            .chain(&self.runtime_invisible_annotations)
    }
}

fn parse_members(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Vec<ClassMember>> {
    let count = reader.read_u2()? as usize;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let access_flags = reader.read_u2()?;
        let name = cp.get_utf8(reader.read_u2()?)?.to_string();
        let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
        let attrs = parse_attributes(reader, cp, AttributeTarget::Member)?;
        members.push(ClassMember {
            access_flags,
            name,
            descriptor,
            signature: attrs.signature,
            runtime_visible_annotations: attrs.runtime_visible_annotations,
            runtime_invisible_annotations: attrs.runtime_invisible_annotations,
            exceptions: attrs.exceptions,
            code: attrs.code,
        });
    }
    Ok(members)
}

#[derive(Default)]
struct ParsedAttributes {
    signature: Option<String>,
    runtime_visible_annotations: Vec<Annotation>,
    runtime_invisible_annotations: Vec<Annotation>,
    inner_classes: Vec<InnerClassInfo>,
    enclosing_method: Option<EnclosingMethod>,
    module: Option<ModuleAttribute>,
    is_record: bool,
    exceptions: Vec<String>,
    code: Option<Code>,
    local_variables: Vec<LocalVariable>,
    local_variable_types: Vec<LocalVariable>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AttributeTarget {
    Class,
    Member,
    Code,
}

fn parse_attributes(
    reader: &mut Reader<'_>,
    cp: &ConstantPool,
    target: AttributeTarget,
) -> Result<ParsedAttributes> {
    let attributes_count = reader.read_u2()? as usize;
    let mut parsed = ParsedAttributes::default();
    for _ in 0..attributes_count {
        let name = cp.get_utf8(reader.read_u2()?)?;
        let length = reader.read_u4()? as usize;
        let mut sub = Reader::new(reader.read_bytes(length)?);

        match (name, target) {
            ("Signature", AttributeTarget::Class | AttributeTarget::Member) => {
                parsed.signature = Some(cp.get_utf8(sub.read_u2()?)?.to_string());
            }
            ("RuntimeVisibleAnnotations", AttributeTarget::Class | AttributeTarget::Member) => {
                parsed
                    .runtime_visible_annotations
                    .extend(Annotation::parse_list(&mut sub, cp)?);
            }
            ("RuntimeInvisibleAnnotations", AttributeTarget::Class | AttributeTarget::Member) => {
                parsed
                    .runtime_invisible_annotations
                    .extend(Annotation::parse_list(&mut sub, cp)?);
            }
            ("InnerClasses", AttributeTarget::Class) => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    let inner_class = cp.get_class_name(sub.read_u2()?)?;
                    let outer_class = match sub.read_u2()? {
                        0 => None,
                        idx => Some(cp.get_class_name(idx)?),
                    };
                    let inner_name = match sub.read_u2()? {
                        0 => None,
                        idx => Some(cp.get_utf8(idx)?.to_string()),
                    };
                    parsed.inner_classes.push(InnerClassInfo {
                        inner_class,
                        outer_class,
                        inner_name,
                        access_flags: sub.read_u2()?,
                    });
                }
            }
            ("EnclosingMethod", AttributeTarget::Class) => {
                let class = cp.get_class_name(sub.read_u2()?)?;
                let method = match sub.read_u2()? {
                    0 => None,
                    idx => {
                        let (name, descriptor) = cp.get_name_and_type(idx)?;
                        Some((name.to_string(), descriptor.to_string()))
                    }
                };
                parsed.enclosing_method = Some(EnclosingMethod { class, method });
            }
            ("Module", AttributeTarget::Class) => {
                parsed.module = Some(ModuleAttribute::parse(&mut sub, cp)?);
            }
            ("Record", AttributeTarget::Class) => {
                parsed.is_record = true;
                continue;
            }
            ("Exceptions", AttributeTarget::Member) => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    parsed.exceptions.push(cp.get_class_name(sub.read_u2()?)?);
                }
            }
            ("Code", AttributeTarget::Member) => {
                parsed.code = Some(parse_code(&mut sub, cp)?);
            }
            ("LocalVariableTable", AttributeTarget::Code) => {
                parsed
                    .local_variables
                    .extend(parse_local_variables(&mut sub, cp)?);
            }
            ("LocalVariableTypeTable", AttributeTarget::Code) => {
                parsed
                    .local_variable_types
                    .extend(parse_local_variables(&mut sub, cp)?);
            }
            _ => continue,
        }
        sub.ensure_empty()
            .map_err(|_| Error::MalformedAttribute(attribute_label(name)))?;
    }

    Ok(parsed)
}

fn attribute_label(name: &str) -> &'static str {
    match name {
        "Signature" => "Signature",
        "RuntimeVisibleAnnotations" => "RuntimeVisibleAnnotations",
        "RuntimeInvisibleAnnotations" => "RuntimeInvisibleAnnotations",
        "InnerClasses" => "InnerClasses",
        "EnclosingMethod" => "EnclosingMethod",
        "Module" => "Module",
        "Exceptions" => "Exceptions",
        "Code" => "Code",
        "LocalVariableTable" => "LocalVariableTable",
        "LocalVariableTypeTable" => "LocalVariableTypeTable",
        _ => "unknown",
    }
}

fn parse_code(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Code> {
    let _max_stack = reader.read_u2()?;
    let _max_locals = reader.read_u2()?;
    let code_length = reader.read_u4()? as usize;
    let bytes = reader.read_bytes(code_length)?.to_vec();

    let table_length = reader.read_u2()? as usize;
    let mut catch_types = Vec::new();
    for _ in 0..table_length {
        reader.skip(6)?; // start_pc, end_pc, handler_pc
        match reader.read_u2()? {
            0 => {}
            idx => catch_types.push(cp.get_class_name(idx)?),
        }
    }

    let attrs = parse_attributes(reader, cp, AttributeTarget::Code)?;
    Ok(Code {
        bytes,
        catch_types,
        local_variables: attrs.local_variables,
        local_variable_types: attrs.local_variable_types,
    })
}

fn parse_local_variables(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Vec<LocalVariable>> {
    let count = reader.read_u2()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(LocalVariable {
            start_pc: reader.read_u2()?,
            length: reader.read_u2()?,
            name: cp.get_utf8(reader.read_u2()?)?.to_string(),
            descriptor: cp.get_utf8(reader.read_u2()?)?.to_string(),
            slot: reader.read_u2()?,
        });
    }
    Ok(out)
}
