use crate::constant_pool::{ConstantPool, CpInfo};
use crate::descriptor::parse_field_descriptor;
use crate::error::{Error, Result};
use crate::reader::Reader;

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub type_descriptor: String,
    pub type_internal_name: Option<String>,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub(crate) fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        let type_descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
        let type_internal_name = descriptor_to_internal_name(&type_descriptor);

        let count = reader.read_u2()? as usize;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            let name = cp.get_utf8(reader.read_u2()?)?.to_string();
            let value = ElementValue::parse(reader, cp)?;
            elements.push((name, value));
        }

        Ok(Self {
            type_descriptor,
            type_internal_name,
            elements,
        })
    }

    pub(crate) fn parse_list(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Vec<Self>> {
        let count = reader.read_u2()? as usize;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(Annotation::parse(reader, cp)?);
        }
        Ok(out)
    }

    /// Internal names of every type reachable from this annotation: its own
    /// type, enum constant types, class literals and nested annotations.
    pub fn referenced_types(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_types(&mut out);
        out
    }

    fn collect_types(&self, out: &mut Vec<String>) {
        if let Some(name) = &self.type_internal_name {
            out.push(name.clone());
        }
        for (_, value) in &self.elements {
            value.collect_types(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const(ConstValue),
    Enum {
        type_descriptor: String,
        const_name: String,
    },
    /// Return descriptor of a class literal (`Ljava/lang/String;`, `V`, `[I`).
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        let tag = reader.read_u1()?;
        let value = match tag {
            b'B' | b'C' | b'I' | b'S' | b'Z' => {
                let index = reader.read_u2()?;
                let value = match cp.get(index)? {
                    CpInfo::Integer(v) => *v,
                    other => return Err(mismatch(index, "Integer", other)),
                };
                ElementValue::Const(match tag {
                    b'B' => ConstValue::Byte(value as i8),
                    b'C' => ConstValue::Char(
                        char::from_u32(value as u32)
                            .ok_or(Error::MalformedAttribute("annotation char"))?,
                    ),
                    b'I' => ConstValue::Int(value),
                    b'S' => ConstValue::Short(value as i16),
                    _ => ConstValue::Boolean(value != 0),
                })
            }
            b'D' => {
                let index = reader.read_u2()?;
                match cp.get(index)? {
                    CpInfo::Double(v) => ElementValue::Const(ConstValue::Double(*v)),
                    other => return Err(mismatch(index, "Double", other)),
                }
            }
            b'F' => {
                let index = reader.read_u2()?;
                match cp.get(index)? {
                    CpInfo::Float(v) => ElementValue::Const(ConstValue::Float(*v)),
                    other => return Err(mismatch(index, "Float", other)),
                }
            }
            b'J' => {
                let index = reader.read_u2()?;
                match cp.get(index)? {
                    CpInfo::Long(v) => ElementValue::Const(ConstValue::Long(*v)),
                    other => return Err(mismatch(index, "Long", other)),
                }
            }
            b's' => ElementValue::Const(ConstValue::String(
                cp.get_string_constant(reader.read_u2()?)?,
            )),
            b'e' => ElementValue::Enum {
                type_descriptor: cp.get_utf8(reader.read_u2()?)?.to_string(),
                const_name: cp.get_utf8(reader.read_u2()?)?.to_string(),
            },
            b'c' => ElementValue::Class(cp.get_utf8(reader.read_u2()?)?.to_string()),
            b'@' => ElementValue::Annotation(Box::new(Annotation::parse(reader, cp)?)),
            b'[' => {
                let count = reader.read_u2()? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(ElementValue::parse(reader, cp)?);
                }
                ElementValue::Array(values)
            }
            _ => return Err(Error::MalformedAttribute("annotation element_value")),
        };
        Ok(value)
    }

    fn collect_types(&self, out: &mut Vec<String>) {
        match self {
            ElementValue::Const(_) => {}
            ElementValue::Enum {
                type_descriptor, ..
            } => out.extend(descriptor_to_internal_name(type_descriptor)),
            ElementValue::Class(descriptor) => {
                if let Ok(ty) = parse_field_descriptor(descriptor) {
                    out.extend(ty.class_name().map(str::to_string));
                }
            }
            ElementValue::Annotation(nested) => nested.collect_types(out),
            ElementValue::Array(values) => {
                for value in values {
                    value.collect_types(out);
                }
            }
        }
    }
}

fn mismatch(index: u16, expected: &'static str, found: &CpInfo) -> Error {
    Error::ConstantPoolTypeMismatch {
        index,
        expected,
        found: found.kind(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
}

pub fn descriptor_to_internal_name(desc: &str) -> Option<String> {
    desc.strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .map(|name| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_annotation_types_are_collected() {
        let inner = Annotation {
            type_descriptor: "Lpkg/Inner;".into(),
            type_internal_name: Some("pkg/Inner".into()),
            elements: vec![(
                "mode".into(),
                ElementValue::Enum {
                    type_descriptor: "Lpkg/Mode;".into(),
                    const_name: "FAST".into(),
                },
            )],
        };
        let outer = Annotation {
            type_descriptor: "Lpkg/Outer;".into(),
            type_internal_name: Some("pkg/Outer".into()),
            elements: vec![(
                "value".into(),
                ElementValue::Array(vec![
                    ElementValue::Annotation(Box::new(inner)),
                    ElementValue::Class("[Ljava/io/File;".into()),
                    ElementValue::Class("V".into()),
                    ElementValue::Const(ConstValue::Int(1)),
                ]),
            )],
        };
        assert_eq!(
            outer.referenced_types(),
            vec!["pkg/Outer", "pkg/Inner", "pkg/Mode", "java/io/File"]
        );
    }
}
