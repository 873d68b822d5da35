//! Parser for the generic `Signature` attribute grammar (JVMS 4.7.9.1).
//!
//! Descriptors erase type arguments, so the signature is the only place where
//! e.g. the `String` in `List<String>` survives compilation.

use crate::descriptor::BaseType;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSignature {
    Base(BaseType),
    Class(ClassTypeSignature),
    TypeVariable(String),
    Array(Box<TypeSignature>),
}

/// A reference type signature as it appears on fields.
pub type FieldTypeSignature = TypeSignature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTypeSignature {
    /// Package prefix in internal form (`java/util`), empty for the default package.
    pub package: String,
    /// Outer-to-inner chain; `Map.Entry<K, V>` has two segments.
    pub segments: Vec<SimpleClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleClassTypeSignature {
    pub name: String,
    pub type_arguments: Vec<TypeArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArgument {
    Any,
    Exact(TypeSignature),
    Extends(TypeSignature),
    Super(TypeSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
    pub class_bound: Option<TypeSignature>,
    pub interface_bounds: Vec<TypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub super_class: ClassTypeSignature,
    pub interfaces: Vec<ClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<TypeSignature>,
    /// `None` for `void`.
    pub return_type: Option<TypeSignature>,
    pub throws: Vec<TypeSignature>,
}

impl ClassTypeSignature {
    /// Internal binary name, inner segments joined with `$`.
    pub fn internal_name(&self) -> String {
        let mut out = String::new();
        if !self.package.is_empty() {
            out.push_str(&self.package);
            out.push('/');
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                out.push('$');
            }
            out.push_str(&segment.name);
        }
        out
    }

    fn collect(&self, out: &mut Vec<String>) {
        out.push(self.internal_name());
        for segment in &self.segments {
            for arg in &segment.type_arguments {
                arg.collect(out);
            }
        }
    }
}

impl TypeArgument {
    fn collect(&self, out: &mut Vec<String>) {
        match self {
            TypeArgument::Any => {}
            TypeArgument::Exact(ty) | TypeArgument::Extends(ty) | TypeArgument::Super(ty) => {
                ty.collect(out)
            }
        }
    }
}

impl TypeSignature {
    fn collect(&self, out: &mut Vec<String>) {
        match self {
            TypeSignature::Base(_) | TypeSignature::TypeVariable(_) => {}
            TypeSignature::Class(class) => class.collect(out),
            TypeSignature::Array(component) => component.collect(out),
        }
    }

    /// Internal names of every class mentioned, in encounter order.
    pub fn class_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }
}

impl TypeParameter {
    fn collect(&self, out: &mut Vec<String>) {
        if let Some(bound) = &self.class_bound {
            bound.collect(out);
        }
        for bound in &self.interface_bounds {
            bound.collect(out);
        }
    }
}

impl ClassSignature {
    pub fn class_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for param in &self.type_parameters {
            param.collect(&mut out);
        }
        self.super_class.collect(&mut out);
        for iface in &self.interfaces {
            iface.collect(&mut out);
        }
        out
    }
}

impl MethodSignature {
    pub fn class_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for param in &self.type_parameters {
            param.collect(&mut out);
        }
        for param in &self.parameters {
            param.collect(&mut out);
        }
        if let Some(ret) = &self.return_type {
            ret.collect(&mut out);
        }
        for thrown in &self.throws {
            thrown.collect(&mut out);
        }
        out
    }
}

pub fn parse_class_signature(signature: &str) -> Result<ClassSignature> {
    let mut parser = Parser::new(signature);
    let type_parameters = parser.type_parameters()?;
    let super_class = parser.class_type()?;
    let mut interfaces = Vec::new();
    while !parser.at_end() {
        interfaces.push(parser.class_type()?);
    }
    Ok(ClassSignature {
        type_parameters,
        super_class,
        interfaces,
    })
}

pub fn parse_method_signature(signature: &str) -> Result<MethodSignature> {
    let mut parser = Parser::new(signature);
    let type_parameters = parser.type_parameters()?;
    parser.expect(b'(')?;
    let mut parameters = Vec::new();
    while parser.peek() != Some(b')') {
        parameters.push(parser.java_type()?);
    }
    parser.expect(b')')?;
    let return_type = if parser.eat(b'V') {
        None
    } else {
        Some(parser.java_type()?)
    };
    let mut throws = Vec::new();
    while parser.eat(b'^') {
        throws.push(parser.reference_type()?);
    }
    parser.finish()?;
    Ok(MethodSignature {
        type_parameters,
        parameters,
        return_type,
        throws,
    })
}

pub fn parse_field_signature(signature: &str) -> Result<FieldTypeSignature> {
    let mut parser = Parser::new(signature);
    let ty = parser.reference_type()?;
    parser.finish()?;
    Ok(ty)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self) -> Error {
        Error::InvalidSignature(self.input.to_string())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn finish(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn identifier(&mut self) -> Result<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'.' | b';' | b'[' | b'/' | b'<' | b'>' | b':') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error());
        }
        Ok(&self.input[start..self.pos])
    }

    fn type_parameters(&mut self) -> Result<Vec<TypeParameter>> {
        let mut params = Vec::new();
        if !self.eat(b'<') {
            return Ok(params);
        }
        while !self.eat(b'>') {
            let name = self.identifier()?.to_string();
            self.expect(b':')?;
            let class_bound = match self.peek() {
                Some(b':') => None,
                Some(b'L' | b'T' | b'[') => Some(self.reference_type()?),
                _ => None,
            };
            let mut interface_bounds = Vec::new();
            while self.eat(b':') {
                interface_bounds.push(self.reference_type()?);
            }
            params.push(TypeParameter {
                name,
                class_bound,
                interface_bounds,
            });
        }
        if params.is_empty() {
            return Err(self.error());
        }
        Ok(params)
    }

    fn java_type(&mut self) -> Result<TypeSignature> {
        let base = match self.peek() {
            Some(b'B') => BaseType::Byte,
            Some(b'C') => BaseType::Char,
            Some(b'D') => BaseType::Double,
            Some(b'F') => BaseType::Float,
            Some(b'I') => BaseType::Int,
            Some(b'J') => BaseType::Long,
            Some(b'S') => BaseType::Short,
            Some(b'Z') => BaseType::Boolean,
            _ => return self.reference_type(),
        };
        self.pos += 1;
        Ok(TypeSignature::Base(base))
    }

    fn reference_type(&mut self) -> Result<TypeSignature> {
        match self.peek() {
            Some(b'L') => Ok(TypeSignature::Class(self.class_type()?)),
            Some(b'T') => {
                self.pos += 1;
                let name = self.identifier()?.to_string();
                self.expect(b';')?;
                Ok(TypeSignature::TypeVariable(name))
            }
            Some(b'[') => {
                self.pos += 1;
                Ok(TypeSignature::Array(Box::new(self.java_type()?)))
            }
            _ => Err(self.error()),
        }
    }

    fn class_type(&mut self) -> Result<ClassTypeSignature> {
        self.expect(b'L')?;
        let mut package = String::new();
        let mut name = self.identifier()?;
        while self.eat(b'/') {
            if !package.is_empty() {
                package.push('/');
            }
            package.push_str(name);
            name = self.identifier()?;
        }

        let mut segments = vec![SimpleClassTypeSignature {
            name: name.to_string(),
            type_arguments: self.type_arguments()?,
        }];
        while self.eat(b'.') {
            let name = self.identifier()?.to_string();
            segments.push(SimpleClassTypeSignature {
                name,
                type_arguments: self.type_arguments()?,
            });
        }
        self.expect(b';')?;
        Ok(ClassTypeSignature { package, segments })
    }

    fn type_arguments(&mut self) -> Result<Vec<TypeArgument>> {
        let mut args = Vec::new();
        if !self.eat(b'<') {
            return Ok(args);
        }
        while !self.eat(b'>') {
            let arg = match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    TypeArgument::Any
                }
                Some(b'+') => {
                    self.pos += 1;
                    TypeArgument::Extends(self.reference_type()?)
                }
                Some(b'-') => {
                    self.pos += 1;
                    TypeArgument::Super(self.reference_type()?)
                }
                Some(_) => TypeArgument::Exact(self.reference_type()?),
                None => return Err(self.error()),
            };
            args.push(arg);
        }
        if args.is_empty() {
            return Err(self.error());
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn method_signature_class_names() {
        let sig = parse_method_signature(
            "<T:Ljava/lang/Object;>(Ljava/util/List<Ljava/lang/String;>;)Ljava/lang/Integer;",
        )
        .unwrap();
        assert_eq!(
            sig.class_names(),
            vec![
                "java/lang/Object",
                "java/util/List",
                "java/lang/String",
                "java/lang/Integer"
            ]
        );
        assert_eq!(sig.type_parameters[0].name, "T");
    }

    #[test]
    fn class_signature_with_interface_only_bound_and_inner_types() {
        let sig = parse_class_signature(
            "<K::Ljava/lang/Comparable<-TK;>;V:Ljava/lang/Object;>Ljava/util/AbstractMap<TK;TV;>;Ljava/lang/Iterable<Ljava/util/Map$Entry<TK;TV;>;>;",
        )
        .unwrap();
        assert!(sig.type_parameters[0].class_bound.is_none());
        assert_eq!(sig.super_class.internal_name(), "java/util/AbstractMap");
        assert_eq!(
            sig.class_names(),
            vec![
                "java/lang/Comparable",
                "java/lang/Object",
                "java/util/AbstractMap",
                "java/lang/Iterable",
                "java/util/Map$Entry"
            ]
        );
    }

    #[test]
    fn dotted_inner_class_segments() {
        let ty = parse_field_signature("Lpkg/Outer<Ljava/lang/String;>.Inner<*>;").unwrap();
        let TypeSignature::Class(class) = &ty else {
            panic!("expected class type");
        };
        assert_eq!(class.internal_name(), "pkg/Outer$Inner");
        assert_eq!(ty.class_names(), vec!["pkg/Outer$Inner", "java/lang/String"]);
    }

    #[test]
    fn throws_and_arrays() {
        let sig = parse_method_signature("([[TT;I)V^Ljava/io/IOException;^TE;").unwrap();
        assert_eq!(sig.parameters.len(), 2);
        assert!(sig.return_type.is_none());
        assert_eq!(sig.class_names(), vec!["java/io/IOException"]);
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        for bad in ["", "Ljava/lang/String", "<>V", "(Ljava/lang/String;", "Lfoo<>;"] {
            assert!(
                parse_field_signature(bad).is_err() || parse_method_signature(bad).is_err(),
                "{bad}"
            );
        }
        assert!(matches!(
            parse_method_signature("(X)V"),
            Err(Error::InvalidSignature(_))
        ));
    }
}
