//! Structural reader for JVM class files.
//!
//! Only the parts needed for cross-reference indexing are decoded: the
//! constant pool, member tables, generic signatures, annotations, and the
//! `Code` attribute together with its local-variable tables.

#![forbid(unsafe_code)]

mod annotation;
mod bytecode;
mod classfile;
mod constant_pool;
mod descriptor;
mod error;
mod module_info;
mod reader;
mod signature;

pub use crate::annotation::{descriptor_to_internal_name, Annotation, ConstValue, ElementValue};
pub use crate::bytecode::{
    instruction_length, scan_member_accesses, CodeReference, FieldOp, InvokeOp,
};
pub use crate::classfile::{
    ClassFile, ClassMember, Code, EnclosingMethod, InnerClassInfo, LocalVariable, ACC_ANNOTATION,
    ACC_ENUM, ACC_INTERFACE, ACC_MODULE, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC,
    ACC_SYNTHETIC,
};
pub use crate::constant_pool::{ConstantPool, CpInfo, MemberRef};
pub use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
pub use crate::descriptor::{BaseType, FieldType, MethodDescriptor, ReturnType};
pub use crate::error::{Error, Result};
pub use crate::module_info::ModuleAttribute;
pub use crate::signature::{
    parse_class_signature, parse_field_signature, parse_method_signature, ClassSignature,
    ClassTypeSignature, FieldTypeSignature, MethodSignature, SimpleClassTypeSignature,
    TypeArgument, TypeParameter, TypeSignature,
};
