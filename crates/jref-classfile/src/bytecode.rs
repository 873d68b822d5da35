//! Instruction-length table and a linear scanner over `Code` attribute bytes.

use crate::constant_pool::{ConstantPool, MemberRef};
use crate::error::{Error, Result};

const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;

const GETSTATIC: u8 = 0xb2;
const PUTSTATIC: u8 = 0xb3;
const GETFIELD: u8 = 0xb4;
const PUTFIELD: u8 = 0xb5;
const INVOKEVIRTUAL: u8 = 0xb6;
const INVOKESPECIAL: u8 = 0xb7;
const INVOKESTATIC: u8 = 0xb8;
const INVOKEINTERFACE: u8 = 0xb9;
const NEW: u8 = 0xbb;
const ANEWARRAY: u8 = 0xbd;
const CHECKCAST: u8 = 0xc0;
const INSTANCEOF: u8 = 0xc1;
const MULTIANEWARRAY: u8 = 0xc5;

/// Fixed instruction lengths including the opcode byte. `0` marks either a
/// variable-length instruction or an unassigned opcode.
const OPCODE_LENGTHS: [u8; 256] = build_length_table();

const fn build_length_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut op = 0;
    while op <= 0xca {
        table[op] = 1;
        op += 1;
    }
    table[0x10] = 2; // bipush
    table[0x11] = 3; // sipush
    table[0x12] = 2; // ldc
    table[0x13] = 3; // ldc_w
    table[0x14] = 3; // ldc2_w
    let mut op = 0x15;
    while op <= 0x19 {
        table[op] = 2; // xload
        op += 1;
    }
    let mut op = 0x36;
    while op <= 0x3a {
        table[op] = 2; // xstore
        op += 1;
    }
    table[IINC as usize] = 3;
    let mut op = 0x99;
    while op <= 0xa8 {
        table[op] = 3; // if<cond>, goto, jsr
        op += 1;
    }
    table[0xa9] = 2; // ret
    table[TABLESWITCH as usize] = 0;
    table[LOOKUPSWITCH as usize] = 0;
    let mut op = 0xb2;
    while op <= 0xb8 {
        table[op] = 3; // field access and invoke{virtual,special,static}
        op += 1;
    }
    table[INVOKEINTERFACE as usize] = 5;
    table[0xba] = 5; // invokedynamic
    table[NEW as usize] = 3;
    table[0xbc] = 2; // newarray
    table[ANEWARRAY as usize] = 3;
    table[CHECKCAST as usize] = 3;
    table[INSTANCEOF as usize] = 3;
    table[WIDE as usize] = 0;
    table[MULTIANEWARRAY as usize] = 4;
    table[0xc6] = 3; // ifnull
    table[0xc7] = 3; // ifnonnull
    table[0xc8] = 5; // goto_w
    table[0xc9] = 5; // jsr_w
    table
}

fn read_i32(code: &[u8], at: usize) -> Result<i32> {
    let bytes = code
        .get(at..at + 4)
        .ok_or(Error::InvalidBytecode("truncated switch operand"))?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Length in bytes of the instruction starting at `pc`.
pub fn instruction_length(code: &[u8], pc: usize) -> Result<usize> {
    let opcode = *code
        .get(pc)
        .ok_or(Error::InvalidBytecode("pc out of range"))?;
    let fixed = OPCODE_LENGTHS[opcode as usize];
    if fixed != 0 {
        return Ok(fixed as usize);
    }

    match opcode {
        TABLESWITCH => {
            let operands = (pc + 4) & !3;
            let low = read_i32(code, operands + 4)?;
            let high = read_i32(code, operands + 8)?;
            if high < low {
                return Err(Error::InvalidBytecode("tableswitch high < low"));
            }
            let entries = (high as i64 - low as i64 + 1) as usize;
            Ok(operands + 12 + entries * 4 - pc)
        }
        LOOKUPSWITCH => {
            let operands = (pc + 4) & !3;
            let npairs = read_i32(code, operands + 4)?;
            if npairs < 0 {
                return Err(Error::InvalidBytecode("negative lookupswitch npairs"));
            }
            Ok(operands + 8 + npairs as usize * 8 - pc)
        }
        WIDE => match code.get(pc + 1) {
            Some(&IINC) => Ok(6),
            Some(_) => Ok(4),
            None => Err(Error::InvalidBytecode("truncated wide")),
        },
        _ => Err(Error::InvalidBytecode("unknown opcode")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOp {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Symbolic reference made by one instruction of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeReference {
    Field { pc: usize, op: FieldOp, member: MemberRef },
    Method { pc: usize, op: InvokeOp, member: MemberRef },
    Class { pc: usize, name: String },
}

/// Walks `code` instruction by instruction and resolves every field access,
/// method invocation and class-operand instruction against `cp`.
pub fn scan_member_accesses(code: &[u8], cp: &ConstantPool) -> Result<Vec<CodeReference>> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let opcode = code[pc];
        let len = instruction_length(code, pc)?;
        if pc + len > code.len() {
            return Err(Error::InvalidBytecode("instruction overruns code"));
        }
        let index = || u16::from_be_bytes([code[pc + 1], code[pc + 2]]);
        match opcode {
            GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => {
                let op = match opcode {
                    GETSTATIC => FieldOp::GetStatic,
                    PUTSTATIC => FieldOp::PutStatic,
                    GETFIELD => FieldOp::GetField,
                    _ => FieldOp::PutField,
                };
                out.push(CodeReference::Field {
                    pc,
                    op,
                    member: cp.get_member_ref(index())?,
                });
            }
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                let op = match opcode {
                    INVOKEVIRTUAL => InvokeOp::Virtual,
                    INVOKESPECIAL => InvokeOp::Special,
                    INVOKESTATIC => InvokeOp::Static,
                    _ => InvokeOp::Interface,
                };
                out.push(CodeReference::Method {
                    pc,
                    op,
                    member: cp.get_member_ref(index())?,
                });
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF | MULTIANEWARRAY => {
                out.push(CodeReference::Class {
                    pc,
                    name: cp.get_class_name(index())?,
                });
            }
            _ => {}
        }
        pc += len;
    }
    Ok(out)
}
