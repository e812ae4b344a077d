//! Two-pass assembler: `pest` tokenizes each line into an optional label
//! plus an opcode and a generic operand list; a second pass resolves
//! every label-shaped operand against the instruction-index table built
//! during the first pass and emits the final `Instruction` array.
//!
//! This mirrors the shape of the reference project's own pest-based
//! assembler (`Y86AsmParser` / `parse()` / `assemble()`), re-grounded as
//! an in-memory two-pass resolution instead of the original C++ model's
//! file-reopening label lookup (see DESIGN.md).

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::collections::HashMap;

use crate::error::SimError;
use crate::isa::{Instruction, Opcode};

#[derive(Parser)]
#[grammar = "asm/grammar.pest"]
struct AsmParser;

#[derive(Debug, Clone)]
enum Operand {
    Reg { index: u32, is_float: bool },
    Num(i64),
    Addr { offset: i64, reg: u32, reg_float: bool },
    Label(String),
}

struct RawInst {
    opcode: Opcode,
    operands: Vec<Operand>,
    line_no: usize,
}

fn parse_reg(pair: Pair<Rule>) -> Result<(u32, bool), SimError> {
    let line_no = pair.as_span().start_pos().line_col().0;
    let text = pair.as_str();
    let mut chars = text.chars();
    let prefix = chars.next().unwrap_or(' ');
    let is_float = match prefix {
        'R' | 'r' => false,
        'F' | 'f' => true,
        _ => {
            return Err(SimError::UnknownRegisterPrefix {
                line: line_no,
                token: text.to_string(),
            })
        }
    };
    let index: u32 = chars.as_str().parse().map_err(|_| SimError::UnknownRegisterPrefix {
        line: line_no,
        token: text.to_string(),
    })?;
    Ok((index, is_float))
}

fn parse_number(pair: Pair<Rule>) -> i64 {
    let text = pair.as_str();
    let (neg, rest) = match text.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, text),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).unwrap_or(0)
    } else {
        rest.parse().unwrap_or(0)
    };
    if neg {
        -value
    } else {
        value
    }
}

fn parse_operand(pair: Pair<Rule>) -> Result<Operand, SimError> {
    let inner = pair.into_inner().next().expect("operand has one inner token");
    match inner.as_rule() {
        Rule::reg => {
            let (index, is_float) = parse_reg(inner)?;
            Ok(Operand::Reg { index, is_float })
        }
        Rule::number => Ok(Operand::Num(parse_number(inner))),
        Rule::addr => {
            let mut parts = inner.into_inner();
            let offset = parse_number(parts.next().expect("addr offset"));
            let (reg, reg_float) = parse_reg(parts.next().expect("addr reg"))?;
            Ok(Operand::Addr {
                offset,
                reg,
                reg_float,
            })
        }
        Rule::ident => Ok(Operand::Label(inner.as_str().to_string())),
        r => unreachable!("unexpected operand inner rule {r:?}"),
    }
}

fn as_reg(op: &Operand, line: usize) -> Result<(u32, bool), SimError> {
    match op {
        Operand::Reg { index, is_float } => Ok((*index, *is_float)),
        other => Err(SimError::UnknownRegisterPrefix {
            line,
            token: format!("{other:?}"),
        }),
    }
}

fn as_label(op: &Operand, line: usize) -> Result<String, SimError> {
    match op {
        Operand::Label(name) => Ok(name.clone()),
        other => Err(SimError::UnknownMnemonic {
            line,
            token: format!("{other:?}"),
        }),
    }
}

fn as_num(op: &Operand) -> i64 {
    match op {
        Operand::Num(n) => *n,
        _ => 0,
    }
}

fn as_addr(op: &Operand, line: usize) -> Result<(i64, u32, bool), SimError> {
    match op {
        Operand::Addr {
            offset,
            reg,
            reg_float,
        } => Ok((*offset, *reg, *reg_float)),
        other => Err(SimError::UnknownRegisterPrefix {
            line,
            token: format!("{other:?}"),
        }),
    }
}

/// Parses `source` and resolves it into a flat instruction array. Does
/// not place anything in memory or touch the simulator state; see
/// `Simulator::load_program`.
pub fn assemble(source: &str) -> Result<Vec<Instruction>, SimError> {
    let mut pairs = AsmParser::parse(Rule::program, source).map_err(|e| {
        let line = match e.line_col {
            pest::error::LineColLocation::Pos((l, _)) => l,
            pest::error::LineColLocation::Span((l, _), _) => l,
        };
        SimError::UnknownMnemonic {
            line,
            token: e.to_string(),
        }
    })?;

    let program_pair = pairs.next().expect("program rule always produced");

    let mut raw_instructions = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut pending_labels: Vec<String> = Vec::new();

    for line_pair in program_pair.into_inner() {
        if line_pair.as_rule() != Rule::line {
            continue; // EOI
        }
        let line_no = line_pair.as_span().start_pos().line_col().0;
        let mut label = None;
        let mut statement = None;
        for part in line_pair.into_inner() {
            match part.as_rule() {
                Rule::label => {
                    let text = part.as_str();
                    label = Some(text[..text.len() - 1].to_string());
                }
                Rule::statement => statement = Some(part),
                _ => {}
            }
        }

        if let Some(name) = label {
            pending_labels.push(name);
        }

        let Some(statement) = statement else {
            continue;
        };

        let mut inner = statement.into_inner();
        let opcode_pair = inner.next().expect("statement has an opcode");
        let mnemonic = opcode_pair.as_str();
        let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| SimError::UnknownMnemonic {
            line: line_no,
            token: mnemonic.to_string(),
        })?;

        let mut operands = Vec::new();
        for operand_pair in inner {
            operands.push(parse_operand(operand_pair)?);
        }

        let index = raw_instructions.len();
        for name in pending_labels.drain(..) {
            labels.insert(name, index);
        }

        raw_instructions.push(RawInst {
            opcode,
            operands,
            line_no,
        });
    }
    for name in pending_labels.drain(..) {
        labels.insert(name, raw_instructions.len());
    }

    let mut instructions = Vec::with_capacity(raw_instructions.len());
    for (index, raw) in raw_instructions.iter().enumerate() {
        instructions.push(resolve(raw, index, &labels)?);
    }
    Ok(instructions)
}

fn resolve(raw: &RawInst, index: usize, labels: &HashMap<String, usize>) -> Result<Instruction, SimError> {
    let line = raw.line_no;
    let ops = &raw.operands;
    use Opcode::*;

    let branch_imm = |target: &str| -> Result<u32, SimError> {
        let target_idx = *labels
            .get(target)
            .ok_or_else(|| SimError::UnknownMnemonic {
                line,
                token: target.to_string(),
            })? as i64;
        let delta = (target_idx - index as i64 - 1) * 4;
        Ok(delta as i32 as u32)
    };

    let inst = match raw.opcode {
        Add | Sub | Xor | Or | And | Mult | Div | Adds | Subs | Mults | Divs => {
            let (dest, dest_float) = as_reg(&ops[0], line)?;
            let (src1, src1_float) = as_reg(&ops[1], line)?;
            let (src2, src2_float) = as_reg(&ops[2], line)?;
            Instruction {
                opcode: raw.opcode,
                dest: Some(dest),
                src1: Some(src1),
                src2: Some(src2),
                imm: 0,
                dest_float,
                src1_float,
                src2_float,
                is_stall: false,
            }
        }
        Addi | Subi | Xori | Ori | Andi => {
            let (dest, dest_float) = as_reg(&ops[0], line)?;
            let (src1, src1_float) = as_reg(&ops[1], line)?;
            let imm = as_num(&ops[2]) as i32 as u32;
            Instruction {
                opcode: raw.opcode,
                dest: Some(dest),
                src1: Some(src1),
                src2: None,
                imm,
                dest_float,
                src1_float,
                src2_float: false,
                is_stall: false,
            }
        }
        Beqz | Bnez | Bltz | Bgtz | Blez | Bgez => {
            let (src1, src1_float) = as_reg(&ops[0], line)?;
            let label = as_label(&ops[1], line)?;
            Instruction {
                opcode: raw.opcode,
                dest: None,
                src1: Some(src1),
                src2: None,
                imm: branch_imm(&label)?,
                dest_float: false,
                src1_float,
                src2_float: false,
                is_stall: false,
            }
        }
        Jump => {
            let label = as_label(&ops[0], line)?;
            Instruction {
                opcode: Jump,
                dest: None,
                src1: None,
                src2: None,
                imm: branch_imm(&label)?,
                dest_float: false,
                src1_float: false,
                src2_float: false,
                is_stall: false,
            }
        }
        Lw | Lws => {
            let (dest, dest_float) = as_reg(&ops[0], line)?;
            let (offset, src1, src1_float) = as_addr(&ops[1], line)?;
            Instruction {
                opcode: raw.opcode,
                dest: Some(dest),
                src1: Some(src1),
                src2: None,
                imm: offset as i32 as u32,
                dest_float,
                src1_float,
                src2_float: false,
                is_stall: false,
            }
        }
        Sw | Sws => {
            let (src2, src2_float) = as_reg(&ops[0], line)?;
            let (offset, src1, src1_float) = as_addr(&ops[1], line)?;
            Instruction {
                opcode: raw.opcode,
                dest: None,
                src1: Some(src1),
                src2: Some(src2),
                imm: offset as i32 as u32,
                dest_float: false,
                src1_float,
                src2_float,
                is_stall: false,
            }
        }
        Eop => Instruction {
            opcode: Eop,
            ..Instruction::nop()
        },
        Nop => Instruction::nop(),
    };
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_rrr_form() {
        let prog = assemble("ADD R3 R1 R2\nEOP\n").unwrap();
        assert_eq!(prog[0].opcode, Opcode::Add);
        assert_eq!(prog[0].dest, Some(3));
        assert_eq!(prog[0].src1, Some(1));
        assert_eq!(prog[0].src2, Some(2));
        assert_eq!(prog[1].opcode, Opcode::Eop);
    }

    #[test]
    fn assembles_immediate_hex_and_decimal() {
        let prog = assemble("ADDI R1 R0 5\nADDI R2 R0 0x10\nEOP\n").unwrap();
        assert_eq!(prog[0].imm, 5);
        assert_eq!(prog[1].imm, 16);
    }

    #[test]
    fn resolves_forward_label_branch() {
        let src = "ADDI R1 R0 1\nBNEZ R1 L\nADDI R2 R0 99\nL: ADDI R3 R0 7\nEOP\n";
        let prog = assemble(src).unwrap();
        // branch at index 1, target index 3 => (3-1-1)*4 = 4
        assert_eq!(prog[1].imm, 4);
    }

    #[test]
    fn assembles_load_store_addressing() {
        let prog = assemble("LW R1 4(R2)\nSW R1 -4(R2)\nEOP\n").unwrap();
        assert_eq!(prog[0].opcode, Opcode::Lw);
        assert_eq!(prog[0].dest, Some(1));
        assert_eq!(prog[0].src1, Some(2));
        assert_eq!(prog[0].imm, 4);
        assert_eq!(prog[1].opcode, Opcode::Sw);
        assert_eq!(prog[1].src2, Some(1));
        assert_eq!(prog[1].imm, (-4i32) as u32);
    }

    #[test]
    fn rejects_unknown_mnemonic() {
        let err = assemble("FROB R1 R2 R3\nEOP\n").unwrap_err();
        assert!(matches!(err, SimError::UnknownMnemonic { .. }));
    }

    #[test]
    fn rejects_bad_register_prefix() {
        let err = assemble("ADD X1 R2 R3\nEOP\n").unwrap_err();
        assert!(matches!(err, SimError::UnknownRegisterPrefix { .. }));
    }

    #[test]
    fn fp_register_prefix_selects_float_bank() {
        let prog = assemble("ADDS F1 F2 F3\nEOP\n").unwrap();
        assert!(prog[0].dest_float);
        assert!(prog[0].src1_float);
        assert!(prog[0].src2_float);
    }
}
