//! Instruction representation and opcode metadata.
//!
//! Mirrors `opcode_t`/`instruction_t` from the reference integer and
//! floating-point pipeline models, collapsed into one opcode set since
//! this implementation runs either variant off the same `Instruction`
//! record (the FP-only opcodes are simply unreachable in integer mode).

use crate::funit::UnitKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Lw,
    Sw,
    Lws,
    Sws,
    Add,
    Sub,
    Xor,
    Or,
    And,
    Mult,
    Div,
    Addi,
    Subi,
    Xori,
    Ori,
    Andi,
    Adds,
    Subs,
    Mults,
    Divs,
    Beqz,
    Bnez,
    Bltz,
    Bgtz,
    Blez,
    Bgez,
    Jump,
    Eop,
    Nop,
}

impl Opcode {
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        use Opcode::*;
        Some(match s.to_ascii_uppercase().as_str() {
            "LW" => Lw,
            "SW" => Sw,
            "LWS" => Lws,
            "SWS" => Sws,
            "ADD" => Add,
            "SUB" => Sub,
            "XOR" => Xor,
            "OR" => Or,
            "AND" => And,
            "MULT" => Mult,
            "DIV" => Div,
            "ADDI" => Addi,
            "SUBI" => Subi,
            "XORI" => Xori,
            "ORI" => Ori,
            "ANDI" => Andi,
            "ADDS" => Adds,
            "SUBS" => Subs,
            "MULTS" => Mults,
            "DIVS" => Divs,
            "BEQZ" => Beqz,
            "BNEZ" => Bnez,
            "BLTZ" => Bltz,
            "BGTZ" => Bgtz,
            "BLEZ" => Blez,
            "BGEZ" => Bgez,
            "JUMP" => Jump,
            "EOP" => Eop,
            "NOP" => Nop,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        use Opcode::*;
        match self {
            Lw => "LW",
            Sw => "SW",
            Lws => "LWS",
            Sws => "SWS",
            Add => "ADD",
            Sub => "SUB",
            Xor => "XOR",
            Or => "OR",
            And => "AND",
            Mult => "MULT",
            Div => "DIV",
            Addi => "ADDI",
            Subi => "SUBI",
            Xori => "XORI",
            Ori => "ORI",
            Andi => "ANDI",
            Adds => "ADDS",
            Subs => "SUBS",
            Mults => "MULTS",
            Divs => "DIVS",
            Beqz => "BEQZ",
            Bnez => "BNEZ",
            Bltz => "BLTZ",
            Bgtz => "BGTZ",
            Blez => "BLEZ",
            Bgez => "BGEZ",
            Jump => "JUMP",
            Eop => "EOP",
            Nop => "NOP",
        }
    }

    pub fn is_branch(&self) -> bool {
        use Opcode::*;
        matches!(self, Beqz | Bnez | Bltz | Bgtz | Blez | Bgez | Jump)
    }

    pub fn is_load(&self) -> bool {
        matches!(self, Opcode::Lw | Opcode::Lws)
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Opcode::Sw | Opcode::Sws)
    }

    pub fn is_memory(&self) -> bool {
        self.is_load() || self.is_store()
    }

    pub fn is_fp_alu(&self) -> bool {
        matches!(self, Opcode::Adds | Opcode::Subs | Opcode::Mults | Opcode::Divs)
    }

    pub fn is_immediate_alu(&self) -> bool {
        matches!(
            self,
            Opcode::Addi | Opcode::Subi | Opcode::Xori | Opcode::Ori | Opcode::Andi
        )
    }

    /// Which functional-unit pool this opcode is issued into, in the FP
    /// variant. Integer ops, memory ops, and control flow all share the
    /// INTEGER pool.
    pub fn unit_kind(&self) -> UnitKind {
        use Opcode::*;
        match self {
            Adds | Subs => UnitKind::Adder,
            Mults => UnitKind::Multiplier,
            Divs => UnitKind::Divider,
            _ => UnitKind::Integer,
        }
    }
}

/// A decoded instruction. Immutable once produced by the assembler or by
/// the hazard detector (for synthesized bubbles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Option<u32>,
    pub src1: Option<u32>,
    pub src2: Option<u32>,
    pub imm: u32,
    pub dest_float: bool,
    pub src1_float: bool,
    pub src2_float: bool,
    pub is_stall: bool,
}

impl Instruction {
    /// A synthesized bubble: a stall-flagged NOP with no operands and no
    /// side effects (invariant I3).
    pub fn bubble() -> Self {
        Instruction {
            opcode: Opcode::Nop,
            dest: None,
            src1: None,
            src2: None,
            imm: 0,
            dest_float: false,
            src1_float: false,
            src2_float: false,
            is_stall: true,
        }
    }

    pub fn nop() -> Self {
        Instruction {
            is_stall: false,
            ..Instruction::bubble()
        }
    }

    pub fn is_eop(&self) -> bool {
        self.opcode == Opcode::Eop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_round_trips_case_insensitively() {
        for mnemonic in ["add", "ADD", "Add"] {
            assert_eq!(Opcode::from_mnemonic(mnemonic), Some(Opcode::Add));
        }
        assert_eq!(Opcode::from_mnemonic("frobnicate"), None);
    }

    #[test]
    fn unit_kind_routes_fp_ops_and_defaults_to_integer() {
        assert_eq!(Opcode::Adds.unit_kind(), UnitKind::Adder);
        assert_eq!(Opcode::Mults.unit_kind(), UnitKind::Multiplier);
        assert_eq!(Opcode::Divs.unit_kind(), UnitKind::Divider);
        assert_eq!(Opcode::Add.unit_kind(), UnitKind::Integer);
        assert_eq!(Opcode::Lw.unit_kind(), UnitKind::Integer);
        assert_eq!(Opcode::Beqz.unit_kind(), UnitKind::Integer);
    }

    #[test]
    fn bubble_has_no_operands_and_is_flagged_stalling() {
        let bubble = Instruction::bubble();
        assert!(bubble.is_stall);
        assert_eq!(bubble.dest, None);
        assert_eq!(bubble.src1, None);
        assert_eq!(bubble.src2, None);
    }
}
