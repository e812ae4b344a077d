//! Hazard detection, invoked from the ID stage.
//!
//! Checks run in a fixed order (RAW, latency collision, WAW, structural,
//! control) and the first one that fires is the one that stalls; see
//! SPEC_FULL.md §4.3.

use crate::funit::{FuPools, UnitKind};
use crate::isa::{Instruction, Opcode};
use crate::regfile::Registers;

/// True if either declared source register of `inst` is currently busy.
pub fn raw_hazard(inst: &Instruction, regs: &Registers) -> bool {
    if let Some(src1) = inst.src1 {
        if regs.is_busy(src1, inst.src1_float) {
            return true;
        }
    }
    if let Some(src2) = inst.src2 {
        if regs.is_busy(src2, inst.src2_float) {
            return true;
        }
    }
    false
}

/// True if `inst`'s nominal EX latency collides with some occupied
/// lane's remaining latency, which would cause two completions on the
/// same cycle (FP variant only).
pub fn latency_collision(inst: &Instruction, pools: &FuPools) -> bool {
    let unit = inst.opcode.unit_kind();
    let latency = pools.pool(unit).exe_latency();
    pools.pool(unit).has_latency_collision(latency)
}

/// True if some occupied lane — in any functional unit, not just the
/// one `inst` is about to issue into — targets the same destination
/// register as `inst` and would not retire before `inst` completes
/// (FP variant only). A conflict can span units: a multiply in flight
/// still threatens an add's destination register.
pub fn waw_hazard(inst: &Instruction, pools: &FuPools) -> bool {
    let Some(dest) = inst.dest else {
        return false;
    };
    let latency = pools.pool(inst.opcode.unit_kind()).exe_latency();
    if latency == 0 {
        return false;
    }
    UnitKind::ALL.iter().any(|&unit| {
        pools.pool(unit).lanes.iter().any(|lane| {
            !lane.is_free()
                && lane.instruction.dest == Some(dest)
                && lane.instruction.dest_float == inst.dest_float
                && lane.remaining >= latency
        })
    })
}

/// True if the target functional-unit pool has no free lane (FP variant
/// only). Distinct from a configuration error: a pool with zero lanes
/// configured at all is `NoFunctionalUnit`, checked separately by the
/// caller before this runs.
pub fn structural_hazard(inst: &Instruction, pools: &FuPools) -> bool {
    let unit = inst.opcode.unit_kind();
    pools.pool(unit).free_lane().is_none()
}

/// True if an already-issued branch has not yet cleared EX (integer
/// variant) or some functional-unit lane (FP variant). Does *not* look
/// at the incoming ID instruction itself — a branch that is only now
/// being decoded is free to issue; it's instructions fetched *behind*
/// it that must wait. See SPEC_FULL.md §4.3 and DESIGN.md.
pub fn downstream_branch_pending(ex_instruction: &Instruction, pools: Option<&FuPools>) -> bool {
    if ex_instruction.opcode.is_branch() {
        return true;
    }
    if let Some(pools) = pools {
        for unit in UnitKind::ALL {
            if pools
                .pool(unit)
                .lanes
                .iter()
                .any(|l| !l.is_free() && l.instruction.opcode.is_branch())
            {
                return true;
            }
        }
    }
    false
}

/// Maps an opcode to the functional-unit class that has zero lanes
/// configured, if any — a configuration error rather than an ordinary
/// stall.
pub fn missing_unit(opcode: Opcode, pools: &FuPools) -> Option<UnitKind> {
    let unit = opcode.unit_kind();
    if pools.pool(unit).lanes.is_empty() {
        Some(unit)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Opcode;

    fn reg_inst(opcode: Opcode, dest: u32, src1: u32, src2: u32) -> Instruction {
        Instruction {
            opcode,
            dest: Some(dest),
            src1: Some(src1),
            src2: Some(src2),
            imm: 0,
            dest_float: false,
            src1_float: false,
            src2_float: false,
            is_stall: false,
        }
    }

    #[test]
    fn raw_detects_busy_source() {
        let mut regs = Registers::default();
        regs.claim(1, false);
        let inst = reg_inst(Opcode::Add, 3, 1, 2);
        assert!(raw_hazard(&inst, &regs));
    }

    #[test]
    fn raw_ignores_free_sources() {
        let regs = Registers::default();
        let inst = reg_inst(Opcode::Add, 3, 1, 2);
        assert!(!raw_hazard(&inst, &regs));
    }

    #[test]
    fn downstream_pending_detects_branch_in_ex() {
        let mut ex = Instruction::nop();
        ex.opcode = Opcode::Beqz;
        assert!(downstream_branch_pending(&ex, None));
    }
}
