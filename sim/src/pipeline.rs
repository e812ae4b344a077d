//! The five-stage pipeline driver.
//!
//! Stages run in reverse pipeline order within a single `step()` call —
//! WB, then MEM, then EX, then ID, then IF — so that each stage always
//! reads the latch content its upstream neighbor produced *last* cycle,
//! and the latch it writes this cycle is safe to overwrite because its
//! own reader already consumed it earlier in the same call. This is the
//! textbook "write at end of cycle" pipeline semantics without keeping
//! a shadow copy of every latch.

use tracing::{debug, trace};

use crate::asm;
use crate::error::{SimError, SimResult};
use crate::funit::{FuPools, UnitKind};
use crate::hazard;
use crate::isa::{Instruction, Opcode};
use crate::latch::{Latch, SpReg, Stage, UNDEFINED};
use crate::memory::DataMemory;
use crate::regfile::Registers;

fn checked_div(x: i32, y: i32) -> i32 {
    if y == 0 {
        0
    } else {
        x.wrapping_div(y)
    }
}

fn alu_binop(opcode: Opcode, a: u32, b: u32) -> u32 {
    if opcode.is_fp_alu() {
        let x = f32::from_bits(a);
        let y = f32::from_bits(b);
        let r = match opcode {
            Opcode::Adds => x + y,
            Opcode::Subs => x - y,
            Opcode::Mults => x * y,
            Opcode::Divs => x / y,
            _ => unreachable!("{opcode:?} is not an FP ALU op"),
        };
        r.to_bits()
    } else {
        let x = a as i32;
        let y = b as i32;
        let r = match opcode {
            Opcode::Add => x.wrapping_add(y),
            Opcode::Sub => x.wrapping_sub(y),
            Opcode::Xor => x ^ y,
            Opcode::Or => x | y,
            Opcode::And => x & y,
            Opcode::Mult => x.wrapping_mul(y),
            Opcode::Div => checked_div(x, y),
            _ => unreachable!("{opcode:?} is not a register-register ALU op"),
        };
        r as u32
    }
}

fn alu_immediate(opcode: Opcode, a: u32, imm: u32) -> u32 {
    let x = a as i32;
    let y = imm as i32;
    let r = match opcode {
        Opcode::Addi => x.wrapping_add(y),
        Opcode::Subi => x.wrapping_sub(y),
        Opcode::Xori => x ^ y,
        Opcode::Ori => x | y,
        Opcode::Andi => x & y,
        _ => unreachable!("{opcode:?} is not an immediate ALU op"),
    };
    r as u32
}

fn branch_taken(opcode: Opcode, a: u32) -> bool {
    let x = a as i32;
    match opcode {
        Opcode::Beqz => x == 0,
        Opcode::Bnez => x != 0,
        Opcode::Bltz => x < 0,
        Opcode::Bgtz => x > 0,
        Opcode::Blez => x <= 0,
        Opcode::Bgez => x >= 0,
        _ => unreachable!("{opcode:?} is not a conditional branch"),
    }
}

/// Computes `(ALU_OUTPUT, COND)` for an instruction given its operands.
/// Shared by the integer variant's single-cycle EX and the FP variant's
/// completion path — both need the same arithmetic, just at different
/// points in the lane's lifetime.
fn compute_alu_result(opcode: Opcode, a: u32, b: u32, imm: u32, npc: u32) -> (u32, u32) {
    use Opcode::*;
    match opcode {
        Add | Sub | Xor | Or | And | Mult | Div | Adds | Subs | Mults | Divs => {
            (alu_binop(opcode, a, b), 0)
        }
        Addi | Subi | Xori | Ori | Andi => (alu_immediate(opcode, a, imm), 0),
        Lw | Sw | Lws | Sws => (a.wrapping_add(imm), 0),
        Beqz | Bnez | Bltz | Bgtz | Blez | Bgez => {
            (npc.wrapping_add(imm), if branch_taken(opcode, a) { 1 } else { 0 })
        }
        Jump => (npc.wrapping_add(imm), 1),
        Eop | Nop => (0, 0),
    }
}

/// Cycle-accurate five-stage pipeline. Construct with `new_integer` or
/// `new_fp`, load a program, then `run`.
pub struct Simulator {
    mem: DataMemory,
    regs: Registers,
    fu_pools: Option<FuPools>,
    latches: [Latch; 5],
    program: Vec<Instruction>,
    base_address: u32,
    mem_wait: Option<u32>,
    cycle_count: u64,
    instructions_executed: u64,
    stall_count: u64,
    terminated: bool,
}

impl Simulator {
    pub fn new_integer(mem_size: u32, mem_latency: u32) -> Self {
        let mut sim = Simulator {
            mem: DataMemory::new(mem_size, mem_latency),
            regs: Registers::default(),
            fu_pools: None,
            latches: std::array::from_fn(|_| Latch::bubble()),
            program: Vec::new(),
            base_address: 0,
            mem_wait: None,
            cycle_count: 0,
            instructions_executed: 0,
            stall_count: 0,
            terminated: false,
        };
        sim.latches[Stage::If.idx()].set(SpReg::Pc, 0);
        sim
    }

    /// The FP variant routes *every* opcode through a functional-unit
    /// pool, including plain integer ops and bubbles (all `UnitKind::Integer`).
    /// A single latency-0 lane is always present so a freshly constructed
    /// FP simulator behaves sensibly before any `init_exec_unit` call.
    pub fn new_fp(mem_size: u32, mem_latency: u32) -> Self {
        let mut sim = Simulator::new_integer(mem_size, mem_latency);
        let mut pools = FuPools::default();
        pools.init_unit(UnitKind::Integer, 0, 1);
        sim.fu_pools = Some(pools);
        sim
    }

    pub fn init_exec_unit(&mut self, unit: UnitKind, latency: u32, instances: u32) {
        self.fu_pools
            .get_or_insert_with(FuPools::default)
            .init_unit(unit, latency, instances);
    }

    /// Assembles `source` and loads it at `base_address`. Only pipeline
    /// state (latches, FU occupancy, counters, IF.PC) is cleared — data
    /// memory and the register banks are left alone, so a test fixture's
    /// `write_memory`/`set_int_register`/`set_fp_register` calls made
    /// before `load_program` are still in effect when `run` starts. Use
    /// `reset` for a full wipe.
    pub fn load_program(&mut self, source: &str, base_address: u32) -> SimResult<()> {
        let instructions = asm::assemble(source)?;
        self.program = instructions;
        self.base_address = base_address;
        self.reset_pipeline_state();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.mem.reset();
        self.regs.reset();
        self.reset_pipeline_state();
    }

    fn reset_pipeline_state(&mut self) {
        if let Some(pools) = &mut self.fu_pools {
            pools.reset();
        }
        for latch in &mut self.latches {
            *latch = Latch::bubble();
        }
        self.latches[Stage::If.idx()].set(SpReg::Pc, self.base_address);
        self.mem_wait = None;
        self.cycle_count = 0;
        self.instructions_executed = 0;
        self.stall_count = 0;
        self.terminated = false;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn run(&mut self, cycles: u64) -> SimResult<()> {
        if cycles == 0 {
            while !self.terminated {
                self.step()?;
            }
        } else {
            for _ in 0..cycles {
                if self.terminated {
                    break;
                }
                self.step()?;
            }
        }
        Ok(())
    }

    pub fn step(&mut self) -> SimResult<()> {
        if self.terminated {
            return Ok(());
        }

        if self.wb_stage() {
            self.terminated = true;
            self.cycle_count += 1;
            debug!(cycle = self.cycle_count, "WB retired EOP, halting");
            return Ok(());
        }

        let redirect_taken = self.latches[Stage::Mem.idx()].get(SpReg::Cond) == 1;
        let redirect_target = self.latches[Stage::Mem.idx()].get(SpReg::AluOutput);

        if self.mem_stage()? {
            self.cycle_count += 1;
            trace!(cycle = self.cycle_count, "MEM busy, upstream stages held");
            return Ok(());
        }

        self.ex_stage()?;
        let stall = self.id_stage()?;
        self.if_stage(stall, redirect_taken, redirect_target)?;

        self.cycle_count += 1;
        trace!(cycle = self.cycle_count, stall, "cycle complete");
        Ok(())
    }

    fn if_stage(&mut self, stall: bool, branch_taken: bool, branch_target: u32) -> SimResult<()> {
        if branch_taken {
            self.latches[Stage::If.idx()].set(SpReg::Pc, branch_target);
        }
        if stall {
            return Ok(());
        }

        let pc = self.latches[Stage::If.idx()].get(SpReg::Pc);
        let index = (pc.wrapping_sub(self.base_address) as i64) / 4;
        if index < 0 || index as usize >= self.program.len() {
            return Err(SimError::InstructionOutOfRange { pc, index });
        }
        let inst = self.program[index as usize].clone();
        let is_eop = inst.is_eop();
        if !is_eop {
            self.instructions_executed += 1;
        }
        let npc = if is_eop { pc } else { pc + 4 };
        if !is_eop {
            self.latches[Stage::If.idx()].set(SpReg::Pc, npc);
        }

        let id_latch = &mut self.latches[Stage::Id.idx()];
        id_latch.instruction = inst;
        id_latch.clear_sp();
        id_latch.set(SpReg::Npc, npc);
        Ok(())
    }

    fn id_stage(&mut self) -> SimResult<bool> {
        let instr = self.latches[Stage::Id.idx()].instruction.clone();
        let npc = self.latches[Stage::Id.idx()].get(SpReg::Npc);

        // A bubble carries no operands and claims no register, but IF must
        // keep holding if a branch/JUMP issued earlier hasn't cleared EX
        // (or, in the FP variant, its functional-unit lane) yet — the
        // branch itself is gone from ID by now (see below), so only this
        // check still knows it's in flight.
        if instr.is_stall {
            let control_pending = hazard::downstream_branch_pending(
                &self.latches[Stage::Ex.idx()].instruction,
                self.fu_pools.as_ref(),
            );
            let ex_latch = &mut self.latches[Stage::Ex.idx()];
            ex_latch.instruction = Instruction::bubble();
            ex_latch.clear_sp();
            ex_latch.set(SpReg::Npc, npc);
            return Ok(control_pending);
        }

        if let Some(pools) = &self.fu_pools {
            if let Some(unit) = hazard::missing_unit(instr.opcode, pools) {
                return Err(SimError::NoFunctionalUnit {
                    opcode: instr.opcode.name().to_string(),
                    unit: unit.name(),
                });
            }
        }

        let mut stalled = hazard::raw_hazard(&instr, &self.regs);
        if !stalled {
            if let Some(pools) = &self.fu_pools {
                stalled = hazard::latency_collision(&instr, pools)
                    || hazard::waw_hazard(&instr, pools)
                    || hazard::structural_hazard(&instr, pools);
            }
        }
        if !stalled
            && hazard::downstream_branch_pending(
                &self.latches[Stage::Ex.idx()].instruction,
                self.fu_pools.as_ref(),
            )
        {
            stalled = true;
        }

        if stalled {
            let ex_latch = &mut self.latches[Stage::Ex.idx()];
            ex_latch.instruction = Instruction::bubble();
            ex_latch.clear_sp();
            if !instr.is_eop() {
                self.stall_count += 1;
            }
            return Ok(true);
        }

        if let Some(dest) = instr.dest {
            self.regs.claim(dest, instr.dest_float);
        }

        let src1 = instr
            .src1
            .map(|r| self.regs.bank(instr.src1_float).read_raw(r))
            .unwrap_or(UNDEFINED);
        let src2 = instr
            .src2
            .map(|r| self.regs.bank(instr.src2_float).read_raw(r))
            .unwrap_or(UNDEFINED);

        let ex_latch = &mut self.latches[Stage::Ex.idx()];
        ex_latch.instruction = instr.clone();
        ex_latch.clear_sp();
        ex_latch.set(SpReg::Npc, npc);
        ex_latch.set(SpReg::A, src1);
        ex_latch.set(SpReg::B, src2);
        ex_latch.set(SpReg::Imm, instr.imm);

        // A branch or EOP occupies ID for exactly one cycle: once it's
        // issued into EX, ID itself must bubble. Otherwise the same
        // instruction would sit in ID unchanged and get redecoded (and
        // reissued into EX) every time EX later clears, oscillating
        // forever instead of ever retiring.
        let is_control = instr.is_eop() || instr.opcode.is_branch();
        if is_control {
            let id_latch = &mut self.latches[Stage::Id.idx()];
            id_latch.instruction = Instruction::bubble();
            id_latch.clear_sp();
        }

        Ok(is_control)
    }

    fn ex_stage(&mut self) -> SimResult<()> {
        if self.fu_pools.is_some() {
            self.ex_fp()
        } else {
            self.ex_integer();
            Ok(())
        }
    }

    fn ex_integer(&mut self) {
        let instr = self.latches[Stage::Ex.idx()].instruction.clone();
        let a = self.latches[Stage::Ex.idx()].get(SpReg::A);
        let b = self.latches[Stage::Ex.idx()].get(SpReg::B);
        let imm = self.latches[Stage::Ex.idx()].get(SpReg::Imm);
        let npc = self.latches[Stage::Ex.idx()].get(SpReg::Npc);

        let (alu_output, cond) = compute_alu_result(instr.opcode, a, b, imm, npc);

        let mem_latch = &mut self.latches[Stage::Mem.idx()];
        mem_latch.instruction = instr;
        mem_latch.clear_sp();
        mem_latch.set(SpReg::AluOutput, alu_output);
        mem_latch.set(SpReg::Cond, cond);
        mem_latch.set(SpReg::B, b);
        mem_latch.set(SpReg::Npc, npc);
        self.mem_wait = None;
    }

    fn ex_fp(&mut self) -> SimResult<()> {
        // Issue before ticking: a lane issued this cycle must take part in
        // this same cycle's decrement, or its dwell in EX would run one
        // cycle longer than `exe_latency()`. EOP's own latency is sized
        // from the pools' pre-issue state, so it doesn't count its own
        // not-yet-issued lane against itself.
        let ex_instr = self.latches[Stage::Ex.idx()].instruction.clone();
        if !ex_instr.is_stall {
            let b = self.latches[Stage::Ex.idx()].get(SpReg::B);
            let npc = self.latches[Stage::Ex.idx()].get(SpReg::Npc);
            let unit = ex_instr.opcode.unit_kind();
            let is_eop = ex_instr.is_eop();
            let pools = self.fu_pools.as_mut().unwrap();
            // An EOP is given enough latency to drain every other
            // in-flight lane before it reaches MEM/WB.
            let latency = if is_eop {
                pools.max_exe_latency() + 1
            } else {
                pools.pool(unit).exe_latency()
            };
            if let Some(free) = pools.pool(unit).free_lane() {
                pools.issue(unit, free, ex_instr, latency, b, npc);
            }
        }

        let completions = self.fu_pools.as_mut().expect("fp variant").tick();
        if completions.len() > 1 {
            return Err(SimError::MultipleCompletions {
                cycle: self.cycle_count,
                count: completions.len(),
            });
        }

        {
            let mem_latch = &mut self.latches[Stage::Mem.idx()];
            mem_latch.instruction = Instruction::bubble();
            mem_latch.clear_sp();
        }

        if let Some((unit, lane_idx)) = completions.into_iter().next() {
            let lane = self.fu_pools.as_ref().unwrap().lane(unit, lane_idx).clone();
            let a = lane
                .instruction
                .src1
                .map(|r| self.regs.bank(lane.instruction.src1_float).read_raw(r))
                .unwrap_or(UNDEFINED);
            let b_operand = lane
                .instruction
                .src2
                .map(|r| self.regs.bank(lane.instruction.src2_float).read_raw(r))
                .unwrap_or(UNDEFINED);
            let (alu_output, cond) =
                compute_alu_result(lane.instruction.opcode, a, b_operand, lane.instruction.imm, lane.captured_npc);

            let mem_latch = &mut self.latches[Stage::Mem.idx()];
            mem_latch.instruction = lane.instruction;
            mem_latch.set(SpReg::AluOutput, alu_output);
            mem_latch.set(SpReg::Cond, cond);
            mem_latch.set(SpReg::B, lane.captured_b);
            mem_latch.set(SpReg::Npc, lane.captured_npc);
        }

        self.mem_wait = None;
        Ok(())
    }

    fn mem_stage(&mut self) -> SimResult<bool> {
        let instr = self.latches[Stage::Mem.idx()].instruction.clone();
        let alu_output = self.latches[Stage::Mem.idx()].get(SpReg::AluOutput);
        let b = self.latches[Stage::Mem.idx()].get(SpReg::B);

        if instr.opcode.is_memory() && !instr.is_stall {
            if self.mem_wait.is_none() {
                self.mem_wait = Some(self.mem.latency());
            }
            let mut countdown = self.mem_wait.unwrap();
            if countdown > 0 {
                countdown -= 1;
            }
            self.mem_wait = Some(countdown);

            if countdown > 0 {
                let wb_latch = &mut self.latches[Stage::Wb.idx()];
                wb_latch.instruction = Instruction::bubble();
                wb_latch.clear_sp();
                self.stall_count += 1;
                return Ok(true);
            }

            self.mem_wait = None;
            let lmd = if instr.opcode.is_load() {
                self.mem.read_word(alu_output)?
            } else {
                self.mem.write_word(alu_output, b)?;
                0
            };

            let wb_latch = &mut self.latches[Stage::Wb.idx()];
            wb_latch.instruction = instr;
            wb_latch.clear_sp();
            wb_latch.set(SpReg::AluOutput, alu_output);
            wb_latch.set(SpReg::Lmd, lmd);
            return Ok(false);
        }

        let wb_latch = &mut self.latches[Stage::Wb.idx()];
        wb_latch.instruction = instr;
        wb_latch.clear_sp();
        wb_latch.set(SpReg::AluOutput, alu_output);
        Ok(false)
    }

    /// Returns `true` when the retired instruction was EOP (the driver
    /// halts on the cycle this happens).
    fn wb_stage(&mut self) -> bool {
        let instr = self.latches[Stage::Wb.idx()].instruction.clone();
        if instr.is_eop() {
            return true;
        }
        if let Some(dest) = instr.dest {
            let source = if instr.opcode.is_load() {
                self.latches[Stage::Wb.idx()].get(SpReg::Lmd)
            } else {
                self.latches[Stage::Wb.idx()].get(SpReg::AluOutput)
            };
            self.regs.bank_mut(instr.dest_float).write_raw(dest, source);
            self.regs.retire(dest, instr.dest_float);
        }
        false
    }

    // --- accessors -------------------------------------------------

    pub fn get_sp_register(&self, stage: Stage, reg: SpReg) -> u32 {
        self.latches[stage.idx()].get(reg)
    }

    pub fn get_int_register(&self, reg: u32) -> u32 {
        self.regs.int.read_raw(reg)
    }

    pub fn set_int_register(&mut self, reg: u32, value: u32) {
        self.regs.int.write_raw(reg, value)
    }

    pub fn get_fp_register(&self, reg: u32) -> f32 {
        self.regs.fp.read_fp(reg)
    }

    pub fn set_fp_register(&mut self, reg: u32, value: f32) {
        self.regs.fp.write_fp(reg, value)
    }

    pub fn get_clock_cycles(&self) -> u64 {
        self.cycle_count
    }

    pub fn get_instructions_executed(&self) -> u64 {
        self.instructions_executed
    }

    pub fn get_stalls(&self) -> u64 {
        self.stall_count
    }

    pub fn get_ipc(&self) -> f64 {
        if self.cycle_count == 0 {
            0.0
        } else {
            self.instructions_executed as f64 / self.cycle_count as f64
        }
    }

    pub fn write_memory(&mut self, address: u32, word: u32) -> SimResult<()> {
        self.mem.write_word(address, word)
    }

    pub fn read_memory(&self, address: u32) -> SimResult<u32> {
        self.mem.read_word(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_halts_after_five_cycles() {
        let mut sim = Simulator::new_integer(1024, 0);
        sim.load_program("EOP\n", 0).unwrap();
        sim.run(0).unwrap();
        assert_eq!(sim.get_clock_cycles(), 5);
        assert_eq!(sim.get_instructions_executed(), 0);
        assert_eq!(sim.get_stalls(), 0);
    }

    #[test]
    fn addi_chain_computes_expected_values_with_raw_stall() {
        let mut sim = Simulator::new_integer(1024, 0);
        sim.set_int_register(0, 0);
        sim.load_program("ADDI R1 R0 5\nADDI R2 R1 3\nEOP\n", 0).unwrap();
        sim.run(0).unwrap();
        assert_eq!(sim.get_int_register(1), 5);
        assert_eq!(sim.get_int_register(2), 8);
        assert!(sim.get_stalls() >= 1);
    }

    #[test]
    fn load_use_round_trips_through_memory_latency() {
        let mut sim = Simulator::new_integer(1024, 2);
        sim.set_int_register(0, 0);
        sim.write_memory(0, 7).unwrap();
        sim.load_program("LW R1 0(R0)\nADD R3 R1 R1\nEOP\n", 0).unwrap();
        sim.run(0).unwrap();
        assert_eq!(sim.get_int_register(3), 14);
        assert!(sim.get_stalls() >= 1);
    }

    #[test]
    fn taken_branch_skips_the_fall_through_instruction() {
        let mut sim = Simulator::new_integer(1024, 0);
        sim.set_int_register(0, 0);
        sim.load_program(
            "ADDI R1 R0 1\nBNEZ R1 L\nADDI R2 R0 99\nL: ADDI R3 R0 7\nEOP\n",
            0,
        )
        .unwrap();
        sim.run(0).unwrap();
        assert_eq!(sim.get_int_register(2), UNDEFINED);
        assert_eq!(sim.get_int_register(3), 7);
    }

    #[test]
    fn fp_structural_hazard_stalls_for_exactly_the_lane_latency() {
        let mut sim = Simulator::new_fp(1024, 0);
        sim.init_exec_unit(UnitKind::Multiplier, 3, 1);
        sim.load_program("MULTS F1 F2 F3\nMULTS F4 F5 F6\nEOP\n", 0).unwrap();
        sim.run(0).unwrap();
        assert_eq!(sim.get_stalls(), 3);
    }
}
