//! Functional-unit pools for the floating-point variant's EX stage.
//!
//! Each pool is a set of lanes of uniform configured latency. A lane
//! holds at most one in-flight instruction plus a countdown; it is free
//! once the countdown reaches zero. `captured_b`/`captured_npc` freeze
//! the store-data and branch-base operands at issue time, since the EX
//! stage recomputes `src1`/`src2` register reads at *completion* time
//! but must not re-read `B`/`NPC` (they may have been overwritten by a
//! later instruction's write-back by the time this lane completes).

use crate::isa::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Integer,
    Adder,
    Multiplier,
    Divider,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::Integer,
        UnitKind::Adder,
        UnitKind::Multiplier,
        UnitKind::Divider,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::Integer => "INTEGER",
            UnitKind::Adder => "ADDER",
            UnitKind::Multiplier => "MULTIPLIER",
            UnitKind::Divider => "DIVIDER",
        }
    }

    fn index(&self) -> usize {
        match self {
            UnitKind::Integer => 0,
            UnitKind::Adder => 1,
            UnitKind::Multiplier => 2,
            UnitKind::Divider => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lane {
    pub instruction: Instruction,
    pub remaining: u32,
    pub captured_b: u32,
    pub captured_npc: u32,
}

impl Lane {
    fn idle() -> Self {
        Lane {
            instruction: Instruction::bubble(),
            remaining: 0,
            captured_b: 0,
            captured_npc: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pool {
    /// Configured latency, as supplied to `init_exec_unit` (*not*
    /// including the `+1` that `exe_latency` adds per issue).
    pub nominal_latency: u32,
    pub lanes: Vec<Lane>,
}

impl Pool {
    /// The actual countdown a freshly issued instruction receives: the
    /// configured latency plus one. This matches the reference model's
    /// `exLatency`, which is where the `+1` genuinely lives (not hidden
    /// inside pool initialization — see DESIGN.md).
    pub fn exe_latency(&self) -> u32 {
        self.nominal_latency + 1
    }

    pub fn free_lane(&self) -> Option<usize> {
        self.lanes.iter().position(Lane::is_free)
    }

    /// True if some occupied lane's remaining latency exactly equals
    /// `latency` — the EX-completion collision check used by ID.
    pub fn has_latency_collision(&self, latency: u32) -> bool {
        latency > 0 && self.lanes.iter().any(|l| !l.is_free() && l.remaining == latency)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FuPools {
    pools: [Pool; 4],
}

impl FuPools {
    pub fn init_unit(&mut self, unit: UnitKind, latency: u32, instances: u32) {
        assert!(latency > 0, "impractical latency {latency}");
        assert!(instances > 0, "unsupported instance count {instances}");
        let pool = &mut self.pools[unit.index()];
        pool.nominal_latency = latency;
        pool.lanes
            .extend((0..instances).map(|_| Lane::idle()));
    }

    pub fn pool(&self, unit: UnitKind) -> &Pool {
        &self.pools[unit.index()]
    }

    pub fn pool_mut(&mut self, unit: UnitKind) -> &mut Pool {
        &mut self.pools[unit.index()]
    }

    /// The largest remaining countdown among lanes *currently in flight*,
    /// across every unit — 0 if nothing is occupied. Used to size an
    /// EOP's drain latency; a configured-but-idle pool must not inflate
    /// this (an unused Divider lane shouldn't delay EOP draining).
    pub fn max_exe_latency(&self) -> u32 {
        self.pools
            .iter()
            .flat_map(|p| p.lanes.iter())
            .filter(|l| !l.is_free())
            .map(|l| l.remaining)
            .max()
            .unwrap_or(0)
    }

    pub fn reset(&mut self) {
        for pool in &mut self.pools {
            for lane in &mut pool.lanes {
                *lane = Lane::idle();
            }
        }
    }

    /// Decrement every occupied lane by one cycle. Returns the indices
    /// (unit, lane) of lanes that transitioned to zero this cycle.
    pub fn tick(&mut self) -> Vec<(UnitKind, usize)> {
        let mut completed = Vec::new();
        for unit in UnitKind::ALL {
            let pool = &mut self.pools[unit.index()];
            for (i, lane) in pool.lanes.iter_mut().enumerate() {
                if lane.remaining > 0 {
                    lane.remaining -= 1;
                    if lane.remaining == 0 {
                        completed.push((unit, i));
                    }
                }
            }
        }
        completed
    }

    pub fn issue(&mut self, unit: UnitKind, lane_idx: usize, instruction: Instruction, latency: u32, b: u32, npc: u32) {
        let pool = &mut self.pools[unit.index()];
        pool.lanes[lane_idx] = Lane {
            instruction,
            remaining: latency,
            captured_b: b,
            captured_npc: npc,
        };
    }

    pub fn lane(&self, unit: UnitKind, idx: usize) -> &Lane {
        &self.pools[unit.index()].lanes[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Opcode;

    #[test]
    fn exe_latency_is_configured_plus_one() {
        let mut pools = FuPools::default();
        pools.init_unit(UnitKind::Multiplier, 3, 1);
        assert_eq!(pools.pool(UnitKind::Multiplier).exe_latency(), 4);
    }

    #[test]
    fn at_most_one_completion_per_cycle() {
        let mut pools = FuPools::default();
        pools.init_unit(UnitKind::Adder, 2, 1);
        let lat = pools.pool(UnitKind::Adder).exe_latency();
        let idx = pools.pool(UnitKind::Adder).free_lane().unwrap();
        let mut inst = Instruction::nop();
        inst.opcode = Opcode::Adds;
        pools.issue(UnitKind::Adder, idx, inst, lat, 0, 0);
        let c1 = pools.tick();
        assert!(c1.is_empty());
        let c2 = pools.tick();
        assert_eq!(c2.len(), 1);
    }

    #[test]
    fn structural_hazard_when_no_free_lane() {
        let mut pools = FuPools::default();
        pools.init_unit(UnitKind::Multiplier, 3, 1);
        let lat = pools.pool(UnitKind::Multiplier).exe_latency();
        let idx = pools.pool(UnitKind::Multiplier).free_lane().unwrap();
        pools.issue(UnitKind::Multiplier, idx, Instruction::nop(), lat, 0, 0);
        assert!(pools.pool(UnitKind::Multiplier).free_lane().is_none());
    }
}
