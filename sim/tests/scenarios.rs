//! End-to-end pipeline scenarios, run against the assembled public API
//! rather than poking at internal stage state.

use pipesim::funit::UnitKind;
use pipesim::latch::UNDEFINED;
use pipesim::pipeline::Simulator;

#[test]
fn empty_program() {
    let mut sim = Simulator::new_integer(1024, 0);
    sim.load_program("EOP\n", 0).unwrap();
    sim.run(0).unwrap();
    assert_eq!(sim.get_clock_cycles(), 5);
    assert_eq!(sim.get_instructions_executed(), 0);
    assert_eq!(sim.get_stalls(), 0);
}

#[test]
fn simple_addi_chain() {
    let mut sim = Simulator::new_integer(1024, 0);
    sim.set_int_register(0, 0);
    sim.load_program("ADDI R1 R0 5\nADDI R2 R1 3\nEOP\n", 0).unwrap();
    sim.run(0).unwrap();
    assert_eq!(sim.get_int_register(1), 5);
    assert_eq!(sim.get_int_register(2), 8);
    assert!(sim.get_stalls() >= 1);
    assert_eq!(sim.get_clock_cycles(), 7 + sim.get_stalls());
}

#[test]
fn load_use_hazard() {
    let mut sim = Simulator::new_integer(1024, 2);
    sim.set_int_register(0, 0);
    sim.write_memory(0, 7).unwrap();
    sim.load_program("LW R1 0(R0)\nADD R3 R1 R1\nEOP\n", 0).unwrap();
    sim.run(0).unwrap();
    assert_eq!(sim.get_int_register(3), 14);
    assert!(sim.get_stalls() >= 1);
}

#[test]
fn taken_branch_skips_fall_through() {
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
fn fp_waw_stalls_until_conflicting_completion() {
    // The adder is configured *faster* than the multiplier on purpose: if
    // the WAW hazard across units were not detected, ADDS would complete
    // (and write F1) before MULTS does, leaving F1 holding the multiply's
    // result instead of the add's.
    let mut sim = Simulator::new_fp(1024, 0);
    sim.init_exec_unit(UnitKind::Adder, 1, 1);
    sim.init_exec_unit(UnitKind::Multiplier, 4, 1);
    sim.set_fp_register(2, 2.0);
    sim.set_fp_register(3, 3.0);
    sim.set_fp_register(4, 10.0);
    sim.set_fp_register(5, 1.0);
    sim.load_program("MULTS F1 F2 F3\nADDS F1 F4 F5\nEOP\n", 0).unwrap();
    sim.run(0).unwrap();
    assert_eq!(sim.get_fp_register(1), 11.0);
    assert!(sim.get_stalls() >= 1);
}

#[test]
fn fp_structural_hazard_stalls_for_the_lane_latency() {
    let mut sim = Simulator::new_fp(1024, 0);
    sim.init_exec_unit(UnitKind::Multiplier, 3, 1);
    sim.load_program("MULTS F1 F2 F3\nMULTS F4 F5 F6\nEOP\n", 0).unwrap();
    sim.run(0).unwrap();
    assert_eq!(sim.get_stalls(), 3);
}

#[test]
fn memory_round_trip() {
    let mut sim = Simulator::new_integer(1024, 0);
    sim.write_memory(16, 0xDEAD_BEEF).unwrap();
    assert_eq!(sim.read_memory(16).unwrap(), 0xDEAD_BEEF);
}

#[test]
fn rejects_unassembled_label_reference() {
    let mut sim = Simulator::new_integer(1024, 0);
    let err = sim.load_program("BNEZ R1 nowhere\nEOP\n", 0).unwrap_err();
    assert!(matches!(err, pipesim::error::SimError::UnknownMnemonic { .. }));
}

#[test]
fn reports_missing_functional_unit() {
    let mut sim = Simulator::new_fp(1024, 0);
    // no MULTIPLIER configured
    sim.load_program("MULTS F1 F2 F3\nEOP\n", 0).unwrap();
    let err = sim.run(0).unwrap_err();
    assert!(matches!(err, pipesim::error::SimError::NoFunctionalUnit { .. }));
}
