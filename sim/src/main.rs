use anyhow::{Context, Result};
use binutils::clap;
use clap::Parser;
use pipesim::funit::UnitKind;
use pipesim::latch::{SpReg, Stage};
use pipesim::pipeline::Simulator;

/// Cycle-accurate five-stage pipeline simulator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the assembly source file
    input: String,

    /// Run the assembled program to completion instead of just validating it
    #[arg(long)]
    run: bool,

    /// Build the floating-point-extended core instead of the integer-only one
    #[arg(long)]
    fp: bool,

    /// Data memory size in bytes
    #[arg(long, default_value_t = 4096)]
    mem_size: u32,

    /// Data memory access latency, in cycles
    #[arg(long, default_value_t = 1)]
    mem_latency: u32,

    /// Base address the program is assembled and loaded at
    #[arg(long, default_value_t = 0)]
    base_address: u32,

    /// Adder/Multiplier/Divider lane config, e.g. `adder=4x1` (latency=4, 1 lane);
    /// may be repeated. Ignored outside `--fp`.
    #[arg(long = "unit", value_parser = parse_unit_spec)]
    units: Vec<(UnitKind, u32, u32)>,

    /// Print per-cycle trace events
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_unit_spec(s: &str) -> Result<(UnitKind, u32, u32), String> {
    let (name, rest) = s.split_once('=').ok_or("expected NAME=LATENCYxINSTANCES")?;
    let (latency, instances) = rest.split_once('x').ok_or("expected NAME=LATENCYxINSTANCES")?;
    let unit = match name.to_ascii_uppercase().as_str() {
        "INTEGER" => UnitKind::Integer,
        "ADDER" => UnitKind::Adder,
        "MULTIPLIER" => UnitKind::Multiplier,
        "DIVIDER" => UnitKind::Divider,
        other => return Err(format!("unknown functional unit `{other}`")),
    };
    let latency: u32 = latency.parse().map_err(|_| "latency must be a positive integer")?;
    let instances: u32 = instances.parse().map_err(|_| "instances must be a positive integer")?;
    Ok((unit, latency, instances))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        &tracing::Level::TRACE
    } else {
        &tracing::Level::INFO
    };
    binutils::logging_setup(log_level, None::<&std::fs::File>);

    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", &args.input))?;

    let mut sim = if args.fp {
        Simulator::new_fp(args.mem_size, args.mem_latency)
    } else {
        Simulator::new_integer(args.mem_size, args.mem_latency)
    };
    for (unit, latency, instances) in &args.units {
        sim.init_exec_unit(*unit, *latency, *instances);
    }

    sim.load_program(&source, args.base_address)
        .with_context(|| format!("could not assemble `{}`", &args.input))?;

    if !args.run {
        println!("assembled `{}` successfully", &args.input);
        return Ok(());
    }

    sim.run(0).context("simulation aborted")?;

    println!("cycles:               {}", sim.get_clock_cycles());
    println!("instructions executed: {}", sim.get_instructions_executed());
    println!("stalls:                {}", sim.get_stalls());
    println!("IPC:                   {:.3}", sim.get_ipc());
    println!(
        "final PC:              0x{:08x}",
        sim.get_sp_register(Stage::If, SpReg::Pc)
    );
    Ok(())
}
