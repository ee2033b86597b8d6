use std::error::Error;
use std::process;

use log::LevelFilter;
use sim_lib::cpu::CPUPolicy;
use sim_lib::flags::SimArgs;
use sim_lib::memory::ram::RamPolicy;
use sim_lib::run_wrapper::Simulator;
use text_io::try_read;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = SimArgs::from_env_or_exit();

    let level = if args.verbose { LevelFilter::Trace } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let policy = CPUPolicy::from(&args);
    let mut sim = Simulator::make(policy, RamPolicy::default(), args.cache_policy())?;
    sim.load(&args.binary)?;

    if args.step {
        step_loop(&mut sim)?;
    } else {
        sim.run()?;
    }

    println!("{}", sim);
    if policy.history {
        sim.print_history();
    }
    Ok(())
}

/// s or empty: step, r: run to the end, p: print state, q: quit
fn step_loop(sim: &mut Simulator) -> Result<(), Box<dyn Error>> {
    while !sim.is_halted() {
        eprint!("[{:>6}] > ", sim.cpu.clock);
        // EOF reads as an empty command
        let command: String = try_read!("{}\n").unwrap_or_default();
        match command.trim() {
            "" | "s" => {
                sim.step()?;
                eprint!("{}", sim.pipeline.describe());
            }
            "r" => {
                sim.run()?;
            }
            "p" => {
                println!("{}", sim);
                eprint!("{}", sim.pipeline.describe());
            }
            "q" => break,
            other => eprintln!("Unknown command '{}': use s, r, p or q", other),
        }
    }
    Ok(())
}
