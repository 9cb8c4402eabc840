use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dmgcore::GameBoy;

/// Headless DMG core runner: loads a ROM and steps the machine, optionally
/// tracing register state before every instruction in Gameboy Doctor format.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the ROM image to run.
    rom: PathBuf,

    /// Print a register-state trace line before every non-halted step.
    #[arg(long)]
    trace: bool,

    /// Stop after this many CPU steps. Without it the machine runs until
    /// the process is killed.
    #[arg(long, value_name = "N")]
    max_cycles: Option<u64>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut gb = match GameBoy::initialize(&args.rom) {
        Ok(gb) => gb,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut steps: u64 = 0;
    loop {
        if let Some(max) = args.max_cycles {
            if steps >= max {
                break;
            }
        }

        if args.trace && !gb.is_halted {
            let line = gb.dump();
            log::debug!("{line}");
            println!("{line}");
        }

        gb.step();
        gb.wait();
        steps += 1;
    }

    ExitCode::SUCCESS
}
