use clap::Parser;
use matcha::machine::Machine;
use std::fs;
use std::path::PathBuf;
use std::process;

/// Headless runner: executes a ROM image on the CPU core and dumps the
/// final machine state.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the ROM image to execute.
    rom: PathBuf,

    /// Maximum number of instructions to execute.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,

    /// Disassemble each instruction before executing it (very verbose).
    #[arg(long)]
    trace: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let rom_data = match fs::read(&args.rom) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read ROM '{}': {}", args.rom.display(), e);
            process::exit(1);
        }
    };
    log::info!("Loaded {} ({} bytes)", args.rom.display(), rom_data.len());

    let mut machine = Machine::new(&rom_data);

    let mut steps: u64 = 0;
    while steps < args.max_steps {
        if args.trace {
            let pc = machine.cpu.pc();
            let (mnemonic, _) = machine.cpu.disassemble_instruction(pc, &machine.bus);
            log::info!("{:#06X}: {}", pc, mnemonic);
        }
        if let Err(e) = machine.step() {
            eprintln!("{}", e);
            eprintln!("{}", machine.cpu);
            process::exit(1);
        }
        steps += 1;
    }

    println!(
        "Executed {} instructions ({} machine cycles)",
        steps,
        machine.cpu.total_cycles()
    );
    println!("{}", machine.cpu);
}
