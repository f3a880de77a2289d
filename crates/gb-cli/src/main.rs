//! GB CLI - Command line runner and debugger for the Game Boy core

mod debugger;

use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use gb_core::cpu::Cpu;
use gb_core::mmu::Mmu;
use log::{info, LevelFilter};

/// Game Boy emulator CLI
#[derive(Parser, Debug)]
#[command(name = "gb-cli")]
#[command(about = "A Game Boy CPU emulator CLI", long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run from reset until an unknown opcode is reached
    Run {
        #[command(flatten)]
        machine: MachineArgs,

        /// Stop after this many instructions
        #[arg(short, long)]
        max_steps: Option<u64>,
    },
    /// Step through the program interactively
    Debug {
        #[command(flatten)]
        machine: MachineArgs,
    },
}

#[derive(clap::Args, Debug)]
struct MachineArgs {
    /// Path to the 256-byte DMG boot ROM
    #[arg(short, long)]
    boot_rom: PathBuf,

    /// Path to a cartridge image
    rom: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose)?;

    match args.command {
        Command::Run { machine, max_steps } => run(&machine, max_steps),
        Command::Debug { machine } => {
            let mut mmu = build_mmu(&machine)?;
            let mut cpu = Cpu::attach_mmu(&mut mmu);
            debugger::run(&mut cpu, io::stdin().lock(), io::stdout().lock())
                .context("debugger I/O failed")
        }
    }
}

fn setup_logger(verbosity: u8) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::BrightBlack);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .context("failed to install logger")
}

fn build_mmu(machine: &MachineArgs) -> anyhow::Result<Mmu> {
    let mut mmu = Mmu::from_boot_rom_file(&machine.boot_rom).with_context(|| {
        format!("failed to load boot ROM from {}", machine.boot_rom.display())
    })?;

    if let Some(rom) = &machine.rom {
        mmu.load_rom(rom)
            .with_context(|| format!("failed to load ROM from {}", rom.display()))?;
        match mmu.cartridge().header() {
            Some(header) => info!("Loaded cartridge \"{}\"", header.title),
            None => info!("Loaded headerless image {}", rom.display()),
        }
    }
    Ok(mmu)
}

fn run(machine: &MachineArgs, max_steps: Option<u64>) -> anyhow::Result<()> {
    let mut mmu = build_mmu(machine)?;
    let mut cpu = Cpu::attach_mmu(&mut mmu);

    let result = match max_steps {
        Some(steps) => cpu.run_for(steps).map(|cycles| {
            println!("Executed {} steps ({} cycles)", steps, cycles);
        }),
        None => cpu.run(),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }

    println!("{}", cpu.registers());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_boot_rom_context() {
        let machine = MachineArgs {
            boot_rom: PathBuf::from("/nonexistent/dmg_boot.bin"),
            rom: None,
        };
        let err = build_mmu(&machine).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to load boot ROM from /nonexistent/dmg_boot.bin"
        );
    }
}
