//! Line-oriented debugger REPL

use std::io::{self, BufRead, Write};

use gb_core::cpu::{Bus, Cpu};
use gb_core::opcodes::EXTENDED_PREFIX;
use gb_core::types::Address;

const PROMPT: &str = ">> ";

/// A parsed debugger command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Execute this many instructions
    Next(u64),
    Show,
    Mem(Address),
    Reset,
    Quit,
    Unknown,
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Command::Unknown;
        };
        let arg = words.next();

        match (name, arg) {
            ("n" | "next", None) => Command::Next(1),
            ("n" | "next", Some(count)) => match count.parse() {
                Ok(count) => Command::Next(count),
                Err(_) => Command::Unknown,
            },
            ("s" | "show", None) => Command::Show,
            ("m" | "mem", Some(address)) => match parse_address(address) {
                Some(address) => Command::Mem(address),
                None => Command::Unknown,
            },
            ("r" | "reset", None) => Command::Reset,
            ("q" | "quit", None) => Command::Quit,
            _ => Command::Unknown,
        }
    }
}

/// Accepts `0x1234`, `$1234` or bare hex
fn parse_address(text: &str) -> Option<Address> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix('$'))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok().map(Address)
}

/// Drive `cpu` from commands read on `input` until `quit` or end of input.
///
/// Decode errors are reported and leave the CPU where it was.
pub fn run<B, R, W>(cpu: &mut Cpu<'_, B>, input: R, mut output: W) -> io::Result<()>
where
    B: Bus,
    R: BufRead,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let Some(line) = lines.next() else {
            writeln!(output)?;
            return Ok(());
        };

        match Command::parse(&line?) {
            Command::Next(count) => next(cpu, count, &mut output)?,
            Command::Show => writeln!(output, "{}", cpu.registers())?,
            Command::Mem(address) => writeln!(
                output,
                "{}: 0x{:02x}",
                address,
                cpu.mmu().read_byte(address)
            )?,
            Command::Reset => cpu.reset(),
            Command::Quit => return Ok(()),
            Command::Unknown => writeln!(output, "Unknown command.")?,
        }
    }
}

fn next<B: Bus, W: Write>(cpu: &mut Cpu<'_, B>, count: u64, output: &mut W) -> io::Result<()> {
    for _ in 0..count {
        let (first, second) = cpu.fetch_next_opcode();
        write!(output, "Executing opcode: {:02x}", first)?;
        if first == EXTENDED_PREFIX {
            write!(output, " -- Extended opcode: {:02x}", second)?;
        }
        writeln!(output)?;

        if let Err(e) = cpu.execute(first, second) {
            writeln!(output, "{}", e)?;
            break;
        }
    }
    Ok(())
}
