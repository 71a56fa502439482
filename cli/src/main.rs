#![deny(unsafe_code)]

use std::error::Error;
use std::ffi::{OsStr, OsString};
use std::fmt::{self, Display, Formatter};
use std::fs::OpenOptions;
use std::io::{BufReader, Read};

use clap::ArgAction::{Append, Set, SetTrue};
use clap::Parser;
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use base::prelude::*;
use cpu::{
    resolve_operand_address, Machine, MachineConfiguration, MemorySize, MemoryUnit, RunOutcome,
};

const ABOUT: &str = "Run a memory image on the emulated 16-bit minicomputer";

/// Emulator for a 16-bit one's-complement minicomputer
#[derive(Parser, Debug)]
#[clap(version, about=ABOUT, long_about = None)]
struct Cli {
    /// File containing the memory image (big-endian 16-bit words)
    #[clap(action=Set)]
    image: OsString,

    /// Address (hex) at which the image is loaded
    #[clap(long, default_value = "0", value_parser = parse_hex)]
    load_address: u16,

    /// Address (hex) at which execution starts; defaults to the load address
    #[clap(long, value_parser = parse_hex)]
    start: Option<u16>,

    /// Memory size: 4K, 8K, 16K, 32K or 64K
    #[clap(long, default_value = "32K", value_parser = parse_memory_size)]
    memory: MemorySize,

    /// Use 64K addressing mode (16-bit program counter, single-level indirection)
    #[clap(long, action=SetTrue)]
    addr64k: bool,

    /// Implement the enhanced instruction set
    #[clap(long, action=SetTrue)]
    enhanced: bool,

    /// Enable character addressing (needs --enhanced)
    #[clap(long, action=SetTrue)]
    character_addressing: bool,

    /// Turn the protect switch on
    #[clap(long, action=SetTrue)]
    protect: bool,

    /// Set the protect bits of an address range, given as FIRST-LAST in hex
    #[clap(long, action=Append, value_parser = parse_range)]
    protect_range: Vec<(u16, u16)>,

    /// Set the selective stop switch
    #[clap(long, action=SetTrue)]
    selective_stop: bool,

    /// Set the selective skip switch
    #[clap(long, action=SetTrue)]
    selective_skip: bool,

    /// Stop when a device rejects an I/O instruction
    #[clap(long, action=SetTrue)]
    stop_on_reject: bool,

    /// Give up after this many steps
    #[clap(long, default_value_t = 1_000_000)]
    max_instructions: u64,

    /// Stop before executing the instruction at this address (hex)
    #[clap(long, action=Append, value_parser = parse_hex)]
    breakpoint: Vec<u16>,

    /// Print the final machine status as JSON
    #[clap(long, action=SetTrue)]
    json: bool,

    /// List the loaded image as instructions instead of running it
    #[clap(long, action=SetTrue)]
    disassemble: bool,
}

fn parse_hex(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("'{s}' is not a 16-bit hex number: {e}"))
}

fn parse_range(s: &str) -> Result<(u16, u16), String> {
    match s.split_once('-') {
        Some((first, last)) => {
            let (first, last) = (parse_hex(first)?, parse_hex(last)?);
            if first <= last {
                Ok((first, last))
            } else {
                Err(format!("range '{s}' ends before it starts"))
            }
        }
        None => parse_hex(s).map(|address| (address, address)),
    }
}

fn parse_memory_size(s: &str) -> Result<MemorySize, String> {
    let kilowords = s
        .strip_suffix('K')
        .or_else(|| s.strip_suffix('k'))
        .unwrap_or(s);
    kilowords
        .parse::<usize>()
        .ok()
        .and_then(|k| k.checked_mul(1024))
        .and_then(MemorySize::from_words)
        .ok_or_else(|| format!("'{s}' is not a supported memory size (4K, 8K, 16K, 32K or 64K)"))
}

#[derive(Debug)]
enum ImageLoadError {
    ReadFailed(String),
    OddLength(usize),
    TooBig {
        origin: u16,
        words: usize,
        capacity: usize,
    },
}

impl Display for ImageLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ImageLoadError::ReadFailed(message) => f.write_str(message),
            ImageLoadError::OddLength(bytes) => {
                write!(f, "image length {bytes} is not a whole number of 16-bit words")
            }
            ImageLoadError::TooBig {
                origin,
                words,
                capacity,
            } => write!(
                f,
                "{words} words loaded at {origin:#06X} do not fit in a memory of {capacity} words"
            ),
        }
    }
}

impl Error for ImageLoadError {}

fn read_image(file_name: &OsStr) -> Result<Vec<u16>, ImageLoadError> {
    let input_file = OpenOptions::new()
        .read(true)
        .open(file_name)
        .map_err(|e| ImageLoadError::ReadFailed(format!("failed to open image file: {e}")))?;
    let mut bytes: Vec<u8> = Vec::new();
    BufReader::new(input_file)
        .read_to_end(&mut bytes)
        .map_err(|e| ImageLoadError::ReadFailed(format!("failed to read image file: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(ImageLoadError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

fn load_image(mem: &mut MemoryUnit, origin: u16, image: &[u16]) -> Result<(), ImageLoadError> {
    let capacity = mem.size();
    if usize::from(origin) + image.len() > capacity {
        return Err(ImageLoadError::TooBig {
            origin,
            words: image.len(),
            capacity,
        });
    }
    mem.load(origin, image);
    event!(
        Level::INFO,
        "loaded {} words at {origin:#06X}",
        image.len()
    );
    Ok(())
}

fn disassemble(machine: &Machine, origin: u16, words: usize) {
    let config = machine.configuration();
    let mem = machine.memory();
    let end = usize::from(origin) + words;
    let mut pos = usize::from(origin);
    while pos < end {
        let loc = pos as u16;
        let word = mem.read(loc);
        let decoded = decode(word, config.instruction_set);
        let inst = Instruction::from(word);
        let mut length = 1;
        let target = match decoded {
            DecodedInstruction::StorageReference { .. } => {
                length = usize::from(inst.length());
                // Q is not known statically; addresses indexed by Q
                // are shown as if Q were zero.
                match resolve_operand_address(inst, loc, 0, mem, config.addressing) {
                    Ok(resolved) => format!("{:04X}", resolved.address),
                    Err(_) => "loop".to_string(),
                }
            }
            _ => String::new(),
        };
        print!("{loc:04X}|{:<20}|{word:04X}", decoded.to_string());
        if length == 2 {
            print!(" {:04X}", mem.read(loc.wrapping_add(1)));
        } else {
            print!("{:5}", "");
        }
        println!(" {target}");
        pos += length;
    }
}

fn run_emulator() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    // See
    // https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Box::new(e));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let span = span!(Level::ERROR, "emulate", image=?cli.image);
    let _enter = span.enter();

    let config = MachineConfiguration {
        memory: cli.memory,
        addressing: if cli.addr64k {
            AddressingMode::Addr64K
        } else {
            AddressingMode::Addr32K
        },
        instruction_set: if cli.enhanced {
            InstructionSet::Enhanced
        } else {
            InstructionSet::Basic
        },
        character_addressing: cli.character_addressing,
        protect_switch: cli.protect,
        selective_stop: cli.selective_stop,
        selective_skip: cli.selective_skip,
        stop_on_reject: cli.stop_on_reject,
    };
    let mut machine = Machine::new(config)?;
    let image = read_image(&cli.image)?;
    load_image(machine.memory_mut(), cli.load_address, &image)?;

    if cli.disassemble {
        disassemble(&machine, cli.load_address, image.len());
        return Ok(0);
    }

    for (first, last) in cli.protect_range.iter() {
        for address in *first..=*last {
            machine.memory_mut().set_protect_bit(address, true);
        }
        event!(Level::INFO, "protected {first:#06X}-{last:#06X}");
    }
    for address in cli.breakpoint.iter() {
        machine.set_breakpoint(*address);
    }
    machine.registers_mut().p = cli.start.unwrap_or(cli.load_address);

    let exit_code = match machine.run(cli.max_instructions) {
        RunOutcome::Stopped(stop) => {
            println!("stopped: {stop}");
            if stop.kind().is_error() {
                2
            } else {
                0
            }
        }
        RunOutcome::LimitReached => {
            println!(
                "no stop after {} instructions",
                cli.max_instructions
            );
            1
        }
    };
    let regs = machine.registers();
    println!(
        "P={:04X} A={:04X} Q={:04X} M={:04X} OV={} IE={}",
        regs.p,
        regs.a,
        regs.q,
        regs.m,
        u8::from(regs.overflow),
        u8::from(regs.interrupts_enabled)
    );
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&machine.status())?);
    }
    Ok(exit_code)
}

fn main() {
    match run_emulator() {
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
        Ok(code) => {
            std::process::exit(code);
        }
    }
}
