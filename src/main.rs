//! asip-bridge: load an ASIP extension module and drive its entry points

use std::env;

use anyhow::{anyhow, bail, Context};
use asip_bridge::{AsipBackend, Config};

/// One requested call, in command-line order.
enum Action {
    Unpack(u32),
    Execute32 { op: String, inputs: Vec<u32> },
    Execute64 { op: String, inputs: Vec<u64> },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "--sample-config") {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let config = Config::get();
    let mut machine = config.machine_path.clone();
    let mut actions = Vec::new();

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--machine" => {
                machine = Some(next_value(&mut rest, arg)?.to_string());
            }
            "--unpack" => {
                let opcode = parse_u64(next_value(&mut rest, arg)?)?;
                let opcode = u32::try_from(opcode)
                    .map_err(|_| anyhow!("opcode 0x{:X} does not fit in 32 bits", opcode))?;
                actions.push(Action::Unpack(opcode));
            }
            "--exec32" => {
                let op = next_value(&mut rest, arg)?.to_string();
                let inputs = parse_operands(next_value(&mut rest, arg)?)?
                    .into_iter()
                    .map(|v| u32::try_from(v).map_err(|_| anyhow!("operand 0x{:X} exceeds 32 bits", v)))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                actions.push(Action::Execute32 { op, inputs });
            }
            "--exec64" => {
                let op = next_value(&mut rest, arg)?.to_string();
                let inputs = parse_operands(next_value(&mut rest, arg)?)?;
                actions.push(Action::Execute64 { op, inputs });
            }
            other => bail!("unknown argument '{}' (see --help)", other),
        }
    }

    let asip = asip_bridge::load();
    println!("Bound: {}", asip.module_path());

    if let Some(path) = &machine {
        asip.initialize_machine(path)
            .with_context(|| format!("initializing machine {}", path))?;
        println!("Machine: {}", path);
    }

    for action in actions {
        match action {
            Action::Unpack(opcode) => {
                let text = asip.unpack_instruction(opcode)?;
                println!("0x{:08X}  {}", opcode, text);
            }
            Action::Execute32 { op, inputs } => {
                let result = asip.execute_instruction32(&op, &inputs)?;
                println!("{} {:?} = 0x{:08X}", op, inputs, result);
            }
            Action::Execute64 { op, inputs } => {
                let result = asip.execute_instruction64(&op, &inputs)?;
                println!("{} {:?} = 0x{:016X}", op, inputs, result);
            }
        }
    }

    Ok(())
}

fn next_value<'a>(
    rest: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> anyhow::Result<&'a str> {
    rest.next()
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

/// Parse `0x`-prefixed hex or decimal.
fn parse_u64(text: &str) -> anyhow::Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid number '{}'", text))
}

/// Parse a comma-separated operand list.
fn parse_operands(text: &str) -> anyhow::Result<Vec<u64>> {
    text.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_u64)
        .collect()
}

fn print_usage() {
    println!("Usage: asip-bridge [OPTIONS]");
    println!();
    println!("Loads libopenasip.so, binds its entry points and runs the requested calls.");
    println!();
    println!("Options:");
    println!("  --machine PATH        Initialize the machine description at PATH");
    println!("  --unpack OPCODE       Decode a 32-bit opcode");
    println!("  --exec32 OP A,B,...   Execute OP over 32-bit operands");
    println!("  --exec64 OP A,B,...   Execute OP over 64-bit operands");
    println!("  --sample-config       Print a sample configuration file");
    println!();
    println!("Environment:");
    println!("  OPENASIP_MODULE_DIR   Directory containing libopenasip.so");
    println!("  OPENASIP_MACHINE      Default machine description path");
}
