use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use log::{error, LevelFilter};

use um_vm::io::RawStdio;
use um_vm::loader::load_program;
use um_vm::{VirtualMachine, VmConfig};

#[derive(Parser)]
#[command(version, about = "Runs a universal-machine program image")]
struct Args {
    /// Program file: big-endian 32-bit instruction words
    program: PathBuf,

    /// Log more (-v info, -vv debug, -vvv per-instruction trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Stop with an error after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Print a run summary to stderr after halting
    #[arg(long)]
    stats: bool,

    /// Print registers and program counter to stderr on a fatal error
    #[arg(long)]
    dump_on_error: bool,
}

fn init_logger(verbose: u8) -> Result<(), fern::InitError> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // stdout carries the program's own output.
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                Local::now().format("%y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn run(args: &Args) -> anyhow::Result<()> {
    let program = load_program(&args.program)
        .with_context(|| format!("failed to load program '{}'", args.program.display()))?;

    let config = VmConfig { max_steps: args.max_steps };
    let mut vm = VirtualMachine::with_config(program, RawStdio, config);
    match vm.run() {
        Ok(stats) => {
            if args.stats {
                eprintln!("--- VM Finished ---");
                eprintln!("instructions:   {}", stats.steps);
                eprintln!("segments mapped: {}", stats.segments.maps);
                eprintln!("segments freed:  {}", stats.segments.unmaps);
                eprintln!("program loads:   {}", stats.segments.program_loads);
                eprintln!("peak live:       {}", stats.segments.peak_live);
            }
            Ok(())
        }
        Err(e) => {
            if args.dump_on_error {
                vm.dump_registers();
            }
            Err(e).context("machine failed")
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logger(args.verbose) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
