use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;

use ciscfuck::cli::{parse_optimizer_flags, CliArgs, CliCommand, CompileArgs, RunArgs};
use ciscfuck::error::ToolchainError;
use ciscfuck::interpreter::{Engine, DEFAULT_TAPE_SIZE};
use ciscfuck::ir::Program;
use ciscfuck::lifter::{lift, LifterFlags};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let result = match args.command {
        CliCommand::Compile(compile_args) => run_compile(compile_args),
        CliCommand::Run(run_args) => run_run(run_args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprint!("{message}");
            ExitCode::FAILURE
        }
    }
}

/// Reads Brainfuck source from stdin, lifts it under the requested
/// optimizer flags, and writes the serialized IR to stdout.
fn run_compile(args: CompileArgs) -> Result<(), String> {
    let flags = parse_optimizer_flags(&args.flags).map_err(|e| e.description())?;

    let mut source = String::new();
    io::stdin().read_to_string(&mut source).map_err(|e| e.to_string())?;

    let program = lift(&source, flags).map_err(|e| e.description())?;
    let json = program.to_json().map_err(|e| e.to_string())?;

    let mut stdout = io::stdout();
    stdout.write_all(json.as_bytes()).map_err(|e| e.to_string())?;
    stdout.write_all(b"\n").map_err(|e| e.to_string())?;
    Ok(())
}

/// Executes every positional file in order against shared stdin/stdout.
/// With `--raw`, each file is treated as Brainfuck source and lifted with
/// every optimization before running; otherwise each file is parsed as a
/// previously-compiled IR JSON document.
fn run_run(args: RunArgs) -> Result<(), String> {
    let tape_size = args.tape_size.unwrap_or(DEFAULT_TAPE_SIZE);
    let multiple = args.files.len() > 1;

    for path in &args.files {
        if multiple {
            eprintln!("--- running {} ---", path.display());
        }

        let contents = fs::read_to_string(path).map_err(|e| format!("{}: {e}\n", path.display()))?;

        let program = if args.raw {
            lift(&contents, LifterFlags::all()).map_err(|e| e.description())?
        } else {
            Program::from_json(&contents).map_err(|e| e.to_string())?
        };

        let mut engine = Engine::builder(&program).tape_size(tape_size).build(io::stdin(), io::stdout());
        engine.run().map_err(|e| e.to_string())?;
    }

    Ok(())
}
