mod bytecode;
mod frontend;
mod runtime;

use std::{env, fs, path::Path, process};

use crate::bytecode::disasm::print_program;
use crate::bytecode::{Compiler, Program};
use crate::frontend::lexer::Lexer;
use crate::runtime::{InputEcall, Vm};

const SOURCE_EXT: &str = "lil";
const BYTECODE_EXT: &str = "lbc";

fn main() {
    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let show_bytecode = args.contains(&"--bc".to_string());
    let emit_path = flag_value(&args, "--emit");

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return;
    }

    // First non-flag argument is the program, second is the trap input file.
    let mut positional = args
        .iter()
        .skip(1)
        .filter(|a| !a.starts_with('-'))
        .filter(|a| Some(*a) != emit_path.as_ref());
    let filename = positional.next();
    let input = positional.next().cloned().unwrap_or_default();

    let Some(filename) = filename else {
        print_usage();
        return;
    };

    match extension(filename) {
        Some(BYTECODE_EXT) => {
            let program = load_bytecode(filename);
            dispatch(program, &input, show_bytecode, emit_path.as_deref());
        }
        Some(SOURCE_EXT) => {
            let source = match fs::read_to_string(filename) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Failed to read '{}': {}", filename, e);
                    process::exit(1);
                }
            };

            if tokens_only {
                dump_tokens(&source);
                return;
            }

            let program = compile_source(&source);
            dispatch(program, &input, show_bytecode, emit_path.as_deref());
        }
        _ => {
            eprintln!(
                "Error: expected a .{} or .{} file, got {}",
                SOURCE_EXT, BYTECODE_EXT, filename
            );
            process::exit(1);
        }
    }
}

fn extension(filename: &str) -> Option<&str> {
    Path::new(filename).extension().and_then(|e| e.to_str())
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).cloned()
}

fn print_usage() {
    println!("LITTLE - a small imperative language");
    println!();
    println!("Usage:");
    println!("  little <file.lil> [input-file]     Compile and run");
    println!("  little <file.lbc> [input-file]     Run compiled bytecode");
    println!("  little --tokens <file.lil>         Show tokens only");
    println!("  little --bc <file>                 Show disassembly before running");
    println!("  little --emit <out.lbc> <file.lil> Save compiled bytecode");
    println!("  little --help, -h                  Show this help");
}

fn dump_tokens(source: &str) {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => {
            for tok in &tokens {
                println!("{:?}", tok);
            }
        }
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            process::exit(1);
        }
    }
}

fn compile_source(source: &str) -> Program {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            process::exit(1);
        }
    };

    match Compiler::new(&tokens).compile() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn load_bytecode(filename: &str) -> Program {
    let data = match fs::read(filename) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };

    match Program::from_postcard(&data) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to decode '{}': {}", filename, e);
            process::exit(1);
        }
    }
}

fn dispatch(program: Program, input: &str, show_bytecode: bool, emit_path: Option<&str>) {
    if let Some(path) = emit_path {
        save_bytecode(&program, path);
        return;
    }

    if show_bytecode {
        print_program(&program);
        println!();
    }

    run_program(program, input);
}

fn save_bytecode(program: &Program, path: &str) {
    if extension(path) != Some(BYTECODE_EXT) {
        eprintln!("Error: expected a .{} output path, got {}", BYTECODE_EXT, path);
        process::exit(1);
    }

    let data = match program.to_postcard() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to encode bytecode: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(path, data) {
        eprintln!("Failed to write '{}': {}", path, e);
        process::exit(1);
    }
    println!("wrote {}", path);
}

fn run_program(program: Program, input_path: &str) {
    let mut handler = if input_path.is_empty() {
        InputEcall::default()
    } else {
        match InputEcall::from_file(input_path) {
            Ok(h) => h,
            Err(e) => {
                eprintln!("Failed to read '{}': {}", input_path, e);
                process::exit(1);
            }
        }
    };

    let mut vm = Vm::new(program);

    match vm.run_to_completion(&mut handler) {
        Ok(value) => println!("{}", value),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
