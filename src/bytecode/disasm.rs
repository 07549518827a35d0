use crate::bytecode::{Op, Program};

/// Print disassembly of a compiled program
pub fn print_program(prog: &Program) {
    println!("=== BYTECODE PROGRAM ===");
    println!("{} bytes", prog.len());
    println!("════════════════════════════════════════");
    print!("{}", disassemble_to_string(prog));
}

/// Return disassembly as a String
pub fn disassemble_to_string(prog: &Program) -> String {
    let targets = collect_targets(prog);
    let mut output = String::new();
    let mut pc = 0;

    while pc < prog.len() {
        if targets.contains(&pc) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", pc));
        output.push_str(if targets.contains(&pc) { "► " } else { "  " });

        let Some(op) = prog.fetch_byte(pc).and_then(Op::from_byte) else {
            output.push_str(&format!(
                "?? 0x{:02x}\n",
                prog.fetch_byte(pc).unwrap_or(0)
            ));
            pc += 1;
            continue;
        };

        if op.has_operand() {
            match prog.fetch_u32(pc + 1) {
                Some(v) => output.push_str(&format!("{:<14}{}\n", op.name(), v)),
                None => output.push_str(&format!("{:<14}<truncated>\n", op.name())),
            }
        } else {
            output.push_str(op.name());
            output.push('\n');
        }

        pc += op.size();
    }

    output
}

/// Jump, branch, and call targets are literals pushed immediately before the
/// transfer instruction; anything computed at runtime is invisible here.
fn collect_targets(prog: &Program) -> Vec<usize> {
    let mut targets = Vec::new();
    let mut pc = 0;

    while pc < prog.len() {
        let Some(op) = prog.fetch_byte(pc).and_then(Op::from_byte) else {
            pc += 1;
            continue;
        };

        if op == Op::PushLit {
            let next = pc + op.size();
            let transfer = prog
                .fetch_byte(next)
                .and_then(Op::from_byte)
                .is_some_and(|n| matches!(n, Op::Jump | Op::Branch | Op::Call));
            if transfer {
                if let Some(target) = prog.fetch_u32(pc + 1) {
                    let target = target as usize;
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }

        pc += op.size();
    }

    targets
}
