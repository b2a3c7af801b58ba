//! Dump the model reconstructed from an export artifact.

use anyhow::{Context, Result};

use ancalagon::{logging, Program};

fn main() -> Result<()> {
    logging::init_tracing();

    let path = std::env::args()
        .nth(1)
        .context("usage: dump <artifact-file>")?;
    let program = Program::from_path(&path)?;

    println!("{} ({})", program.name(), program.architecture());
    for function in program.functions().values() {
        println!(
            "{:#x} {} [{} blocks, {} callers, {} callees]",
            function.address(),
            function.name(),
            function.blocks().len(),
            function.parents().len(),
            function.children().len()
        );
        for block in function.blocks().values() {
            let successors: Vec<String> = block
                .successors()
                .iter()
                .map(|addr| format!("{addr:#x}"))
                .collect();
            println!("  block {:#x} -> [{}]", block.address(), successors.join(", "));
            for instruction in block.instructions().values() {
                println!(
                    "    {:#x} {}",
                    instruction.address(),
                    instruction.render(&program)?
                );
            }
        }
    }
    Ok(())
}
