//! Prints what a module needs and provides.
//!
//! ```text
//! cargo run --example enumerate --features log -- /usr/lib/x86_64-linux-gnu/libz.so.1 0x7f0000000000
//! ```

use elf_module::{Module, Result};
use std::ops::ControlFlow;

fn main() -> Result<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: enumerate <path> [base address]");
        std::process::exit(2);
    };
    let base = args
        .next()
        .and_then(|base| u64::from_str_radix(base.trim_start_matches("0x"), 16).ok());

    let module = Module::new_from_memory(&path, base)?;
    println!("{module:?}");
    if let Some(soname) = module.soname()? {
        println!("soname: {soname}");
    }
    if let Some(interp) = module.interpreter()? {
        println!("interpreter: {interp}");
    }

    module.enumerate_dependencies(|dep| {
        println!("needs   {}", dep.name);
        ControlFlow::Continue(())
    })?;
    module.enumerate_imports(|import| {
        println!("import  {:?} {}", import.kind, import.name);
        ControlFlow::Continue(())
    })?;
    module.enumerate_exports(|export| {
        println!("export  {:?} {} @ 0x{:x}", export.kind, export.name, export.address);
        ControlFlow::Continue(())
    })?;
    Ok(())
}
