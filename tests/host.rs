//! Inspects the running test binary.

#![cfg(target_os = "linux")]

use elf_module::{Module, elf::SHT_SYMTAB};
use rstest::rstest;
use std::ops::ControlFlow;

fn current_exe() -> Module<'static> {
    let path = std::env::current_exe().unwrap();
    Module::new_from_memory(path.to_str().unwrap(), None).unwrap()
}

#[rstest]
fn current_exe_parses() {
    let module = current_exe();
    #[cfg(target_pointer_width = "64")]
    assert_eq!(module.class(), elf_module::elf::ElfClass::Elf64);
    #[cfg(target_pointer_width = "32")]
    assert_eq!(module.class(), elf_module::elf::ElfClass::Elf32);
    assert!(module.mapped_size().unwrap() > 0);
    assert!(module.program_headers().all(|phdr| phdr.is_ok()));
}

#[rstest]
fn current_exe_has_a_main_symbol() {
    let module = current_exe();
    // Test binaries are built unstripped.
    if module.find_section_header(SHT_SYMTAB).unwrap().is_none() {
        return;
    }
    let mut found = false;
    module
        .enumerate_symbols(|symbol| {
            if symbol.name == "main" {
                found = true;
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert!(found);
}

#[rstest]
fn current_exe_enumerations_succeed() {
    let module = current_exe();
    module
        .enumerate_dependencies(|_| ControlFlow::Continue(()))
        .unwrap();
    module.enumerate_imports(|_| ControlFlow::Continue(())).unwrap();
    module.enumerate_exports(|_| ControlFlow::Continue(())).unwrap();
    module
        .enumerate_sections(|_| ControlFlow::Continue(()))
        .unwrap();
}
