//! Binder: joins tag entries with ELF symbols and stamps tag indices onto
//! (address, size) ranges.
//!
//! Bindings are appended in entry order; duplicates are kept as-is. A `ptr`
//! entry whose symbol is large enough to hold a pointer is dereferenced
//! through the writable data section, and a non-zero pointee adds a second
//! binding right after the symbol's own.

use elfimage::ElfImage;
use policy::Policy;
use std::io::{self, Write};
use tagspec::{TagEntry, TagKind};

/// One stamped range of the program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub addr: u64,
    pub size: u64,
    pub tag: u8,
}

/// Binder result: the bindings plus the symbols that were not in the ELF
/// (non-fatal; those entries are dropped).
#[derive(Debug, Default)]
pub struct BindResult {
    pub bindings: Vec<Binding>,
    pub missing_symbols: Vec<String>,
}

/// Joins tag entries with the image's symbol table.
pub fn bind_entries(policy: &Policy, elf: &ElfImage, entries: &[TagEntry]) -> BindResult {
    let mut result = BindResult::default();
    for entry in entries {
        let Some(symbol) = elf.symbol(&entry.symbol) else {
            result.missing_symbols.push(entry.symbol.clone());
            continue;
        };
        // Entries were validated against the policy's tag set at load.
        let Some(tag) = policy.tag_index(&entry.tag) else {
            continue;
        };
        result.bindings.push(Binding {
            addr: symbol.value,
            size: symbol.size,
            tag,
        });
        if entry.kind == TagKind::Ptr && symbol.size >= 8 {
            let pointee = elf.pointer_target(symbol.value);
            if pointee != 0 {
                result.bindings.push(Binding {
                    addr: pointee,
                    size: entry.ptr_size,
                    tag,
                });
            }
        }
    }
    result
}

/// Appends one `0x<addr>,<size>,<tag>` line per binding, lowercase hex.
pub fn write_bindings(out: &mut dyn Write, bindings: &[Binding]) -> io::Result<()> {
    for binding in bindings {
        writeln!(out, "0x{:x},{},{}", binding.addr, binding.size, binding.tag)?;
    }
    Ok(())
}
