//! Read-only view of a 64-bit little-endian RISC-V ELF image.
//!
//! The whole file is memory-mapped once; headers, section headers, and
//! every `SHT_SYMTAB` section are parsed up front into plain structs, and
//! the map stays alive for the image's lifetime so the emitter can stream
//! the original bytes back out. The image is never modified.

use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const EI_CLASS: usize = 4;
const ELFCLASS64: u8 = 2;
const EM_RISCV: u16 = 243;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHF_WRITE: u64 = 0x1;
const SHF_ALLOC: u64 = 0x2;

const EHDR_SIZE: u64 = 64;
const SYM_SIZE: u64 = 24;

/// Errors from opening and parsing an ELF image. All are fatal.
#[derive(Debug, Error)]
pub enum ElfError {
    #[error("unable to open '{path}': {source}")]
    OpenFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("file is not a 64-bit RISC-V ELF image")]
    NotRiscv64,
    #[error("ELF image is truncated")]
    Truncated,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The ELF file header fields the binder cares about.
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    pub machine: u16,
    pub entry: u64,
    pub shoff: u64,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

/// A section header with its name resolved from the section-header string
/// table.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub entsize: u64,
}

/// A symbol-table entry with its name resolved from the linked string
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub sym_type: u8,
    pub binding: u8,
    pub other: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

/// A parsed, memory-mapped ELF image.
#[derive(Debug)]
pub struct ElfImage {
    mmap: Mmap,
    ehdr: ElfHeader,
    sections: Vec<Section>,
    symbols: HashMap<String, Symbol>,
}

impl ElfImage {
    /// Opens and parses an ELF file read-only.
    ///
    /// # Errors
    /// - [`ElfError::OpenFailed`] if the file cannot be opened.
    /// - [`ElfError::NotRiscv64`] unless the image is 64-bit RISC-V.
    /// - [`ElfError::Truncated`] if any header or table runs past the file.
    pub fn open(path: &Path) -> Result<Self, ElfError> {
        let file = File::open(path).map_err(|source| ElfError::OpenFailed {
            path: path.display().to_string(),
            source,
        })?;
        // SAFETY: the map is read-only and `file` stays private to this
        // image; nothing else can truncate it through us.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse(mmap)
    }

    fn parse(mmap: Mmap) -> Result<Self, ElfError> {
        let data = &mmap[..];
        if data.len() < EHDR_SIZE as usize {
            return Err(ElfError::Truncated);
        }
        let ehdr = ElfHeader {
            machine: read_u16(data, 18)?,
            entry: read_u64(data, 24)?,
            shoff: read_u64(data, 40)?,
            shentsize: read_u16(data, 58)?,
            shnum: read_u16(data, 60)?,
            shstrndx: read_u16(data, 62)?,
        };
        if data[..4] != ELF_MAGIC || data[EI_CLASS] != ELFCLASS64 || ehdr.machine != EM_RISCV {
            return Err(ElfError::NotRiscv64);
        }

        // Raw section headers first; names need the shstrtab offsets.
        let mut raw = Vec::with_capacity(ehdr.shnum as usize);
        for i in 0..ehdr.shnum as u64 {
            let base = ehdr
                .shoff
                .checked_add(i * ehdr.shentsize as u64)
                .ok_or(ElfError::Truncated)?;
            raw.push(RawSection::read(data, base)?);
        }
        let strtab = raw
            .get(ehdr.shstrndx as usize)
            .ok_or(ElfError::Truncated)?
            .clone();
        let mut sections = Vec::with_capacity(raw.len());
        for shdr in &raw {
            let name_off = strtab
                .offset
                .checked_add(shdr.name as u64)
                .ok_or(ElfError::Truncated)?;
            sections.push(Section {
                name: read_cstr(data, name_off)?,
                sh_type: shdr.sh_type,
                flags: shdr.flags,
                addr: shdr.addr,
                offset: shdr.offset,
                size: shdr.size,
                link: shdr.link,
                info: shdr.info,
                entsize: shdr.entsize,
            });
        }

        // Materialize every symbol table; duplicate names resolve last-wins.
        let mut symbols = HashMap::new();
        for section in &sections {
            if section.sh_type != SHT_SYMTAB {
                continue;
            }
            let linked = sections
                .get(section.link as usize)
                .ok_or(ElfError::Truncated)?;
            let count = section.size / SYM_SIZE;
            for k in 0..count {
                let base = section
                    .offset
                    .checked_add(k * SYM_SIZE)
                    .ok_or(ElfError::Truncated)?;
                let st_name = read_u32(data, base)?;
                let st_info = read_u8(data, base + 4)?;
                let name_off = linked
                    .offset
                    .checked_add(st_name as u64)
                    .ok_or(ElfError::Truncated)?;
                let name = read_cstr(data, name_off)?;
                symbols.insert(
                    name,
                    Symbol {
                        sym_type: st_info & 0xf,
                        binding: st_info >> 4,
                        other: read_u8(data, base + 5)?,
                        shndx: read_u16(data, base + 6)?,
                        value: read_u64(data, base + 8)?,
                        size: read_u64(data, base + 16)?,
                    },
                );
            }
        }

        Ok(Self {
            mmap,
            ehdr,
            sections,
            symbols,
        })
    }

    pub fn header(&self) -> &ElfHeader {
        &self.ehdr
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Looks up a symbol by name.
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Resolves a pointer stored in the writable data section.
    ///
    /// Consults the first `PROGBITS` section whose flags are exactly
    /// `WRITE | ALLOC` and whose address range strictly contains `ptr`;
    /// a pointer sitting exactly at the section start is not resolved.
    /// Returns the 8 little-endian bytes at the mapped file offset, or 0
    /// when no section matches or the read would run past the file.
    pub fn pointer_target(&self, ptr: u64) -> u64 {
        for section in &self.sections {
            if section.sh_type != SHT_PROGBITS || section.flags != (SHF_WRITE | SHF_ALLOC) {
                continue;
            }
            if ptr > section.addr && ptr < section.addr.saturating_add(section.size) {
                let Some(offset) = section.offset.checked_add(ptr - section.addr) else {
                    return 0;
                };
                let offset = offset as usize;
                if let Some(bytes) = self.mmap.get(offset..offset.saturating_add(8)) {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(bytes);
                    return u64::from_le_bytes(raw);
                }
                return 0;
            }
        }
        0
    }

    /// The complete mapped image, for the verbatim `tags.mtag` copy.
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

/// Section header fields before name resolution.
#[derive(Debug, Clone)]
struct RawSection {
    name: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    entsize: u64,
}

impl RawSection {
    fn read(data: &[u8], base: u64) -> Result<Self, ElfError> {
        Ok(Self {
            name: read_u32(data, base)?,
            sh_type: read_u32(data, base + 4)?,
            flags: read_u64(data, base + 8)?,
            addr: read_u64(data, base + 16)?,
            offset: read_u64(data, base + 24)?,
            size: read_u64(data, base + 32)?,
            link: read_u32(data, base + 40)?,
            info: read_u32(data, base + 44)?,
            entsize: read_u64(data, base + 56)?,
        })
    }
}

fn slice_at(data: &[u8], offset: u64, len: u64) -> Result<&[u8], ElfError> {
    let end = offset.checked_add(len).ok_or(ElfError::Truncated)?;
    if end > data.len() as u64 {
        return Err(ElfError::Truncated);
    }
    Ok(&data[offset as usize..end as usize])
}

fn read_u8(data: &[u8], offset: u64) -> Result<u8, ElfError> {
    Ok(slice_at(data, offset, 1)?[0])
}

fn read_u16(data: &[u8], offset: u64) -> Result<u16, ElfError> {
    let b = slice_at(data, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], offset: u64) -> Result<u32, ElfError> {
    let b = slice_at(data, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(data: &[u8], offset: u64) -> Result<u64, ElfError> {
    let b = slice_at(data, offset, 8)?;
    Ok(u64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

/// NUL-terminated string at `offset`.
fn read_cstr(data: &[u8], offset: u64) -> Result<String, ElfError> {
    if offset > data.len() as u64 {
        return Err(ElfError::Truncated);
    }
    let tail = &data[offset as usize..];
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(ElfError::Truncated)?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}
