use crate::arch::{REL_GOTOFF, REL_TLSLE};
use crate::config::ArchReloc;
use crate::error::Result;
use crate::symbol::{Relocation, RelocationKind, Symbol};

pub(crate) const PLT_ENTRY_SIZE: usize = 16;

/// `jmp *GOT+idx; push idx; jmp PLT0` trampoline body for 32-bit x86,
/// which lacks RIP-relative addressing and so encodes an absolute GOT
/// address patched in at offset 2.
pub(crate) const PLT_ENTRY: [u8; PLT_ENTRY_SIZE] = [
    0xff, 0x25, 0, 0, 0, 0, // jmp *GOT_entry
    0x68, 0, 0, 0, 0, // push reloc_index
    0xe9, 0, 0, 0, 0, // jmp PLT0
];

/// x86 relocation evaluator, the 32-bit counterpart of
/// [`crate::arch::X86_64Reloc`]; the arch-specific kinds it recognizes
/// are identical since this crate's `REL_GOTOFF`/`REL_TLSLE` numbering is
/// its own, not a hardware encoding.
pub struct X86Reloc {
    pub got_base: u32,
    pub tls_base: u32,
}

impl ArchReloc for X86Reloc {
    fn eval(&self, rel: &Relocation, _sym: &Symbol, sym_value: u64, p: u64) -> Result<Option<i64>> {
        let RelocationKind::Arch(kind) = rel.kind else {
            return Ok(None);
        };
        let _ = p;
        match kind {
            REL_GOTOFF => Ok(Some(
                sym_value as i64 + rel.add - self.got_base as i64,
            )),
            REL_TLSLE => Ok(Some(
                sym_value as i64 + rel.add - self.tls_base as i64,
            )),
            _ => Ok(None),
        }
    }
}
