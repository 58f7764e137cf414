use crate::arch::{REL_GOTOFF, REL_TLSLE};
use crate::config::ArchReloc;
use crate::error::Result;
use crate::symbol::{Relocation, RelocationKind, Symbol};

/// Size of each PLT-style trampoline entry this crate synthesizes for
/// dynamic imports under an ELF/shared-object configuration.
pub(crate) const PLT_ENTRY_SIZE: usize = 16;

/// `jmp *GOT(%rip); <padding>` trampoline body; the 4-byte field at
/// offset 6 is patched with the RIP-relative displacement to the
/// symbol's GOT slot once it is known.
pub(crate) const PLT_ENTRY: [u8; PLT_ENTRY_SIZE] = [
    0xff, 0x25, 0, 0, 0, 0, // jmp *disp32(%rip)
    0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc, // padding
];

/// amd64 relocation evaluator for the architecture-specific forms this
/// crate handles directly (GOT-relative offsets, TLS local-exec offsets).
/// Anything else returns `Ok(None)` so the caller knows to fall back to
/// its own `adddynrel`-equivalent handling.
pub struct X86_64Reloc {
    pub got_base: u64,
    pub tls_base: u64,
}

impl ArchReloc for X86_64Reloc {
    fn eval(&self, rel: &Relocation, sym: &Symbol, sym_value: u64, p: u64) -> Result<Option<i64>> {
        let RelocationKind::Arch(kind) = rel.kind else {
            return Ok(None);
        };
        let _ = p;
        match kind {
            REL_GOTOFF => Ok(Some(sym_value as i64 + rel.add - self.got_base as i64)),
            REL_TLSLE => Ok(Some(sym_value as i64 + rel.add - self.tls_base as i64)),
            _ => Ok(None),
        }
    }
}
