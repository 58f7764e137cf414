use crate::arch::{REL_GOTOFF, REL_TLSLE};
use crate::config::ArchReloc;
use crate::error::Result;
use crate::symbol::{Relocation, RelocationKind, Symbol};

/// 32-bit ARM PLT entry size; larger than x86's because ARM has no
/// single-instruction indirect-memory jump and must load the GOT address
/// into a register first.
pub(crate) const PLT_ENTRY_SIZE: usize = 16;

/// `ldr ip, [pc, #4]; add ip, pc, ip; ldr pc, [ip]; .word GOT-.-8` trampoline
/// body; the 4-byte word at offset 12 is patched with the PC-relative
/// displacement to the symbol's GOT slot.
pub(crate) const PLT_ENTRY: [u8; PLT_ENTRY_SIZE] = [
    0x04, 0xc0, 0x9f, 0xe5, // ldr ip, [pc, #4]
    0x0c, 0xc0, 0x8c, 0xe0, // add ip, ip, pc
    0x00, 0xf0, 0x9c, 0xe5, // ldr pc, [ip]
    0, 0, 0, 0, // .word GOT_entry - (plt_entry + 12)
];

/// ARM relocation evaluator, the third architecture this crate supports
/// alongside [`crate::arch::X86Reloc`]/[`crate::arch::X86_64Reloc`]
/// (`spec.md` §9: "arbitrary-target extensibility beyond the three CPU
/// families the source supports" is explicitly out of scope, implying
/// these three — x86, amd64, arm — are the ones in scope). The
/// arch-specific kinds it recognizes are this crate's own numbering, not
/// a hardware `R_ARM_*` encoding.
pub struct ArmReloc {
    pub got_base: u32,
    pub tls_base: u32,
}

impl ArchReloc for ArmReloc {
    fn eval(&self, rel: &Relocation, sym: &Symbol, sym_value: u64, p: u64) -> Result<Option<i64>> {
        let RelocationKind::Arch(kind) = rel.kind else {
            return Ok(None);
        };
        let _ = (sym, p);
        match kind {
            REL_GOTOFF => Ok(Some(sym_value as i64 + rel.add - self.got_base as i64)),
            REL_TLSLE => Ok(Some(sym_value as i64 + rel.add - self.tls_base as i64)),
            _ => Ok(None),
        }
    }
}
