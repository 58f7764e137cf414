//! Architecture-specific relocation evaluators and PLT/GOT trampoline
//! templates for the kinds this crate resolves directly rather than
//! forwarding to a caller-supplied [`crate::relocate::DynRelHandler`].

mod arm;
mod x86;
mod x86_64;

pub use arm::ArmReloc;
pub use x86::X86Reloc;
pub use x86_64::X86_64Reloc;

/// ELF machine-type values for the architectures this crate recognizes,
/// re-exported from the `elf` crate's ABI constant set so a file-format
/// writer can stamp the right `e_machine` value without duplicating it.
pub const EM_386: u16 = elf::abi::EM_386;
pub const EM_X86_64: u16 = elf::abi::EM_X86_64;
pub const EM_ARM: u16 = elf::abi::EM_ARM;

/// Numeric relocation-kind values used for [`crate::symbol::RelocationKind::Arch`]
/// that both architectures in this module recognize. Real architecture
/// relocation numbering (as in an ELF `r_type` field) starts much higher;
/// these are this crate's own internal numbering for the handful of
/// archreloc-style forms it evaluates itself, kept starting at 256 to
/// match `spec.md`'s "arch-specific kinds are numbered `>= 256`" rule.
pub const REL_GOTOFF: u32 = 256;
pub const REL_TLSLE: u32 = 257;
