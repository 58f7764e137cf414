use crate::symbol::{Relocation, Symbol, SymbolId};
use crate::Result;

/// Target instruction set, replacing the original's single-character
/// `thechar` discriminator with an explicit enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
}

impl Arch {
    pub fn ptr_size(self) -> u8 {
        match self {
            Arch::X86 | Arch::Arm => 4,
            Arch::X86_64 => 8,
        }
    }
}

/// Output object kind, replacing the original's `HEADTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadType {
    Elf,
    Pe,
    Plan9,
    MachO,
}

/// Every configuration global the layout and relocation phases consult,
/// bundled into one value instead of threaded through module-level
/// statics (`HEADTYPE`, `thechar`, `flag_shared`, `PtrSize`, `FuncAlign`,
/// `INITTEXT`, `INITRND`, `HEADR`, `PEFILEALIGN`, `isobj`).
#[derive(Debug, Clone, Copy)]
pub struct TargetConfig {
    pub head_type: HeadType,
    pub arch: Arch,
    /// Building a shared object (`-shared`): enables the dynamic
    /// relocation preprocessor's RELATIVE-record path.
    pub flag_shared: bool,
    /// Pointer width in bytes for this target; mirrors `arch.ptr_size()`
    /// but kept as an independent field since some hosts cross-build for
    /// a pointer size their own `Arch` doesn't directly imply.
    pub ptr_size: u8,
    /// Minimum function alignment in bytes.
    pub func_align: u32,
    /// Virtual address of the first text byte.
    pub init_text: u64,
    /// Rounding granularity for virtual addresses (power of two).
    pub init_rnd: u64,
    /// Size reserved for the file header before the first segment.
    pub headr: u64,
    /// PE file alignment; unused outside `HeadType::Pe`.
    pub pe_file_align: u64,
    /// Emitting a relocatable object file (`.o`) rather than a final
    /// image: disables address assignment and leaves relocations
    /// symbolic except for a few always-resolvable cases.
    pub is_obj: bool,
}

impl TargetConfig {
    pub fn round_up(&self, addr: u64) -> u64 {
        (addr + self.init_rnd - 1) & !(self.init_rnd - 1)
    }
}

/// Architecture-specific relocation evaluator, equivalent to `archreloc`.
///
/// Returns `Ok(None)` for a relocation type this architecture does not
/// know how to evaluate directly (the caller then tries dynamic-relocation
/// handling); returns `Ok(Some(value))` with the bytes to store otherwise.
pub trait ArchReloc {
    fn eval(&self, rel: &Relocation, sym: &Symbol, sym_value: u64, p: u64) -> Result<Option<i64>>;
}

impl<F> ArchReloc for F
where
    F: Fn(&Relocation, &Symbol, u64, u64) -> Result<Option<i64>>,
{
    fn eval(&self, rel: &Relocation, sym: &Symbol, sym_value: u64, p: u64) -> Result<Option<i64>> {
        self(rel, sym, sym_value, p)
    }
}

/// GC type-program decoder, equivalent to `decodetype_gc`: given a type
/// descriptor symbol, returns the symbol holding its GC program, if the
/// type contains pointers at all.
pub trait GcTypeProgram {
    fn program_for(&self, gotype: SymbolId) -> Option<SymbolId>;
}

impl<F> GcTypeProgram for F
where
    F: Fn(SymbolId) -> Option<SymbolId>,
{
    fn program_for(&self, gotype: SymbolId) -> Option<SymbolId> {
        self(gotype)
    }
}

/// Converts a double-precision constant to its IEEE-754 single-precision
/// bit pattern, equivalent to `ieeedtof`. Used by `save_data`'s float32
/// constant path.
pub trait IeeeFloatConvert {
    fn to_f32_bits(&self, bits: u64) -> u32;
}

impl<F> IeeeFloatConvert for F
where
    F: Fn(u64) -> u32,
{
    fn to_f32_bits(&self, bits: u64) -> u32 {
        self(bits)
    }
}
