use crate::config::IeeeFloatConvert;
use crate::diag::Diagnostics;
use crate::symbol::{Relocation, RelocationKind, Symbol, SymbolId};

/// `save_data`'s heuristic sanity bounds (`spec.md` §4.1, §9): not
/// correctness limits, just implausible-input detectors inherited from the
/// original's `off >= 1<<30`/`len >= 100` checks.
const SAVE_DATA_MAX_OFFSET: usize = 1 << 30;
const SAVE_DATA_MAX_LEN: usize = 100;

/// One constant `save_data` can write, per `spec.md` §4.1: "writes a
/// constant of type {float32, float64, raw bytes, integer, address, size}
/// into the symbol at a given offset."
pub enum DataSpec<'a> {
    /// `bits` is the IEEE-754 double-precision pattern of the value;
    /// converted to its 32-bit single-precision pattern via
    /// [`IeeeFloatConvert`] before being written.
    Float32 { bits: u64 },
    /// `bits` is the IEEE-754 double-precision pattern, written as-is.
    Float64 { bits: u64 },
    /// Uninterpreted bytes, copied verbatim.
    Bytes(&'a [u8]),
    /// A byte-permuted integer constant. `width` must be 1, 2, 4, or 8 —
    /// anything else is "integer width not handled in `save_data`"
    /// (`spec.md` §7's Diagnostic category), reported and skipped rather
    /// than written.
    Int { value: u64, width: usize },
    /// An absolute-address constant: appends an `Addr` relocation against
    /// `target` instead of writing a value directly, since the address
    /// isn't known until address assignment.
    Addr { target: SymbolId, width: u8, add: i64 },
    /// A size constant: appends a `Size` relocation against `target`.
    Size { target: SymbolId, width: u8, add: i64 },
}

/// Byte order used when encoding fixed-width integers into a symbol's
/// payload. Every architecture this crate currently targets is little
/// endian, but the permutation table is kept explicit (rather than
/// hard-coding `to_le_bytes` everywhere) so `set_uint`'s round-trip
/// invariant does not silently depend on host endianness, and so a
/// big-endian target could be added without touching call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Writes the low `width` bytes of `value` into `dst` in this byte
    /// order. `width` must be 1, 2, 4, or 8.
    pub(crate) fn write(self, dst: &mut [u8], value: u64) {
        let bytes = value.to_le_bytes();
        match self {
            ByteOrder::Little => dst.copy_from_slice(&bytes[..dst.len()]),
            ByteOrder::Big => {
                for (i, b) in dst.iter_mut().enumerate() {
                    *b = bytes[dst.len() - 1 - i];
                }
            }
        }
    }

    /// Reads `width` bytes from `src` in this byte order.
    pub fn read(self, src: &[u8]) -> u64 {
        let mut bytes = [0u8; 8];
        match self {
            ByteOrder::Little => bytes[..src.len()].copy_from_slice(src),
            ByteOrder::Big => {
                for (i, &b) in src.iter().enumerate() {
                    bytes[src.len() - 1 - i] = b;
                }
            }
        }
        u64::from_le_bytes(bytes)
    }
}

/// Grows `sym`'s payload to at least `want` bytes, zero-filling the new
/// tail. Doubling is handled by `Vec::resize`'s own growth strategy; there
/// is no separate manual-realloc step to model here, unlike the original's
/// hand-rolled `symgrow`.
pub fn grow(sym: &mut Symbol, want: usize) {
    if sym.payload.len() < want {
        sym.payload.resize(want, 0);
    }
    if (sym.size as usize) < want {
        sym.size = want as u64;
    }
}

/// Overwrites `width` bytes at `off` with `value`, growing the payload if
/// necessary. `width` must be 1, 2, 4, or 8.
///
/// Per `spec.md` §4.1: a symbol that was only ever an external reference
/// (this crate's [`crate::symbol::SymKind::Extern`], the closest analogue
/// to the original's bare "kind 0") becomes a real data symbol and
/// reachable the moment something writes bytes into it — a placeholder
/// reference and an actually-defined symbol can't stay distinguishable
/// once a caller has started depositing content into it.
pub fn set_uint(sym: &mut Symbol, order: ByteOrder, off: usize, value: u64, width: usize) {
    if sym.kind == crate::symbol::SymKind::Extern {
        sym.kind = crate::symbol::SymKind::Data;
        sym.reachable = true;
    }
    grow(sym, off + width);
    order.write(&mut sym.payload[off..off + width], value);
}

/// Appends `value` to the end of the payload and returns the offset it
/// was written at.
pub fn add_uint(sym: &mut Symbol, order: ByteOrder, value: u64, width: usize) -> usize {
    let off = sym.payload.len();
    set_uint(sym, order, off, value, width);
    off
}

/// Appends a placeholder of `width` zero bytes and an `Addr`-kind
/// relocation pointing at `target`, returning the offset the relocation
/// will fill in.
pub fn add_addr(sym: &mut Symbol, target: SymbolId, add: i64, width: u8) -> usize {
    let off = sym.payload.len();
    grow(sym, off + width as usize);
    sym.relocations.push(Relocation {
        off: off as u32,
        siz: width,
        kind: RelocationKind::Addr,
        sym: target,
        add,
    });
    off
}

/// `add_addr` specialized to a 4-byte field, for contexts (narrow type
/// hash tables, 32-bit-pointer targets) that need a fixed-width absolute
/// reference regardless of the platform's native pointer size.
pub fn add_addr4(sym: &mut Symbol, target: SymbolId, add: i64) -> usize {
    add_addr(sym, target, add, 4)
}

/// Appends a placeholder and a `PcRel`-kind relocation.
pub fn add_pcrel(sym: &mut Symbol, target: SymbolId, add: i64, width: u8) -> usize {
    let off = sym.payload.len();
    grow(sym, off + width as usize);
    sym.relocations.push(Relocation {
        off: off as u32,
        siz: width,
        kind: RelocationKind::PcRel,
        sym: target,
        add,
    });
    off
}

/// Appends a placeholder and a `Size`-kind relocation.
pub fn add_size(sym: &mut Symbol, target: SymbolId, add: i64, width: u8) -> usize {
    let off = sym.payload.len();
    grow(sym, off + width as usize);
    sym.relocations.push(Relocation {
        off: off as u32,
        siz: width,
        kind: RelocationKind::Size,
        sym: target,
        add,
    });
    off
}

/// Appends a NUL-terminated copy of `s` to the payload and returns the
/// offset it starts at. `on_string` is an optional hook (e.g. a
/// `.shstrtab`-style string-table registry) invoked with the string and
/// the offset it landed at; this crate does not itself maintain such a
/// registry, that belongs to the file-format writer.
pub fn add_string(sym: &mut Symbol, s: &str, mut on_string: Option<&mut dyn FnMut(&str, usize)>) -> usize {
    let off = sym.payload.len();
    sym.payload.extend_from_slice(s.as_bytes());
    sym.payload.push(0);
    sym.size = sym.payload.len() as u64;
    if let Some(hook) = on_string.as_deref_mut() {
        hook(s, off);
    }
    off
}

/// Copies `data` into the payload at `off`, growing as needed. The
/// primitive every [`DataSpec`] variant that writes concrete bytes (rather
/// than appending a relocation) reduces to.
fn write_bytes(sym: &mut Symbol, diag: &mut Diagnostics, off: usize, data: &[u8]) {
    let end = off + data.len();
    if off > sym.size as usize && sym.size != 0 {
        diag.report(
            Some(&sym.name),
            format!(
                "save_data: offset {off} exceeds declared size {} before growth",
                sym.size
            ),
        );
    }
    grow(sym, end);
    sym.payload[off..end].copy_from_slice(data);
}

/// Writes one typed constant into `sym`'s payload at `off`, equivalent to
/// `savedata`. Dispatches on [`DataSpec`]:
///
/// - `Bytes`: copied verbatim.
/// - `Int`: byte-permuted via [`ByteOrder::Little`]; a width outside
///   {1,2,4,8} is reported and the write is skipped (`spec.md` §7:
///   "integer width not handled in `save_data`").
/// - `Float32`: `bits` (an IEEE double pattern) is narrowed to its 32-bit
///   pattern via `float_convert` first.
/// - `Float64`: `bits` written as-is.
/// - `Addr`/`Size`: no value is written yet — a relocation is appended at
///   `off` instead, since the target's address/size is not known until a
///   later phase. The placeholder bytes are still reserved (zero-filled)
///   so the payload's length accounts for the field.
///
/// `off >= 1<<30` or a constant wider than 100 bytes triggers a diagnostic
/// (`spec.md` §9: a heuristic sanity check inherited from the original,
/// not a correctness limit) but does not stop the write.
pub fn save_data(
    sym: &mut Symbol,
    diag: &mut Diagnostics,
    float_convert: &dyn IeeeFloatConvert,
    off: usize,
    spec: DataSpec,
) {
    let len = match &spec {
        DataSpec::Bytes(data) => data.len(),
        DataSpec::Int { width, .. } => *width,
        DataSpec::Float32 { .. } => 4,
        DataSpec::Float64 { .. } => 8,
        DataSpec::Addr { width, .. } | DataSpec::Size { width, .. } => *width as usize,
    };
    if off >= SAVE_DATA_MAX_OFFSET {
        diag.report(
            Some(&sym.name),
            format!("save_data: offset {off} exceeds the sanity bound of {SAVE_DATA_MAX_OFFSET}"),
        );
    }
    if len >= SAVE_DATA_MAX_LEN {
        diag.report(
            Some(&sym.name),
            format!("save_data: constant length {len} exceeds the sanity bound of {SAVE_DATA_MAX_LEN}"),
        );
    }

    match spec {
        DataSpec::Bytes(data) => write_bytes(sym, diag, off, data),
        DataSpec::Int { value, width } => {
            if !matches!(width, 1 | 2 | 4 | 8) {
                diag.report(
                    Some(&sym.name),
                    format!("save_data: integer width {width} is not one of 1/2/4/8"),
                );
                return;
            }
            grow(sym, off + width);
            ByteOrder::Little.write(&mut sym.payload[off..off + width], value);
        }
        DataSpec::Float32 { bits } => {
            let bits32 = float_convert.to_f32_bits(bits);
            write_bytes(sym, diag, off, &bits32.to_le_bytes());
        }
        DataSpec::Float64 { bits } => {
            write_bytes(sym, diag, off, &bits.to_le_bytes());
        }
        DataSpec::Addr { target, width, add } => {
            grow(sym, off + width as usize);
            sym.relocations.push(Relocation {
                off: off as u32,
                siz: width,
                kind: RelocationKind::Addr,
                sym: target,
                add,
            });
        }
        DataSpec::Size { target, width, add } => {
            grow(sym, off + width as usize);
            sym.relocations.push(Relocation {
                off: off as u32,
                siz: width,
                kind: RelocationKind::Size,
                sym: target,
                add,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymKind;

    fn sym() -> Symbol {
        Symbol::new("t", SymKind::Data)
    }

    #[test]
    fn set_uint_round_trips_little_endian() {
        let mut s = sym();
        set_uint(&mut s, ByteOrder::Little, 0, 0x1122_3344_5566_7788, 8);
        assert_eq!(ByteOrder::Little.read(&s.payload), 0x1122_3344_5566_7788);
    }

    #[test]
    fn set_uint_round_trips_big_endian() {
        let mut s = sym();
        set_uint(&mut s, ByteOrder::Big, 0, 0x1122_3344, 4);
        assert_eq!(s.payload, vec![0x11, 0x22, 0x33, 0x44]);
        assert_eq!(ByteOrder::Big.read(&s.payload), 0x1122_3344);
    }

    #[test]
    fn set_uint_promotes_an_extern_placeholder_to_a_reachable_data_symbol() {
        let mut s = Symbol::new("unresolved.x", SymKind::Extern);
        s.reachable = false;
        set_uint(&mut s, ByteOrder::Little, 0, 7, 4);
        assert_eq!(s.kind, SymKind::Data);
        assert!(s.reachable);
    }

    #[test]
    fn add_uint_appends_and_advances_size() {
        let mut s = sym();
        let off1 = add_uint(&mut s, ByteOrder::Little, 1, 4);
        let off2 = add_uint(&mut s, ByteOrder::Little, 2, 4);
        assert_eq!(off1, 0);
        assert_eq!(off2, 4);
        assert_eq!(s.size, 8);
    }

    #[test]
    fn add_addr_records_relocation_at_placeholder() {
        let mut s = sym();
        let target = SymbolId(7);
        let off = add_addr(&mut s, target, 3, 8);
        assert_eq!(off, 0);
        assert_eq!(s.payload.len(), 8);
        assert_eq!(s.relocations.len(), 1);
        assert_eq!(s.relocations[0].sym, target);
        assert_eq!(s.relocations[0].add, 3);
        assert!(matches!(s.relocations[0].kind, RelocationKind::Addr));
    }

    #[test]
    fn add_string_nul_terminates() {
        let mut s = sym();
        let off = add_string(&mut s, "hi", None);
        assert_eq!(off, 0);
        assert_eq!(s.payload, b"hi\0");
    }

    fn no_float_convert() -> impl IeeeFloatConvert {
        |bits: u64| f64::from_bits(bits) as f32 as u32
    }

    #[test]
    fn save_data_bytes_grows_and_writes_without_fatal_error() {
        let mut s = sym();
        let mut diag = Diagnostics::new();
        save_data(&mut s, &mut diag, &no_float_convert(), 4, DataSpec::Bytes(&[9, 9]));
        assert_eq!(&s.payload[4..6], &[9, 9]);
        assert!(diag.has_errors(), "offset 4 exceeds declared size 0 before growth");
    }

    #[test]
    fn save_data_int_is_byte_permuted() {
        let mut s = sym();
        let mut diag = Diagnostics::new();
        save_data(&mut s, &mut diag, &no_float_convert(), 0, DataSpec::Int { value: 0x1234, width: 4 });
        assert_eq!(ByteOrder::Little.read(&s.payload[0..4]), 0x1234);
    }

    #[test]
    fn save_data_int_rejects_unsupported_width() {
        let mut s = sym();
        let mut diag = Diagnostics::new();
        save_data(&mut s, &mut diag, &no_float_convert(), 0, DataSpec::Int { value: 1, width: 3 });
        assert!(diag.has_errors());
        assert!(s.payload.is_empty(), "the malformed write is skipped, not partially applied");
    }

    #[test]
    fn save_data_float32_narrows_via_the_ieee_converter() {
        let mut s = sym();
        let mut diag = Diagnostics::new();
        save_data(
            &mut s,
            &mut diag,
            &no_float_convert(),
            0,
            DataSpec::Float32 { bits: 1.5f64.to_bits() },
        );
        let bits = u32::from_le_bytes(s.payload[0..4].try_into().unwrap());
        assert_eq!(f32::from_bits(bits), 1.5f32);
    }

    #[test]
    fn save_data_addr_appends_a_relocation_instead_of_a_value() {
        let mut s = sym();
        let mut diag = Diagnostics::new();
        let target = SymbolId(3);
        save_data(
            &mut s,
            &mut diag,
            &no_float_convert(),
            0,
            DataSpec::Addr { target, width: 8, add: 5 },
        );
        assert_eq!(s.payload.len(), 8);
        assert_eq!(s.relocations.len(), 1);
        assert_eq!(s.relocations[0].sym, target);
        assert_eq!(s.relocations[0].add, 5);
        assert!(matches!(s.relocations[0].kind, RelocationKind::Addr));
    }

    #[test]
    fn save_data_flags_an_implausible_offset_or_length() {
        let mut s = sym();
        let mut diag = Diagnostics::new();
        save_data(&mut s, &mut diag, &no_float_convert(), 1 << 30, DataSpec::Int { value: 1, width: 4 });
        assert!(diag.has_errors());
    }
}
