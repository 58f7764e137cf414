use crate::config::{ArchReloc, TargetConfig};
use crate::diag::Diagnostics;
use crate::encode::ByteOrder;
use crate::error::{address_error, likely, relocation_error, unlikely, Result};
use crate::symbol::{RelocationKind, SymKind, SymbolId, SymbolStore};

/// Handles architecture- or format-specific relocation kinds
/// (`type >= 256`) that [`crate::dynrel::preprocess_dynamic_relocations`]
/// does not resolve itself, equivalent to `adddynrel`/`adddynrela`.
pub trait DynRelHandler {
    fn handle(
        &mut self,
        store: &mut SymbolStore,
        diag: &mut Diagnostics,
        owner: SymbolId,
        rel_idx: usize,
    ) -> Result<()>;
}

impl DynRelHandler for () {
    fn handle(
        &mut self,
        _store: &mut SymbolStore,
        _diag: &mut Diagnostics,
        _owner: SymbolId,
        _rel_idx: usize,
    ) -> Result<()> {
        Ok(())
    }
}

/// One step of a [`BlockSink`] walk, fired once per emitted symbol and
/// once per zero-filled gap between symbols. A caller that still wants
/// instruction-level disassembly output (out of scope for this crate, see
/// `spec.md` §1) can hang a decoder off this hook.
#[derive(Debug, Clone, Copy)]
pub enum BlockEvent<'a> {
    Symbol { id: SymbolId, vaddr: u64, bytes: &'a [u8] },
    Gap { vaddr: u64, len: u64 },
}

/// Destination for emitted image bytes, the Rust analogue of
/// `cput`/`cflush`/`cpos`: a caller-supplied sink that receives bytes in
/// address order along with a running position, without this crate
/// needing to know anything about the eventual file format.
pub trait BlockSink {
    fn write(&mut self, vaddr: u64, bytes: &[u8]);
    /// Optional hook mirroring the original's inline disassembly dump;
    /// called once per event in addition to `write`.
    fn on_event(&mut self, _event: BlockEvent<'_>) {}
}

impl<F: FnMut(u64, &[u8])> BlockSink for F {
    fn write(&mut self, vaddr: u64, bytes: &[u8]) {
        self(vaddr, bytes)
    }
}

/// Resolves every relocation attached to `id`, writing the computed value
/// directly into the symbol's own payload bytes. Equivalent to `relocsym`.
///
/// Per-relocation validation mirrors the original's six checks: the
/// relocation's field must fit inside the payload, its target must be
/// resolvable (reachable, not an unresolved `DynImport` left over from a
/// preprocessor branch that didn't fire), its width must be one of 1/2/4/8,
/// the computed value must fit the field width for `Addr`/`Size` (checked,
/// not truncated silently), `PcRel` is computed relative to the *end* of
/// the relocated field (`s.value + off + siz`, matching the original's
/// `o += r->add - (s->value + r->off + r->siz)` — the displacement a
/// `call`/`jmp rel32` encodes is relative to the next instruction, not the
/// start of its own operand), and `is_obj` short-circuits everything
/// except a handful of forms that remain meaningful in an unlinked object
/// file.
pub fn relocsym(
    store: &mut SymbolStore,
    diag: &mut Diagnostics,
    cfg: &TargetConfig,
    arch: &dyn ArchReloc,
    id: SymbolId,
) -> Result<()> {
    if cfg.is_obj {
        // Relocatable-object emission leaves symbolic relocations for a
        // later link step; nothing to resolve yet.
        return Ok(());
    }

    let rel_count = store.get(id).relocations.len();
    for i in 0..rel_count {
        let rel = store.get(id).relocations[i].clone();
        if matches!(rel.kind, RelocationKind::Relative) {
            // Bookkeeping entry on the dynamic relocation symbol itself
            // (see `crate::symbol::RelocationKind::Relative`), not a
            // payload-patched relocation; nothing to resolve here.
            continue;
        }
        let width = rel.siz as usize;
        if unlikely(!matches!(width, 1 | 2 | 4 | 8)) {
            diag.report(
                Some(&store.get(id).name),
                format!("relocation field width {width} is not one of 1/2/4/8"),
            );
            continue;
        }
        if unlikely((rel.off as usize) + width > store.get(id).payload.len()) {
            diag.report(
                Some(&store.get(id).name),
                format!(
                    "relocation at offset {} with width {width} overruns symbol payload of length {}",
                    rel.off,
                    store.get(id).payload.len()
                ),
            );
            continue;
        }

        let target = store.get(rel.sym).clone();
        if !target.reachable {
            return Err(relocation_error(format!(
                "symbol {} has a relocation against unreachable symbol {}",
                store.get(id).name,
                target.name
            )));
        }
        if target.kind == SymKind::DynImport && target.plt.is_none() && target.got.is_none() {
            diag.report(
                Some(&target.name),
                "relocation left pointing at an unresolved dynamic import after preprocessing",
            );
        }

        let site_vaddr = store.get(id).value + rel.off as u64;
        let pcrel_origin = site_vaddr + width as u64;
        let value = match rel.kind {
            RelocationKind::Addr => target.value as i64 + rel.add,
            RelocationKind::Size => target.size as i64 + rel.add,
            RelocationKind::PcRel => (target.value as i64 + rel.add) - pcrel_origin as i64,
            RelocationKind::Relative => continue,
            RelocationKind::Arch(_) => match arch.eval(&rel, &target, target.value, site_vaddr)? {
                Some(v) => v,
                None => {
                    diag.report(
                        Some(&store.get(id).name),
                        "architecture relocation evaluator did not recognize this relocation kind",
                    );
                    continue;
                }
            },
        };

        if !likely(fits(value, width)) {
            return Err(relocation_error(format!(
                "relocation against {} at offset {} does not fit a {width}-byte field",
                target.name, rel.off
            )));
        }

        let off = rel.off as usize;
        ByteOrder::Little.write(&mut store.get_mut(id).payload[off..off + width], value as u64);
    }
    Ok(())
}

fn fits(value: i64, width: usize) -> bool {
    match width {
        1 => i8::try_from(value).is_ok() || u8::try_from(value).is_ok(),
        2 => i16::try_from(value).is_ok() || u16::try_from(value).is_ok(),
        4 => i32::try_from(value).is_ok() || u32::try_from(value).is_ok(),
        8 => true,
        _ => false,
    }
}

/// Runs [`relocsym`] over every symbol in `order`, in the given order.
/// Must run after address assignment and before [`codeblk`]/[`datblk`],
/// since relocation values are computed from final virtual addresses.
pub fn reloc(
    store: &mut SymbolStore,
    diag: &mut Diagnostics,
    cfg: &TargetConfig,
    arch: &dyn ArchReloc,
    order: &[SymbolId],
) -> Result<()> {
    for &id in order {
        relocsym(store, diag, cfg, arch, id)?;
    }
    Ok(())
}

/// Walks `order` (symbols already placed at final addresses) and streams
/// their bytes to `sink`, zero-filling any gap between one symbol's end
/// and the next symbol's start. Equivalent to `blk`.
///
/// A symbol whose `value` lies strictly before the current write position
/// is a phase-order violation — address assignment is supposed to produce
/// a strictly non-decreasing, non-overlapping sequence (`spec.md` §3's
/// placement invariant) — and is fatal per `spec.md` §7 ("phase-order
/// violations (current address ahead of a symbol's declared value)"),
/// rather than silently skipped or overwritten.
pub fn blk(store: &SymbolStore, sink: &mut dyn BlockSink, order: &[SymbolId]) -> Result<()> {
    let mut pos: Option<u64> = None;
    let zeros = [0u8; 512];

    for &id in order {
        let sym = store.get(id);
        if let Some(p) = pos {
            if unlikely(sym.value < p) {
                return Err(address_error(format!(
                    "emit position {p:#x} has already passed symbol {}'s address {:#x}",
                    sym.name, sym.value
                )));
            }
            if sym.value > p {
                let gap = sym.value - p;
                sink.on_event(BlockEvent::Gap { vaddr: p, len: gap });
                let mut remaining = gap;
                let mut at = p;
                while remaining > 0 {
                    let chunk = remaining.min(zeros.len() as u64) as usize;
                    sink.write(at, &zeros[..chunk]);
                    at += chunk as u64;
                    remaining -= chunk as u64;
                }
            }
        }
        if sym.kind.is_bss() {
            let mut remaining = sym.size;
            let mut at = sym.value;
            while remaining > 0 {
                let chunk = remaining.min(zeros.len() as u64) as usize;
                sink.write(at, &zeros[..chunk]);
                at += chunk as u64;
                remaining -= chunk as u64;
            }
        } else {
            sink.write(sym.value, &sym.payload);
        }
        sink.on_event(BlockEvent::Symbol {
            id,
            vaddr: sym.value,
            bytes: &sym.payload,
        });
        pos = Some(sym.value + sym.size);
    }
    Ok(())
}

/// `blk` restricted to `segtext`'s symbol order.
pub fn codeblk(store: &SymbolStore, sink: &mut dyn BlockSink, text_order: &[SymbolId]) -> Result<()> {
    blk(store, sink, text_order)
}

/// `blk` restricted to `segdata`'s symbol order.
pub fn datblk(store: &SymbolStore, sink: &mut dyn BlockSink, data_order: &[SymbolId]) -> Result<()> {
    blk(store, sink, data_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Arch, HeadType};
    use crate::encode::{add_addr, add_pcrel};
    use crate::error::Error;
    use crate::symbol::DEFAULT_VERSION;

    fn cfg() -> TargetConfig {
        TargetConfig {
            head_type: HeadType::Elf,
            arch: Arch::X86_64,
            flag_shared: false,
            ptr_size: 8,
            func_align: 16,
            init_text: 0x1000,
            init_rnd: 0x1000,
            headr: 0,
            pe_file_align: 0x200,
            is_obj: false,
        }
    }

    struct NoArch;
    impl ArchReloc for NoArch {
        fn eval(
            &self,
            _rel: &crate::symbol::Relocation,
            _sym: &crate::symbol::Symbol,
            _sym_value: u64,
            _p: u64,
        ) -> Result<Option<i64>> {
            Ok(None)
        }
    }

    #[test]
    fn addr_relocation_writes_absolute_target_address() {
        let mut store = SymbolStore::new();
        let target = store.intern("target", DEFAULT_VERSION, SymKind::Data);
        store.get_mut(target).value = 0x4000;
        let owner = store.intern("owner", DEFAULT_VERSION, SymKind::Data);
        add_addr(store.get_mut(owner), target, 4, 8);
        store.get_mut(owner).value = 0x5000;

        let mut diag = Diagnostics::new();
        relocsym(&mut store, &mut diag, &cfg(), &NoArch, owner).unwrap();
        assert!(!diag.has_errors());
        let bytes = &store.get(owner).payload[0..8];
        assert_eq!(ByteOrder::Little.read(bytes), 0x4004);
    }

    #[test]
    fn pcrel_relocation_is_relative_to_site_address() {
        let mut store = SymbolStore::new();
        let target = store.intern("target", DEFAULT_VERSION, SymKind::Data);
        store.get_mut(target).value = 0x2010;
        let owner = store.intern("owner", DEFAULT_VERSION, SymKind::Text);
        add_pcrel(store.get_mut(owner), target, 0, 4);
        store.get_mut(owner).value = 0x2000;

        let mut diag = Diagnostics::new();
        relocsym(&mut store, &mut diag, &cfg(), &NoArch, owner).unwrap();
        assert!(!diag.has_errors());
        let bytes = &store.get(owner).payload[0..4];
        let value = ByteOrder::Little.read(bytes) as i64 as i32;
        // target.value(0x2010) - (owner.value(0x2000) + off(0) + siz(4))
        assert_eq!(value, 0xc);
    }

    #[test]
    fn blk_zero_fills_gaps_between_symbols() {
        let mut store = SymbolStore::new();
        let a = store.intern("a", DEFAULT_VERSION, SymKind::Data);
        store.get_mut(a).value = 0;
        store.get_mut(a).size = 4;
        store.get_mut(a).payload = vec![1, 2, 3, 4];
        let b = store.intern("b", DEFAULT_VERSION, SymKind::Data);
        store.get_mut(b).value = 16;
        store.get_mut(b).size = 4;
        store.get_mut(b).payload = vec![9, 9, 9, 9];

        let mut written = Vec::new();
        let mut sink = |vaddr: u64, bytes: &[u8]| written.push((vaddr, bytes.to_vec()));
        blk(&store, &mut sink, &[a, b]).unwrap();

        assert_eq!(written[0], (0, vec![1, 2, 3, 4]));
        assert_eq!(written[1].0, 4);
        assert_eq!(written[1].1.len(), 12);
        assert!(written[1].1.iter().all(|&b| b == 0));
        assert_eq!(written[2], (16, vec![9, 9, 9, 9]));
    }

    #[test]
    fn blk_rejects_a_symbol_placed_before_the_current_emit_position() {
        let mut store = SymbolStore::new();
        let a = store.intern("a", DEFAULT_VERSION, SymKind::Data);
        store.get_mut(a).value = 8;
        store.get_mut(a).size = 8;
        store.get_mut(a).payload = vec![1; 8];
        let b = store.intern("b", DEFAULT_VERSION, SymKind::Data);
        store.get_mut(b).value = 4;
        store.get_mut(b).size = 4;
        store.get_mut(b).payload = vec![2; 4];

        let mut sink = |_vaddr: u64, _bytes: &[u8]| {};
        let err = blk(&store, &mut sink, &[a, b]).unwrap_err();
        assert!(matches!(err, Error::Address { .. }));
    }
}
