use crate::config::{HeadType, TargetConfig};
use crate::error::Result;
use crate::symbol::{Section, Segment, SymbolId, SymbolStore};
use std::borrow::Cow;

/// One `(X, eX)` boundary sentinel pair (`spec.md` §3: "For each
/// synthesized section there exist two sentinel symbols... whose values
/// bracket its address range", and §6's full list:
/// `text`/`etext`, `rodata`/`erodata`, `data`/`edata`, `bss`/`ebss`,
/// `noptrdata`/`enoptrdata`, `noptrbss`/`enoptrbss`, `typelink`/`etypelink`,
/// `gcdata`/`egcdata`, `gcbss`/`egcbss`, `gosymtab`/`egosymtab`,
/// `gopclntab`/`egopclntab`, `datarelro`/`edatarelro`). `base_name` is the
/// section name with its leading `.` stripped (`.rodata` → `rodata`); a
/// file-format writer intern `base_name`/`e{base_name}` as symbols with
/// `start`/`end` as their values.
#[derive(Debug, Clone)]
pub struct SectionBounds {
    pub base_name: Cow<'static, str>,
    pub start: u64,
    pub end: u64,
}

/// Names of the boundary sentinel symbols the address assigner defines,
/// analogous to `etext`/`edata`/`end`/`.../bss start-end` pairs a linker
/// conventionally exposes so runtime code can find its own image layout.
///
/// `text`/`data`/`bss` are kept as their own named fields since every
/// caller needs those three; [`BoundarySymbols::sections`] additionally
/// carries the full one-pair-per-output-section family `spec.md` §6 names
/// (`.rodata`/`.typelink`/`.gcdata`/`.gcbss`/`.gosymtab`/`.gopclntab`/
/// `.noptrdata`/`.noptrbss`/`.data.rel.ro`, plus any ELF-extension
/// sections), derived directly from each [`Section`]'s final `vaddr`/`len`
/// rather than duplicated into named fields one by one.
pub struct BoundarySymbols {
    /// `segtext`'s own start/end (`spec.md` §4.5's segment-level
    /// `segtext.vaddr`/`segtext.len`), spanning `.text` *and* every other
    /// `segtext`-resident section (`.rodata`, `.typelink`, ...) — for the
    /// `etext` sentinel specifically (bracketing `.text` alone), use
    /// `sections` (`base_name == "text"`).
    pub text_start: u64,
    pub text_end: u64,
    /// `segdata`'s own start/end, analogously spanning every
    /// `segdata`-resident section — for `edata` specifically use
    /// `sections` (`base_name == "data"`).
    pub data_start: u64,
    pub data_end: u64,
    pub bss_start: u64,
    pub bss_end: u64,
    /// The `end` sentinel: the address one past the last byte of the
    /// image (`spec.md` §6), i.e. the end of the last `segdata` section.
    pub end: u64,
    pub sections: Vec<SectionBounds>,
}

fn align_up(addr: u64, align: u64) -> u64 {
    let align = align.max(1);
    (addr + align - 1) & !(align - 1)
}

fn is_bss_section(name: &str) -> bool {
    matches!(name, ".bss" | ".noptrbss" | ".tbss")
}

/// Populates `fileoff`/`filelen` on every section in segment order, once
/// `vaddr`/`len` are final. The running cursor starts at `cfg.headr`
/// (space reserved for the file header) and each section abuts the
/// previous one directly, except at the text/data boundary where
/// `HeadType::Pe` rounds up to `cfg.pe_file_align` — ELF and Plan 9 carry
/// text straight into data with no padding, per `spec.md` §4.5.
/// `.bss`/`.noptrbss`/`.tbss` occupy no file bytes: their `filelen` is
/// zero even though `len` (their virtual extent) is not.
fn assign_file_offsets(cfg: &TargetConfig, sections: &mut [Section]) {
    let mut foff = cfg.headr;
    let mut entered_data = false;
    for sect in sections.iter_mut() {
        if sect.segment == Segment::Data && !entered_data {
            entered_data = true;
            if cfg.head_type == HeadType::Pe {
                foff = align_up(foff, cfg.pe_file_align);
            }
        }
        sect.fileoff = foff;
        sect.filelen = if is_bss_section(sect.name.as_ref()) {
            0
        } else {
            sect.len
        };
        foff += sect.filelen;
    }
}

/// Assigns final virtual addresses to every symbol across `sections`, in
/// two passes: `segtext` first starting at `cfg.init_text`
/// (`textaddress`), then `segdata` starting at the rounded-up end of text
/// (`address`). Rewrites each [`Section`]'s `vaddr`/`len` to final values
/// and every member symbol's `value` to its absolute address, then
/// rebases sub-symbols (`outer`/`sub` chains) so a child's `value` is
/// `outer.value + child.value` rather than an offset within the
/// aggregate, matching the original's final `datap` rebase pass.
///
/// Returns the boundary sentinel addresses and the full placement order
/// (`segtext` symbols, then `segdata` symbols) for use by
/// [`crate::relocate::codeblk`]/[`crate::relocate::datblk`].
pub fn assign_addresses(
    store: &mut SymbolStore,
    cfg: &TargetConfig,
    sections: &mut [Section],
) -> Result<(BoundarySymbols, Vec<SymbolId>)> {
    let mut text_order = Vec::new();
    let mut data_order = Vec::new();

    let mut va = cfg.init_text;
    let text_start = va;
    for sect in sections.iter_mut().filter(|s| s.segment == Segment::Text) {
        sect.vaddr = va;
        // `spec.md` §4.5 scopes the `FuncAlign` fallback to `textaddress`'s
        // own walk over `.text`'s function symbols; every other
        // `segtext`-resident section (`.rodata`, `.typelink`, `.gcdata`,
        // ...) uses the same explicit-or-size-derived rule as `segdata`
        // (`spec.md` §4.4's `aligndatsize`).
        let is_text = sect.name.as_ref() == ".text";
        for &id in &sect.symbols {
            let explicit = store.get(id).align;
            let align = if is_text {
                if explicit != 0 {
                    explicit
                } else {
                    cfg.func_align.max(1)
                }
            } else {
                crate::layout::effective_align(explicit, store.get(id).size, cfg.ptr_size)
            };
            va = align_up(va, align as u64);
            store.get_mut(id).value = va;
            va += store.get(id).size;
            text_order.push(id);
        }
        sect.len = va - sect.vaddr;
    }
    // Round the segment end up to the original's 128-byte boundary so a
    // following segment never shares a page-internal cache line with the
    // last text byte.
    let text_end = align_up(va, 128);

    let mut va = align_up(text_end, cfg.init_rnd).max(text_end);
    let data_start = va;
    for sect in sections.iter_mut().filter(|s| s.segment == Segment::Data) {
        sect.vaddr = va;
        for &id in &sect.symbols {
            let align = crate::layout::effective_align(store.get(id).align, store.get(id).size, cfg.ptr_size);
            va = align_up(va, align as u64);
            store.get_mut(id).value = va;
            va += store.get(id).size;
            data_order.push(id);
        }
        sect.len = va - sect.vaddr;
    }
    let data_end = va;

    let bss_start = sections
        .iter()
        .find(|s| s.name.as_ref() == ".bss")
        .map(|s| s.vaddr)
        .unwrap_or(data_end);
    let bss_end = sections
        .iter()
        .filter(|s| s.segment == Segment::Data)
        .filter(|s| matches!(s.name.as_ref(), ".bss" | ".noptrbss" | ".tbss"))
        .map(|s| s.vaddr + s.len)
        .max()
        .unwrap_or(bss_start);

    rebase_sub_symbols(store, &text_order);
    rebase_sub_symbols(store, &data_order);

    assign_file_offsets(cfg, sections);

    let mut order = text_order;
    order.extend(data_order);

    let section_bounds = sections
        .iter()
        .map(|s| SectionBounds {
            base_name: Cow::Owned(s.name.trim_start_matches('.').replace('.', "_")),
            start: s.vaddr,
            end: s.vaddr + s.len,
        })
        .collect();

    Ok((
        BoundarySymbols {
            text_start,
            text_end,
            data_start,
            data_end,
            bss_start,
            bss_end,
            end: data_end,
            sections: section_bounds,
        },
        order,
    ))
}

/// Rebases every sub-symbol of every symbol in `order` from an
/// aggregate-relative offset to an absolute address, now that the outer
/// symbol's own `value` has been assigned.
fn rebase_sub_symbols(store: &mut SymbolStore, order: &[SymbolId]) {
    for &outer in order {
        let outer_value = store.get(outer).value;
        for child in store.subs(outer) {
            let rel_off = store.get(child).value;
            store.get_mut(child).value = outer_value + rel_off;
        }
    }
}
