use crate::config::GcTypeProgram;
use crate::diag::Diagnostics;
use crate::encode::{add_addr, add_pcrel, add_uint, set_uint, ByteOrder};
use crate::error::{layout_error, Result};
use crate::symbol::{Section, SectionFlags, Segment, SymKind, SymbolId, SymbolStore};

/// GC pointer-map program opcodes, appended to a type's GC descriptor by
/// [`gc_add_symbol`]. Each opcode tag (and, for `Call`/`Aptr`, the offset
/// that follows it) is written pointer-size wide, matching the original's
/// `adduintxx(gc, GC_CALL, PtrSize)`/`adduintxx(gc, off, PtrSize)` — a
/// one-byte tag would misalign every subsequent field on a PtrSize-aligned
/// reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcOpcode {
    /// A pointer-typed word at a known offset, followed by a PC-relative
    /// reference to the type's GC program.
    Call,
    /// An untyped (conservatively-scanned) pointer word at a known offset.
    Aptr,
    /// Terminates the program.
    End,
}

impl GcOpcode {
    const TAG_END: u64 = 0;
    const TAG_CALL: u64 = 1;
    const TAG_APTR: u64 = 2;

    fn tag(self) -> u64 {
        match self {
            GcOpcode::End => Self::TAG_END,
            GcOpcode::Call => Self::TAG_CALL,
            GcOpcode::Aptr => Self::TAG_APTR,
        }
    }
}

/// Section names and flags for every kind admitted to `segdata`/`segtext`,
/// in the order the layout engine walks them. Defined once here (rather
/// than recomputed per symbol) since [`SymKind::section_rank`] only needs
/// to be consulted during sorting, not during the section walk itself.
const SECTION_TABLE: &[(SymKind, &str, SectionFlags)] = &[
    (SymKind::Text, ".text", SectionFlags::ALLOC.union(SectionFlags::EXEC)),
    (SymKind::Rodata, ".rodata", SectionFlags::ALLOC),
    (SymKind::TypeLink, ".typelink", SectionFlags::ALLOC),
    (SymKind::GcData, ".gcdata", SectionFlags::ALLOC),
    (SymKind::GcBss, ".gcbss", SectionFlags::ALLOC),
    (SymKind::GoSymTab, ".gosymtab", SectionFlags::ALLOC),
    (SymKind::GoPclnTab, ".gopclntab", SectionFlags::ALLOC),
    (SymKind::ElfSectReadOnly, ".rodata.elf", SectionFlags::ALLOC),
    (
        SymKind::ElfSectWritable,
        ".data.elf",
        SectionFlags::ALLOC.union(SectionFlags::WRITE),
    ),
    (
        SymKind::NoPtrData,
        ".noptrdata",
        SectionFlags::ALLOC.union(SectionFlags::WRITE),
    ),
    (
        SymKind::DataRelRo,
        ".data.rel.ro",
        SectionFlags::ALLOC.union(SectionFlags::WRITE),
    ),
    (
        SymKind::Data,
        ".data",
        SectionFlags::ALLOC.union(SectionFlags::WRITE),
    ),
    (
        SymKind::Bss,
        ".bss",
        SectionFlags::ALLOC.union(SectionFlags::WRITE),
    ),
    (
        SymKind::NoPtrBss,
        ".noptrbss",
        SectionFlags::ALLOC.union(SectionFlags::WRITE),
    ),
    (
        SymKind::TlsBss,
        ".tbss",
        SectionFlags::ALLOC
            .union(SectionFlags::WRITE)
            .union(SectionFlags::TLS),
    ),
];

/// Builds the `.text` section directly from `textp` (see
/// [`crate::classify::collect_text_order`]) rather than from the sorted
/// `datap` list: `spec.md` §4.2 excludes `Text` from the data classifier
/// ("kind strictly between `TEXT` and `XREF`"), and §4.4 gives `.text` its
/// own population rule ("populated separately by `textaddress`") instead
/// of the generic per-kind walk [`build_sections`] performs for the rest
/// of `segtext`/`segdata`.
///
/// No offset assignment happens here, unlike `build_sections`'s running
/// section-relative offset — `.text`'s packing (including `FuncAlign`) is
/// [`crate::address::assign_addresses`]'s job, since the original
/// interleaves alignment with absolute address assignment for text
/// specifically (`textaddress`) rather than with a section-relative
/// pre-pass.
pub fn build_text_section(textp: &[SymbolId]) -> Section {
    let mut sect = Section::new(
        ".text",
        SectionFlags::ALLOC.union(SectionFlags::EXEC),
        Segment::Text,
    );
    sect.symbols = textp.to_vec();
    sect
}

fn segment_for(kind: SymKind) -> Segment {
    if kind.in_segtext() {
        Segment::Text
    } else {
        Segment::Data
    }
}

/// Rounds `off` up to a multiple of `align` (`align` must be a power of
/// two), equivalent to `aligndatsize`'s rounding step.
fn align_up(off: u64, align: u32) -> u64 {
    let align = align.max(1) as u64;
    (off + align - 1) & !(align - 1)
}

/// Derives the alignment a symbol gets when it set none explicitly
/// (`spec.md` §4.4/§4.5's `alignsymsize`): sizes of 8 bytes or more align
/// to 8, sizes at least a pointer wide align to the pointer width, sizes
/// greater than 2 bytes align to 4, and anything smaller carries no
/// constraint.
pub(crate) fn implicit_align(size: u64, ptr_size: u8) -> u32 {
    if size >= 8 {
        8
    } else if size >= ptr_size as u64 {
        ptr_size as u32
    } else if size > 2 {
        4
    } else {
        1
    }
}

/// `explicit` if the symbol set `align != 0`, otherwise the size-derived
/// implicit alignment.
pub(crate) fn effective_align(explicit: u32, size: u64, ptr_size: u8) -> u32 {
    if explicit != 0 {
        explicit
    } else {
        implicit_align(size, ptr_size)
    }
}

/// Walks `datap` (as produced by [`crate::classify::classify_and_sort`])
/// and assigns each admitted symbol to its output [`Section`], in the
/// fixed order given by [`SECTION_TABLE`]. `datap` must already be sorted
/// by `(section_rank, size, name)`; this function groups runs of equal
/// rank into one section rather than re-sorting.
///
/// Returns one [`Section`] per kind present in `datap`, each carrying its
/// symbols in final intra-section order and its `len` set to the
/// kind-local end offset (not yet a virtual address; that is
/// [`crate::address::assign_addresses`]'s job).
///
/// Every kind admitted to `datap` by [`crate::classify::is_data_symbol`]
/// must have an entry in [`SECTION_TABLE`] — a kind with no section to go
/// to is a "symbol kind unexpected for its section" phase-order violation
/// (`spec.md` §7's fatal category), not a value to silently place into an
/// improvised nameless section.
pub fn build_sections(
    store: &mut SymbolStore,
    datap: &[SymbolId],
    ptr_size: u8,
) -> Result<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_kind: Option<SymKind> = None;
    let mut offset: u64 = 0;

    for &id in datap {
        let kind = store.get(id).kind;
        if current_kind != Some(kind) {
            if current_kind.is_some() {
                if let Some(sect) = sections.last_mut() {
                    sect.len = offset;
                }
            }
            let (_, name, flags) = SECTION_TABLE
                .iter()
                .find(|(k, _, _)| *k == kind)
                .copied()
                .ok_or_else(|| {
                    layout_error(format!(
                        "symbol {} has kind {kind:?}, which has no output section",
                        store.get(id).name
                    ))
                })?;
            sections.push(Section::new(name, flags, segment_for(kind)));
            current_kind = Some(kind);
            offset = 0;
        }

        let size = store.get(id).size;
        let align = effective_align(store.get(id).align, size, ptr_size);
        offset = align_up(offset, align);
        store.get_mut(id).value = offset;
        offset += size;
        sections.last_mut().unwrap().symbols.push(id);
    }

    if let Some(sect) = sections.last_mut() {
        sect.len = offset;
    }

    Ok(sections)
}

/// Synthesizes a GC descriptor program entry for `target` into `gc_sym`,
/// equivalent to `gcaddsym`. `off` is `target`'s offset within its own
/// output section (`datsize - sect->vaddr` in the original, i.e. before
/// the address assigner rebases `value` to an absolute address).
///
/// Per `spec.md` §4.4: emits nothing if `target.size < ptr_size` or
/// `target.name == ".string"`. Otherwise, if `target.gotype` resolves to a
/// GC program, emits one [`GcOpcode::Call`] entry (opcode, offset, a
/// `PcRel` reference to the program, and — on 64-bit — a trailing 4-byte
/// zero word for alignment); otherwise conservatively emits one
/// [`GcOpcode::Aptr`] entry per pointer-aligned word spanning the symbol.
pub fn gc_add_symbol(
    store: &mut SymbolStore,
    gc_types: &dyn GcTypeProgram,
    gc_sym: SymbolId,
    ptr_size: u8,
    off: u64,
    target: SymbolId,
) {
    let size = store.get(target).size;
    if size < ptr_size as u64 || store.get(target).name == ".string" {
        return;
    }

    let gotype = store.get(target).gotype;
    match gotype.and_then(|t| gc_types.program_for(t)) {
        Some(program) => {
            add_uint(store.get_mut(gc_sym), ByteOrder::Little, GcOpcode::Call.tag(), ptr_size as usize);
            add_uint(store.get_mut(gc_sym), ByteOrder::Little, off, ptr_size as usize);
            add_pcrel(store.get_mut(gc_sym), program, 3 * ptr_size as i64 + 4, 4);
            if ptr_size == 8 {
                add_uint(store.get_mut(gc_sym), ByteOrder::Little, 0, 4);
            }
        }
        None => {
            let ptr_size = ptr_size as u64;
            let mut a = (ptr_size - (off % ptr_size)) % ptr_size;
            while a + ptr_size <= size {
                add_uint(store.get_mut(gc_sym), ByteOrder::Little, GcOpcode::Aptr.tag(), ptr_size as usize);
                add_uint(store.get_mut(gc_sym), ByteOrder::Little, off + a, ptr_size as usize);
                a += ptr_size;
            }
        }
    }
}

/// Finishes a GC section after its symbol walk: appends the terminating
/// opcode and backpatches the reserved length header at offset 0 with
/// `section_len` — the byte length of the `.data`/`.bss` section this GC
/// program describes (`sect->len` in the original's
/// `setuintxx(gcdata1, 0, sect->len, PtrSize)`), *not* the GC program's
/// own byte length.
pub fn gc_finish_section(store: &mut SymbolStore, gc_sym: SymbolId, ptr_size: u8, section_len: u64) {
    add_uint(store.get_mut(gc_sym), ByteOrder::Little, GcOpcode::End.tag(), ptr_size as usize);
    set_uint(store.get_mut(gc_sym), ByteOrder::Little, 0, section_len, ptr_size as usize);
}

/// Reserves the length header slot at the start of a freshly-created GC
/// section symbol. Call once before the symbol walk that calls
/// [`gc_add_symbol`] for each member, then [`gc_finish_section`] after.
/// Always returns 0 — the header is always the program's first field —
/// kept as a return value so call sites document the invariant rather
/// than hard-coding the offset.
pub fn gc_reserve_header(store: &mut SymbolStore, gc_sym: SymbolId, ptr_size: u8) -> usize {
    add_uint(store.get_mut(gc_sym), ByteOrder::Little, 0, ptr_size as usize)
}

/// Promotes a bss-kind symbol that carries a non-empty payload to the
/// matching initialized-data kind (`spec.md` §4.2: "`BSS→DATA`,
/// `NOPTRBSS→NOPTRDATA`"): a symbol classified as zero-fill but given
/// explicit non-zero initializer bytes cannot be represented as pure
/// bss, so it moves to the writable-initialized section that actually
/// stores its payload. `TlsBss` is left alone — `spec.md` names only the
/// two non-TLS bss kinds for this promotion.
pub fn promote_bss_with_payload(store: &mut SymbolStore, diag: &mut Diagnostics, id: SymbolId) {
    let sym = store.get(id);
    if sym.payload.is_empty() {
        return;
    }
    let new_kind = match sym.kind {
        SymKind::Bss => Some(SymKind::Data),
        SymKind::NoPtrBss => Some(SymKind::NoPtrData),
        _ => None,
    };
    if let Some(new_kind) = new_kind {
        diag.report(
            Some(&sym.name),
            format!("bss-kind symbol carries explicit payload bytes; promoting to {new_kind:?}"),
        );
        store.get_mut(id).kind = new_kind;
    }
}

/// Second classification-pass promotion (`spec.md` §4.2: "After dynamic
/// preprocessing, symbols marked `rel_ro` are promoted to `DATARELRO`").
/// Must run after
/// [`crate::dynrel::preprocess_dynamic_relocations`], which is what sets
/// `rel_ro` in the first place, and before [`classify_and_sort`]'s
/// consuming sort so the symbol lands in `.data.rel.ro` instead of
/// `.data`.
pub fn promote_rel_ro(store: &mut SymbolStore, id: SymbolId) {
    let sym = store.get(id);
    if sym.rel_ro && sym.kind == SymKind::Data {
        store.get_mut(id).kind = SymKind::DataRelRo;
    }
}

fn section_table_index(name: &str) -> usize {
    SECTION_TABLE
        .iter()
        .position(|(_, n, _)| *n == name)
        .unwrap_or(SECTION_TABLE.len())
}

/// Synthesizes the `.gcdata`/`.gcbss` GC descriptor sections describing
/// the pointer layout of `.data`/`.bss`, and splices each into `sections`
/// at its fixed rank (per [`SECTION_TABLE`]). Equivalent to `dodata()`'s
/// interleaved walk that calls `gcaddsym` for every member of a
/// pointer-containing section while building that section's own content.
///
/// Must run after [`build_sections`] (each member's `value` is still a
/// section-relative offset, which is exactly the `off` [`gc_add_symbol`]
/// wants) and before [`crate::address::assign_addresses`] (which walks
/// `sections` in the order given, so the GC sections need to already be
/// in their final position).
pub fn build_gc_sections(
    store: &mut SymbolStore,
    gc_types: &dyn GcTypeProgram,
    ptr_size: u8,
    sections: &mut Vec<Section>,
) {
    const TARGETS: [(&str, SymKind, &str); 2] = [
        (".data", SymKind::GcData, ".gcdata"),
        (".bss", SymKind::GcBss, ".gcbss"),
    ];

    for (data_name, gc_kind, gc_name) in TARGETS {
        let Some(data_idx) = sections.iter().position(|s| s.name.as_ref() == data_name) else {
            continue;
        };
        let members = sections[data_idx].symbols.clone();
        let section_len = sections[data_idx].len;

        let gc_sym = store.intern(gc_name, DEFAULT_VERSION, gc_kind);
        gc_reserve_header(store, gc_sym, ptr_size);
        for &member in &members {
            let off = store.get(member).value;
            gc_add_symbol(store, gc_types, gc_sym, ptr_size, off, member);
        }
        gc_finish_section(store, gc_sym, ptr_size, section_len);

        let (_, name, flags) = SECTION_TABLE
            .iter()
            .find(|(k, _, _)| *k == gc_kind)
            .copied()
            .unwrap();
        let mut gc_section = Section::new(name, flags, segment_for(gc_kind));
        gc_section.len = store.get(gc_sym).payload.len() as u64;
        gc_section.symbols.push(gc_sym);

        let rank = section_table_index(name);
        let insert_at = sections
            .iter()
            .position(|s| section_table_index(s.name.as_ref()) > rank)
            .unwrap_or(sections.len());
        sections.insert(insert_at, gc_section);
    }
}

/// Links a `gotype`-bearing symbol's address into the `.typelink` table
/// via a 4-byte offset relocation, equivalent to the original's
/// `typelink` pass over reachable type descriptors.
pub fn add_typelink_entry(store: &mut SymbolStore, typelink_sym: SymbolId, ty: SymbolId) {
    add_addr(store.get_mut(typelink_sym), ty, 0, 4);
}
