//! Scenario-level integration tests exercising the full pipeline
//! (classify → layout → address assignment → relocation resolution)
//! through the public [`linkdata::LinkContext`] API, the way a linker
//! embedding this crate would drive it.

use linkdata::{
    Arch, ArchReloc, BlockSink, DynRelHandler, Error, HeadType, LinkContext, Relocation,
    SymKind, Symbol, SymbolId, SymbolStore, TargetConfig, DEFAULT_VERSION,
};

fn base_config() -> TargetConfig {
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
    fn eval(&self, _rel: &Relocation, _sym: &Symbol, _v: u64, _p: u64) -> linkdata::Result<Option<i64>> {
        Ok(None)
    }
}

struct NoopHandler;
impl DynRelHandler for NoopHandler {
    fn handle(
        &mut self,
        _store: &mut SymbolStore,
        _diag: &mut linkdata::Diagnostics,
        _owner: SymbolId,
        _rel_idx: usize,
    ) -> linkdata::Result<()> {
        Ok(())
    }
}

/// S1: a single pointer-sized ADDR relocation resolves to the target's
/// final absolute address.
#[test]
fn s1_single_pointer_addr_relocation() {
    let mut ctx = LinkContext::new(base_config());
    let stub = ctx.store.intern(".stub", DEFAULT_VERSION, SymKind::ElfSectReadOnly);
    let target = ctx.store.intern("main.counter", DEFAULT_VERSION, SymKind::Data);
    ctx.store.get_mut(target).size = 8;
    ctx.store.get_mut(target).align = 8;

    let ptr = ctx.store.intern("main.counter_ptr", DEFAULT_VERSION, SymKind::Data);
    ctx.store.get_mut(ptr).align = 8;
    linkdata::add_addr(ctx.store.get_mut(ptr), target, 0, 8);

    let reloc_section = ctx.store.intern(".rel.dyn", DEFAULT_VERSION, SymKind::NoPtrData);
    let no_gc_types = |_id: SymbolId| -> Option<SymbolId> { None };
    let image = ctx
        .link(stub, reloc_section, &NoArch, &mut NoopHandler, &no_gc_types)
        .unwrap();
    assert!(!ctx.diagnostics.has_errors());
    let _ = &image.order;

    let bytes = &ctx.store.get(ptr).payload[0..8];
    let value = linkdata::ByteOrder::Little.read(bytes);
    assert_eq!(value, ctx.store.get(target).value);
}

/// S2: a PC-relative call relocation resolves relative to the call site's
/// own final address, not the function's start.
#[test]
fn s2_pc_relative_call() {
    let mut ctx = LinkContext::new(base_config());
    let stub = ctx.store.intern(".stub", DEFAULT_VERSION, SymKind::ElfSectReadOnly);

    let callee = ctx.store.intern("pkg.callee", DEFAULT_VERSION, SymKind::Text);
    ctx.store.get_mut(callee).size = 16;
    ctx.store.get_mut(callee).payload = vec![0xc3; 16];

    let caller = ctx.store.intern("pkg.caller", DEFAULT_VERSION, SymKind::Text);
    ctx.store.get_mut(caller).payload = vec![0xe8, 0, 0, 0, 0, 0xc3];
    ctx.store.get_mut(caller).size = 6;
    linkdata::add_pcrel(ctx.store.get_mut(caller), callee, 0, 4);
    // add_pcrel appended a second placeholder; trim the test fixture back
    // down to a realistic single relocation site at offset 1.
    ctx.store.get_mut(caller).payload.truncate(6);
    ctx.store.get_mut(caller).relocations[0].off = 1;

    let reloc_section = ctx.store.intern(".rel.dyn", DEFAULT_VERSION, SymKind::NoPtrData);
    let no_gc_types = |_id: SymbolId| -> Option<SymbolId> { None };
    let image = ctx
        .link(stub, reloc_section, &NoArch, &mut NoopHandler, &no_gc_types)
        .unwrap();
    assert!(!ctx.diagnostics.has_errors());

    // PC-relative displacement is relative to the end of the 4-byte
    // relocated field (the address of the instruction following the
    // call), not the start of the field itself.
    let pcrel_origin = ctx.store.get(caller).value + 1 + 4;
    let disp = linkdata::ByteOrder::Little.read(&ctx.store.get(caller).payload[1..5]) as i64 as i32;
    assert_eq!(disp as i64, ctx.store.get(callee).value as i64 - pcrel_origin as i64);
    let _ = image;
}

/// S3: a bss-kind symbol that was given explicit non-zero payload bytes
/// is promoted to an initialized-data kind rather than silently
/// discarding its payload during zero-fill emission.
#[test]
fn s3_bss_with_payload_is_promoted_to_data() {
    let mut store = SymbolStore::new();
    let id = store.intern("pkg.preset", DEFAULT_VERSION, SymKind::Bss);
    store.get_mut(id).size = 4;
    store.get_mut(id).payload = vec![1, 2, 3, 4];

    let mut diag = linkdata::Diagnostics::new();
    linkdata::promote_bss_with_payload(&mut store, &mut diag, id);

    assert_eq!(store.get(id).kind, SymKind::Data);
    assert!(diag.has_errors());
}

/// S4: GC descriptor synthesis distinguishes a typed pointer (one that
/// has a resolvable GC program) from an untyped/conservatively-scanned
/// one, and backpatches the section length only once, after the whole
/// program has been appended.
#[test]
fn s4_gc_descriptor_for_typed_and_untyped_pointers() {
    let mut store = SymbolStore::new();
    let gc_sym = store.intern(".gcdata", DEFAULT_VERSION, SymKind::GcData);
    let header = linkdata::gc_reserve_header(&mut store, gc_sym, 8);
    assert_eq!(header, 0);

    let typed_gotype = store.intern("type.*int", DEFAULT_VERSION, SymKind::TypeLink);
    let program = store.intern("gcbits.typed", DEFAULT_VERSION, SymKind::Rodata);
    let typed = store.intern("pkg.typed_ptr", DEFAULT_VERSION, SymKind::Data);
    store.get_mut(typed).gotype = Some(typed_gotype);
    store.get_mut(typed).size = 8;

    // An untyped (conservatively-scanned) pointer placed right after
    // `typed` within the section, at section-relative offset 8.
    let untyped = store.intern("pkg.untyped_ptr", DEFAULT_VERSION, SymKind::Data);
    store.get_mut(untyped).size = 8;

    let program_table = |id: SymbolId| -> Option<SymbolId> {
        if id == typed_gotype {
            Some(program)
        } else {
            None
        }
    };

    linkdata::gc_add_symbol(&mut store, &program_table, gc_sym, 8, 0, typed);
    linkdata::gc_add_symbol(&mut store, &program_table, gc_sym, 8, 8, untyped);
    linkdata::gc_finish_section(&mut store, gc_sym, 8, 16);

    let recorded_len = linkdata::ByteOrder::Little.read(&store.get(gc_sym).payload[0..8]);
    assert_eq!(recorded_len, 16, "header records the .data section's length, not the gc program's own");

    // Layout: 8-byte header, then a GC_CALL entry (8-byte opcode + 8-byte
    // offset + 4-byte pcrel ref + 4-byte amd64 padding = 24 bytes), then a
    // GC_APTR entry (8-byte opcode + 8-byte offset = 16 bytes), then the
    // 8-byte GC_END terminator.
    assert_eq!(store.get(gc_sym).payload.len(), 8 + 24 + 16 + 8);

    let call_tag = linkdata::ByteOrder::Little.read(&store.get(gc_sym).payload[8..16]);
    assert_eq!(call_tag, 1, "GC_CALL tag");
    let call_off = linkdata::ByteOrder::Little.read(&store.get(gc_sym).payload[16..24]);
    assert_eq!(call_off, 0, "typed pointer's section-relative offset");

    let aptr_tag = linkdata::ByteOrder::Little.read(&store.get(gc_sym).payload[32..40]);
    assert_eq!(aptr_tag, 2, "GC_APTR tag");
    let aptr_off = linkdata::ByteOrder::Little.read(&store.get(gc_sym).payload[40..48]);
    assert_eq!(aptr_off, 8, "untyped pointer's section-relative offset");

    let end_tag = linkdata::ByteOrder::Little.read(&store.get(gc_sym).payload[48..56]);
    assert_eq!(end_tag, 0, "GC_END tag");
}

/// S5: an untyped pointer-sized symbol (no resolvable `gotype`) is scanned
/// conservatively — one `GC_APTR` record per pointer-aligned word it
/// spans, rather than a single typed `GC_CALL` entry.
#[test]
fn s5_conservative_gc_for_untyped_symbol() {
    let mut store = SymbolStore::new();
    let gc_sym = store.intern(".gcdata", DEFAULT_VERSION, SymKind::GcData);
    linkdata::gc_reserve_header(&mut store, gc_sym, 8);

    let q = store.intern("pkg.q", DEFAULT_VERSION, SymKind::Data);
    store.get_mut(q).size = 24;

    let no_types = |_id: SymbolId| -> Option<SymbolId> { None };
    linkdata::gc_add_symbol(&mut store, &no_types, gc_sym, 8, 0, q);
    linkdata::gc_finish_section(&mut store, gc_sym, 8, 24);

    // header(8) + three 16-byte GC_APTR entries + 8-byte GC_END.
    assert_eq!(store.get(gc_sym).payload.len(), 8 + 3 * 16 + 8);
    let offsets: Vec<u64> = (0..3)
        .map(|i| {
            let start = 8 + i * 16 + 8;
            linkdata::ByteOrder::Little.read(&store.get(gc_sym).payload[start..start + 8])
        })
        .collect();
    assert_eq!(offsets, vec![0, 8, 16]);
}

/// S6: symbols of mixed kinds and sizes are grouped one section per kind,
/// in the fixed section order, with each section's members in ascending
/// size/name order rather than definition order.
#[test]
fn s6_sorted_interleave_ordering() {
    let mut store = SymbolStore::new();
    let rodata_big = store.intern("rodata.big", DEFAULT_VERSION, SymKind::Rodata);
    store.get_mut(rodata_big).size = 64;
    let rodata_small = store.intern("rodata.small", DEFAULT_VERSION, SymKind::Rodata);
    store.get_mut(rodata_small).size = 4;
    let data_a = store.intern("data.a", DEFAULT_VERSION, SymKind::Data);
    store.get_mut(data_a).size = 8;
    let bss_a = store.intern("bss.a", DEFAULT_VERSION, SymKind::Bss);
    store.get_mut(bss_a).size = 32;

    let datap = linkdata::classify_and_sort(&store);
    let mut sections = linkdata::build_sections(&mut store, &datap, 8).unwrap();

    let names: Vec<_> = sections.iter().map(|s| s.name.to_string()).collect();
    assert_eq!(names, vec![".rodata", ".data", ".bss"]);
    assert_eq!(sections[0].symbols, vec![rodata_small, rodata_big]);

    let cfg = base_config();
    let (_, order) = linkdata::assign_addresses(&mut store, &cfg, &mut sections).unwrap();
    assert_eq!(order.len(), 4);
}

/// Beyond the six layout/relocation scenarios above: repeated relocations
/// against the same dynamic-import target under a PE configuration share
/// a single synthesized stub rather than each allocating their own.
#[test]
fn dynamic_import_trampoline_is_shared() {
    let mut cfg = base_config();
    cfg.head_type = HeadType::Pe;

    let mut ctx = LinkContext::new(cfg);
    let stub = ctx.store.intern(".stub", DEFAULT_VERSION, SymKind::ElfSectReadOnly);
    let dynimp = ctx.store.intern("KERNEL32.dll!ExitProcess", DEFAULT_VERSION, SymKind::DynImport);

    let caller_a = ctx.store.intern("main.a", DEFAULT_VERSION, SymKind::Text);
    ctx.store.get_mut(caller_a).payload = vec![0xe8, 0, 0, 0, 0];
    ctx.store.get_mut(caller_a).size = 5;
    linkdata::add_pcrel(ctx.store.get_mut(caller_a), dynimp, 0, 4);

    let caller_b = ctx.store.intern("main.b", DEFAULT_VERSION, SymKind::Text);
    ctx.store.get_mut(caller_b).payload = vec![0xe8, 0, 0, 0, 0];
    ctx.store.get_mut(caller_b).size = 5;
    linkdata::add_pcrel(ctx.store.get_mut(caller_b), dynimp, 0, 4);

    let reloc_section = ctx.store.intern(".rel.dyn", DEFAULT_VERSION, SymKind::NoPtrData);
    let no_gc_types = |_id: SymbolId| -> Option<SymbolId> { None };
    let result = ctx.link(stub, reloc_section, &NoArch, &mut NoopHandler, &no_gc_types);
    // The generic Arch-relocation diagnostic path does not apply here
    // (PcRel against a symbol now pointed at the synthesized stub
    // resolves like any other PcRel), so this should succeed cleanly.
    assert!(result.is_ok(), "{:?}", result.err().map(|e: Error| e.to_string()));
    assert!(ctx.store.get(dynimp).plt.is_some());
}
