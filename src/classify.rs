use crate::symbol::{SymKind, SymbolId, SymbolStore};

/// True for symbols the layout engine admits to the sorted `datap` walk:
/// reachable, not excluded from normal placement, and of a kind in the
/// data range (see [`SymKind::is_data_range`]).
pub fn is_data_symbol(store: &SymbolStore, id: SymbolId) -> bool {
    let sym = store.get(id);
    sym.reachable && !sym.special && sym.kind.is_data_range()
}

/// Builds the sorted `datap` list: every admitted symbol, ordered by
/// `(section_rank(kind), size, name)`.
///
/// Sorting by size ascending within a kind keeps small, frequently-padded
/// symbols (e.g. zero-length markers) from scattering large ones across
/// alignment boundaries; sorting by name breaks ties deterministically so
/// layout is reproducible across runs with the same input set.
pub fn classify_and_sort(store: &SymbolStore) -> Vec<SymbolId> {
    let mut datap: Vec<SymbolId> = store
        .ids()
        .filter(|&id| is_data_symbol(store, id))
        .collect();

    datap.sort_by(|&a, &b| {
        let sa = store.get(a);
        let sb = store.get(b);
        sa.kind
            .section_rank()
            .cmp(&sb.kind.section_rank())
            .then_with(|| sa.size.cmp(&sb.size))
            .then_with(|| sa.name.cmp(&sb.name))
    });

    datap
}

/// Builds `textp`: every reachable, non-special `Text`-kind symbol, in
/// definition order (the order they were interned in). Unlike `datap`,
/// text symbols are never sorted by size/name — a compiler's function
/// emission order is semantically meaningful (e.g. hot/cold splitting,
/// call-graph locality) in a way `datap`'s interchangeable data blobs are
/// not, so this crate preserves it rather than re-deriving an order.
///
/// Deliberately narrower than [`SymKind::in_segtext`] (which also admits
/// `Rodata`/`TypeLink`/the other read-only-section kinds, for
/// [`crate::layout::segment_for`]'s `Segment::Text` vs `Segment::Data`
/// routing): those kinds are built into their own sections by
/// [`crate::layout::build_sections`] from `datap`, not folded into
/// `.text` itself.
pub fn collect_text_order(store: &SymbolStore) -> Vec<SymbolId> {
    store
        .ids()
        .filter(|&id| {
            let sym = store.get(id);
            sym.reachable && !sym.special && sym.kind == SymKind::Text
        })
        .collect()
}
