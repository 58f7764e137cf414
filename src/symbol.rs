use hashbrown::HashMap;
use std::borrow::Cow;

/// Index of a [`Symbol`] inside a [`SymbolStore`]. Stable for the lifetime
/// of the store; used everywhere a raw pointer or intrusive list link
/// would appear in a C linker (`outer`, `sub`, relocation targets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind of an output symbol. Determines which output section it is
/// admitted to and how the layout engine treats its payload.
///
/// Ordering here is *not* a literal transcription of the historical kind
/// enumeration; it is defined to satisfy exactly the operational
/// predicates the classifier and layout engine need (see
/// [`SymKind::is_data_range`] and [`SymKind::section_rank`]), per the
/// "named half-open ranges instead of hard-coded numeric thresholds"
/// principle. Two symbols of the same kind are ordered, within their
/// section, by size then name (see [`crate::classify::classify_and_sort`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SymKind {
    /// Machine code; lives in `segtext`.
    Text,
    /// An externally-defined symbol with no local definition; not
    /// admitted to any section by itself.
    Extern,
    /// Raw bytes taken from a writable loader-owned ELF section that
    /// isn't one of the named kinds below.
    ElfSectWritable,
    /// Pointer-containing but otherwise mutable data.
    NoPtrData,
    /// Data the loader makes read-only again after running initializers
    /// (RELRO).
    DataRelRo,
    /// General read-write initialized data.
    Data,
    /// Zero-initialized pointer-containing data.
    Bss,
    /// Zero-initialized pointer-free data.
    NoPtrBss,
    /// Zero-initialized thread-local storage.
    TlsBss,
    /// Read-only initialized data.
    Rodata,
    /// Raw bytes taken from a read-only loader-owned ELF section.
    ElfSectReadOnly,
    /// Runtime type descriptor.
    TypeLink,
    /// GC pointer bitmap / program for pointer-containing data.
    GcData,
    /// GC pointer bitmap / program for pointer-containing bss.
    GcBss,
    /// Symbol-table metadata consumed by the runtime, not user code.
    GoSymTab,
    /// PC-to-line-number table.
    GoPclnTab,
    /// Cross-reference record; the classifier's upper fence — nothing at
    /// or beyond this kind is admitted to `segdata`/`segtext`.
    Xref,
    /// An inlined constant; never occupies storage.
    Const,
    /// A symbol satisfied by a dynamic import at load time.
    DynImport,
}

impl SymKind {
    /// True for kinds the classifier admits into the sorted `datap` list
    /// (`spec.md` §4.2: "reachable, not special, kind strictly between
    /// `TEXT` and `XREF`"). Expressed as explicit membership rather than a
    /// numeric range comparison, since the kind enum above is not a
    /// contiguous range between `Text` and `Xref` in declaration order.
    pub fn is_data_range(self) -> bool {
        !matches!(
            self,
            SymKind::Text | SymKind::Extern | SymKind::Xref | SymKind::Const | SymKind::DynImport
        )
    }

    /// True for kinds laid out in `segtext` (machine code plus read-only
    /// data: `.rodata` and the single-kind read-only sections, per
    /// `spec.md` §4.4's `segtext` section order) rather than `segdata`.
    pub fn in_segtext(self) -> bool {
        matches!(
            self,
            SymKind::Text
                | SymKind::Rodata
                | SymKind::TypeLink
                | SymKind::GcData
                | SymKind::GcBss
                | SymKind::GoSymTab
                | SymKind::GoPclnTab
                | SymKind::ElfSectReadOnly
        )
    }

    /// Rank used to order sections within `segdata`, lowest first. Callers
    /// needing the exact section walk order should prefer
    /// [`crate::layout::build_sections`]'s returned section list, which is
    /// derived from this ranking once and reused for every subsequent
    /// pass rather than being recomputed symbol-by-symbol.
    pub fn section_rank(self) -> u32 {
        match self {
            SymKind::Text => 0,
            // segtext, read-only: .rodata, then the named single-kind
            // sections, with residual ELF-extension sections placed last
            // rather than first.
            SymKind::Rodata => 10,
            SymKind::TypeLink => 11,
            SymKind::GcData => 12,
            SymKind::GcBss => 13,
            SymKind::GoSymTab => 14,
            SymKind::GoPclnTab => 15,
            SymKind::ElfSectReadOnly => 16,
            // segdata, writable: ELF-extension sections first, then
            // noptrdata/datarelro/data/bss/noptrbss/tbss.
            SymKind::ElfSectWritable => 20,
            SymKind::NoPtrData => 21,
            SymKind::DataRelRo => 22,
            SymKind::Data => 23,
            SymKind::Bss => 24,
            SymKind::NoPtrBss => 25,
            SymKind::TlsBss => 26,
            SymKind::Extern | SymKind::Xref | SymKind::Const | SymKind::DynImport => u32::MAX,
        }
    }

    /// True for kinds whose storage is zero-filled rather than backed by
    /// explicit payload bytes (`Bss`-family).
    pub fn is_bss(self) -> bool {
        matches!(self, SymKind::Bss | SymKind::NoPtrBss | SymKind::TlsBss)
    }
}

bitflags::bitflags! {
    /// Flags on a [`Section`], mirroring ELF section-header flag bits
    /// closely enough that a file-format writer can translate directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        const WRITE = 1 << 0;
        const ALLOC = 1 << 1;
        const EXEC  = 1 << 2;
        const TLS   = 1 << 3;
    }
}

/// Which top-level segment a [`Section`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Text,
    Data,
}

/// An output section: a contiguous, named, address-ordered run of symbols
/// of compatible kind.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: Cow<'static, str>,
    pub flags: SectionFlags,
    pub segment: Segment,
    pub vaddr: u64,
    pub len: u64,
    /// Byte offset of this section's content in the output file, computed
    /// by [`crate::address::assign_addresses`] per `spec.md` §4.5's
    /// `HEADTYPE`-dependent rule (`spec.md` §6: exposed to the file-format
    /// writer alongside `vaddr`/`len`). Zero until address assignment runs.
    pub fileoff: u64,
    /// Byte length of this section's *stored* content — equal to `len`
    /// except for zero-initialized sections (`.bss`/`.noptrbss`/`.tbss`),
    /// which occupy virtual address space but no file bytes at all.
    pub filelen: u64,
    /// Symbols assigned to this section, in final address order.
    pub symbols: Vec<SymbolId>,
}

impl Section {
    pub(crate) fn new(name: &'static str, flags: SectionFlags, segment: Segment) -> Self {
        Section {
            name: Cow::Borrowed(name),
            flags,
            segment,
            vaddr: 0,
            len: 0,
            fileoff: 0,
            filelen: 0,
            symbols: Vec::new(),
        }
    }
}

/// Kind of a [`Relocation`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    /// Store the symbol's absolute address plus addend.
    Addr,
    /// Store `(symbol address + addend) - relocation site address`.
    PcRel,
    /// Store the symbol's size plus addend.
    Size,
    /// A load-time RELATIVE fixup bookkeeping entry (`spec.md` §4.3's
    /// ELF/shared RELATIVE record), appended only to the dedicated dynamic
    /// relocation symbol's own `relocations` list. Unlike `Addr`/`PcRel`/
    /// `Size`, this is never resolved against a payload byte range by
    /// [`crate::relocate::relocsym`] — `sym` names the symbol whose slot
    /// needs a load-time base-relative fixup and `add` carries the byte
    /// offset of that slot within `sym`'s own payload; the RELATIVE
    /// table's concrete on-disk byte format belongs to the file-format
    /// writer (out of scope, `spec.md` §1).
    Relative,
    /// Architecture- or format-specific kind, numbered starting at 256,
    /// dispatched to `ArchReloc`/`DynRelHandler` rather than handled
    /// inline.
    Arch(u32),
}

/// A relocation record attached to a [`Symbol`].
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Byte offset within the symbol's payload where the computed value
    /// is stored.
    pub off: u32,
    /// Width in bytes of the stored value (1, 2, 4, or 8).
    pub siz: u8,
    pub kind: RelocationKind,
    /// Target symbol.
    pub sym: SymbolId,
    /// Constant added to the resolved value.
    pub add: i64,
}

/// An assembled symbol, prior to section assignment and address
/// resolution.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymKind,
    pub size: u64,
    /// Payload bytes. Empty for bss-kind symbols (size alone determines
    /// their footprint) and for symbols satisfied purely by relocations.
    pub payload: Vec<u8>,
    pub relocations: Vec<Relocation>,
    /// Explicit alignment, or `0` to derive one from `size`.
    pub align: u32,
    /// Final virtual address, filled in during address assignment.
    pub value: u64,
    /// Section this symbol was admitted to, filled in during layout.
    pub section: Option<Cow<'static, str>>,
    /// Whether anything still references this symbol; unreachable
    /// symbols are dropped by the classifier.
    pub reachable: bool,
    /// Runtime type descriptor, used for GC descriptor synthesis.
    pub gotype: Option<SymbolId>,
    /// Containing symbol, for symbols laid out as a sub-range of another
    /// (e.g. a string's bytes inside a combined string-data blob).
    pub outer: Option<SymbolId>,
    /// Head of this symbol's sub-symbol chain; traverse with
    /// [`Symbol::subs`].
    pub sub: Option<SymbolId>,
    /// Next sibling in the sub-symbol chain; not meant to be read
    /// directly, see [`Symbol::subs`].
    pub(crate) sub_next: Option<SymbolId>,
    /// PLT stub offset once synthesized; `-1` (`None`) until then.
    pub plt: Option<u32>,
    pub got: Option<u32>,
    /// Name to resolve against the dynamic loader at load time, for
    /// `DynImport`-kind symbols.
    pub dynimpname: Option<String>,
    pub dynexport: bool,
    /// Placed in the RELRO-protected range once the loader finishes
    /// running initializers.
    pub rel_ro: bool,
    /// Excluded from the classifier's normal section-admission walk;
    /// handled out of band (e.g. boundary sentinels).
    pub special: bool,
    /// Multiple definitions across input objects are permitted for this
    /// symbol (e.g. inlined generic instantiations); deduplication itself
    /// happens upstream of this crate.
    pub dupok: bool,
}

impl Symbol {
    pub(crate) fn new(name: impl Into<String>, kind: SymKind) -> Self {
        Symbol {
            name: name.into(),
            kind,
            size: 0,
            payload: Vec::new(),
            relocations: Vec::new(),
            align: 0,
            value: 0,
            section: None,
            reachable: true,
            gotype: None,
            outer: None,
            sub: None,
            sub_next: None,
            plt: None,
            got: None,
            dynimpname: None,
            dynexport: false,
            rel_ro: false,
            special: false,
            dupok: false,
        }
    }
}

/// Disambiguates symbols sharing a name across compilation units
/// (`spec.md:167`: "`lookup(name, version) → symbol`: intern/resolve a
/// symbol by name"). `0` is the default version, used for ordinarily
/// visible symbols; a non-zero version distinguishes a file-local
/// definition (e.g. a `static`-equivalent symbol) from a same-named
/// symbol interned under the default version by another object.
pub type SymbolVersion = i32;

/// The version ordinarily visible symbols are interned under.
pub const DEFAULT_VERSION: SymbolVersion = 0;

/// Owning arena of [`Symbol`]s with a name+version interning index,
/// replacing the intrusive `allsym` linked list with stable [`SymbolId`]
/// handles.
#[derive(Debug, Default)]
pub struct SymbolStore {
    symbols: Vec<Symbol>,
    index: HashMap<(String, SymbolVersion), SymbolId>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(
        &mut self,
        name: impl Into<String>,
        version: SymbolVersion,
        kind: SymKind,
    ) -> SymbolId {
        let name = name.into();
        let key = (name.clone(), version);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol::new(name, kind));
        self.index.insert(key, id);
        id
    }

    pub fn lookup(&self, name: &str, version: SymbolVersion) -> Option<SymbolId> {
        self.index.get(&(name.to_owned(), version)).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> {
        (0..self.symbols.len()).map(|i| SymbolId(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    /// Appends `child` to `parent`'s sub-symbol chain, walked by
    /// [`Symbol::subs`]. Mirrors the original's singly-linked `sub` field
    /// manipulation but keeps the tail pointer implicit (append is O(n)
    /// in chain length, which in practice is short: a handful of
    /// sub-symbols per aggregate).
    pub fn attach_sub(&mut self, parent: SymbolId, child: SymbolId) {
        self.get_mut(child).outer = Some(parent);
        let mut cursor = parent;
        loop {
            let next = self.get(cursor).sub_next.or(if cursor == parent {
                self.get(parent).sub
            } else {
                None
            });
            match next {
                Some(n) => cursor = n,
                None => break,
            }
        }
        if self.get(parent).sub.is_none() {
            self.get_mut(parent).sub = Some(child);
        } else {
            self.get_mut(cursor).sub_next = Some(child);
        }
    }

    /// Iterates a symbol's sub-symbols in attachment order.
    pub fn subs(&self, parent: SymbolId) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut cursor = self.get(parent).sub;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.get(id).sub_next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_distinguishes_same_name_by_version() {
        let mut store = SymbolStore::new();
        let global = store.intern("pkg.x", DEFAULT_VERSION, SymKind::Data);
        let local = store.intern("pkg.x", 1, SymKind::Data);

        assert_ne!(global, local);
        assert_eq!(store.lookup("pkg.x", DEFAULT_VERSION), Some(global));
        assert_eq!(store.lookup("pkg.x", 1), Some(local));
        assert_eq!(store.lookup("pkg.x", 2), None);
        // Re-interning under the same name and version resolves the
        // existing symbol rather than creating a new one.
        assert_eq!(store.intern("pkg.x", DEFAULT_VERSION, SymKind::Data), global);
    }
}
