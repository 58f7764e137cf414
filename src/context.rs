use crate::address::{assign_addresses, BoundarySymbols};
use crate::classify::{classify_and_sort, collect_text_order};
use crate::config::{ArchReloc, GcTypeProgram, TargetConfig};
use crate::diag::Diagnostics;
use crate::dynrel::preprocess_dynamic_relocations;
use crate::error::Result;
use crate::layout::{
    build_gc_sections, build_sections, build_text_section, promote_bss_with_payload,
    promote_rel_ro,
};
use crate::relocate::{reloc, DynRelHandler};
use crate::symbol::{Section, SymbolId, SymbolStore};

/// The final product of [`LinkContext::link`]: every output section at
/// its assigned virtual address, the boundary sentinel addresses, and the
/// full symbol placement order ready for
/// [`crate::relocate::codeblk`]/[`crate::relocate::datblk`] to stream to a
/// file-format writer.
pub struct LinkedImage {
    pub sections: Vec<Section>,
    pub bounds: BoundarySymbols,
    /// Every placed symbol, `segtext` first then `segdata`, in final
    /// address order.
    pub order: Vec<SymbolId>,
}

/// Owns the symbol arena and diagnostic sink for one link, and drives the
/// six phases (classify & sort, dynamic-relocation preprocessing, layout —
/// including GC descriptor synthesis, address assignment, relocation
/// resolution, block emission) in the fixed order `spec.md` requires,
/// rather than leaving phase ordering to whatever the caller happens to
/// invoke first.
///
/// Each phase is also exposed as a free function in its own module for
/// callers that need to interleave something crate-external between two
/// phases; `link` is the common case where no interleaving is needed.
pub struct LinkContext {
    pub store: SymbolStore,
    pub config: TargetConfig,
    pub diagnostics: Diagnostics,
}

impl LinkContext {
    pub fn new(config: TargetConfig) -> Self {
        LinkContext {
            store: SymbolStore::new(),
            config,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Runs every phase through relocation resolution. Block emission is
    /// left to the caller (via [`crate::relocate::codeblk`] /
    /// [`crate::relocate::datblk`]) since it streams to a sink the caller
    /// provides, rather than returning an owned buffer.
    ///
    /// `stub_section` receives synthesized PE PLT-style trampolines
    /// (`spec.md` §4.3); `reloc_section` accumulates ELF-shared `Relative`
    /// bookkeeping entries (also §4.3). Both are ordinary symbols the
    /// caller interns beforehand, so their own placement and addressing
    /// fall out of the normal layout/address-assignment walk like any
    /// other symbol.
    pub fn link(
        &mut self,
        stub_section: SymbolId,
        reloc_section: SymbolId,
        arch: &dyn ArchReloc,
        dynrel_handler: &mut dyn DynRelHandler,
        gc_types: &dyn GcTypeProgram,
    ) -> Result<LinkedImage> {
        // First classification pass (`spec.md` §4.2): promote bss-kind
        // symbols that were given explicit payload bytes, before anything
        // sorts or places them.
        for id in self.store.ids().collect::<Vec<_>>() {
            promote_bss_with_payload(&mut self.store, &mut self.diagnostics, id);
        }

        preprocess_dynamic_relocations(
            &mut self.store,
            &mut self.diagnostics,
            &self.config,
            stub_section,
            reloc_section,
            dynrel_handler,
        )?;

        // Second classification pass: the preprocessor above may have set
        // `rel_ro` on data symbols, which only now promotes them to
        // `DataRelRo` so they sort into `.data.rel.ro`.
        for id in self.store.ids().collect::<Vec<_>>() {
            promote_rel_ro(&mut self.store, id);
        }

        let datap = classify_and_sort(&self.store);
        let textp = collect_text_order(&self.store);

        let mut sections = Vec::with_capacity(datap.len() + 1);
        sections.push(build_text_section(&textp));
        sections.extend(build_sections(&mut self.store, &datap, self.config.ptr_size)?);
        build_gc_sections(&mut self.store, gc_types, self.config.ptr_size, &mut sections);

        let (bounds, order) = assign_addresses(&mut self.store, &self.config, &mut sections)?;
        reloc(&mut self.store, &mut self.diagnostics, &self.config, arch, &order)?;

        Ok(LinkedImage {
            sections,
            bounds,
            order,
        })
    }
}
