//! Data-layout and relocation core of a static linker.
//!
//! This crate partitions already-assembled symbols into output sections,
//! assigns final virtual addresses, resolves relocations into concrete
//! bytes, synthesizes GC descriptors and PLT/GOT-style dynamic-import
//! trampolines, and emits image blocks in address order.
//!
//! It does not read object files, write output files, or decode
//! architecture-specific relocation kinds outside the small set wired up
//! in [`arch`] — those are supplied by the embedding linker through the
//! traits in [`config`] and [`relocate`].

mod address;
mod arch;
mod classify;
mod config;
mod context;
mod diag;
mod dynrel;
mod encode;
mod error;
mod layout;
mod relocate;
mod symbol;

pub use address::{assign_addresses, BoundarySymbols, SectionBounds};
pub use arch::{ArmReloc, X86Reloc, X86_64Reloc, EM_386, EM_ARM, EM_X86_64};
pub use classify::{classify_and_sort, collect_text_order, is_data_symbol};
pub use config::{Arch, ArchReloc, GcTypeProgram, HeadType, IeeeFloatConvert, TargetConfig};
pub use context::{LinkContext, LinkedImage};
pub use diag::{Diagnostic, Diagnostics};
pub use dynrel::preprocess_dynamic_relocations;
pub use encode::{
    add_addr, add_addr4, add_pcrel, add_size, add_string, add_uint, grow, save_data, set_uint,
    ByteOrder, DataSpec,
};
pub use error::{custom_error, Error, Result};
pub use layout::{
    add_typelink_entry, build_gc_sections, build_sections, build_text_section, gc_add_symbol,
    gc_finish_section, gc_reserve_header, promote_bss_with_payload, promote_rel_ro, GcOpcode,
};
pub use relocate::{blk, codeblk, datblk, reloc, relocsym, BlockEvent, BlockSink, DynRelHandler};
pub use symbol::{
    Relocation, RelocationKind, Section, SectionFlags, Segment, Symbol, SymKind, SymbolId,
    SymbolStore, SymbolVersion, DEFAULT_VERSION,
};
