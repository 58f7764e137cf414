use crate::config::TargetConfig;
use crate::diag::Diagnostics;
use crate::encode::{add_uint, grow, ByteOrder};
use crate::relocate::DynRelHandler;
use crate::symbol::{RelocationKind, SymKind, SymbolId, SymbolStore};
use crate::{config::HeadType, error::Result};

/// Windows 32-bit indirect-jump PLT stub: `jmp *abs32; nop; nop`.
const PE_STUB32: [u8; 8] = [0xff, 0x25, 0, 0, 0, 0, 0x90, 0x90];
/// Windows 64-bit indirect-jump PLT stub: `jmp *[rip+abs32]; nop`.
const PE_STUB64: [u8; 6] = [0xff, 0x24, 0x25, 0, 0, 0];
/// Windows ARM indirect-jump PLT stub, built from the same
/// load-GOT-slot-then-branch shape as [`crate::arch::arm`]'s ELF PLT
/// entry; `spec.md` §4.3 only gives literal byte sequences for the x86
/// and amd64 cases, so this is this crate's own trampoline for the third
/// supported architecture rather than a value transcribed from the spec.
const PE_STUB_ARM: [u8; 12] = [
    0x04, 0xc0, 0x9f, 0xe5, // ldr ip, [pc, #4]
    0x0c, 0xc0, 0x8c, 0xe0, // add ip, ip, pc
    0x00, 0xf0, 0x9c, 0xe5, // ldr pc, [ip]
];

/// Owner kinds the ELF/shared RELATIVE path admits (`spec.md` §4.3: "whose
/// containing symbol belongs to one of `{GOT, DATA, GOSTRING, TYPE,
/// RODATA}`"). This crate's [`SymKind`] has no separate `GOT`/`GOSTRING`
/// kind (string-literal blobs and GOT-like indirection slots are both
/// represented as plain `NoPtrData`/`Data` here), so `GOT`/`GOSTRING` are
/// folded into `NoPtrData`/`Data` and `TYPE` maps to `TypeLink`.
const RELRO_OWNER_KINDS: [SymKind; 4] = [
    SymKind::Data,
    SymKind::NoPtrData,
    SymKind::Rodata,
    SymKind::TypeLink,
];

/// Rewrites relocations so the final relocation pass can resolve without
/// further symbol lookup, and forwards anything architecture-specific
/// (`type >= 256`) to `handler`. Three independent paths, selected per
/// relocation rather than per symbol:
///
/// - **PE/Windows, `DynImport` target.** Synthesize (once per target — a
///   `DynImport` target may already have a stub from an earlier
///   relocation, `spec.md` §4.3: "subsequent relocations that already
///   have `plt >= 0` simply redirect without re-emitting the stub") an
///   indirect-jump stub in `stub_section`, pointing at a pointer-sized
///   import slot, and redirect the relocation at the stub instead of the
///   unresolved import.
/// - **Non-PE, `DynImport` target.** Any relocation kind against a
///   `DynImport` target is forwarded to `handler` unconditionally
///   (`spec.md` §4.3/the original's `dynrelocsym`: `r->sym->type ==
///   SDYNIMPORT || r->type >= 256`), not just architecture-specific
///   (`Arch(n) where n >= 256`) ones.
/// - **ELF shared object, `Addr` relocation against a defined local
///   target.** Push a `Relative`-kind bookkeeping entry onto
///   `reloc_section`'s own relocation list (the dynamic loader fixes this
///   up at load time) and, if the containing symbol is presently
///   writable-data-like, mark it `rel_ro` so the second classification
///   pass ([`crate::layout::promote_rel_ro`]) moves it to
///   `.data.rel.ro`. This is independent of the `DynImport` branches
///   above — it concerns relocations whose *target* is already a
///   defined, local (non-exported, non-import) symbol.
/// - **Anything with `kind == Arch(n)` where `n >= 256`, against a target
///   that is not itself `DynImport`.** Delegate to `handler`, regardless
///   of which of the above branches also applied.
pub fn preprocess_dynamic_relocations(
    store: &mut SymbolStore,
    diag: &mut Diagnostics,
    cfg: &TargetConfig,
    stub_section: SymbolId,
    reloc_section: SymbolId,
    handler: &mut dyn DynRelHandler,
) -> Result<()> {
    let candidates: Vec<SymbolId> = store
        .ids()
        .filter(|&id| store.get(id).reachable)
        .collect();

    for owner in candidates {
        let rel_count = store.get(owner).relocations.len();
        for i in 0..rel_count {
            let rel = store.get(owner).relocations[i].clone();
            let target_kind = store.get(rel.sym).kind;

            if target_kind == SymKind::DynImport {
                match cfg.head_type {
                    HeadType::Pe => {
                        preprocess_pe_import(store, cfg, stub_section, owner, i)?;
                    }
                    _ => {
                        handler.handle(store, diag, owner, i)?;
                        continue;
                    }
                }
                continue;
            }

            if cfg.flag_shared && !cfg.is_obj && rel.kind == RelocationKind::Addr {
                preprocess_elf_relative(store, cfg, reloc_section, owner, &rel);
            }

            if let RelocationKind::Arch(n) = rel.kind {
                if n >= 256 {
                    handler.handle(store, diag, owner, i)?;
                }
            }
        }
    }
    Ok(())
}

/// Synthesizes (on first use) a PLT-style indirect-jump stub for `target`
/// in `stub_section`, then redirects `owner`'s relocation `rel_idx` at the
/// stub rather than the unresolved import.
fn preprocess_pe_import(
    store: &mut SymbolStore,
    cfg: &TargetConfig,
    stub_section: SymbolId,
    owner: SymbolId,
    rel_idx: usize,
) -> Result<()> {
    let target = store.get(owner).relocations[rel_idx].sym;

    if store.get(target).plt.is_none() {
        let stub = store.get(stub_section);
        let stub_off = stub.payload.len() as u32;
        let ptr_off = stub_off + match cfg.arch {
            crate::config::Arch::X86 => PE_STUB32.len() as u32,
            crate::config::Arch::X86_64 => PE_STUB64.len() as u32,
            crate::config::Arch::Arm => PE_STUB_ARM.len() as u32,
        };

        {
            let stub_sym = store.get_mut(stub_section);
            match cfg.arch {
                crate::config::Arch::X86 => {
                    grow(stub_sym, (stub_off as usize) + PE_STUB32.len());
                    stub_sym.payload[stub_off as usize..stub_off as usize + PE_STUB32.len()]
                        .copy_from_slice(&PE_STUB32);
                }
                crate::config::Arch::X86_64 => {
                    grow(stub_sym, (stub_off as usize) + PE_STUB64.len());
                    stub_sym.payload[stub_off as usize..stub_off as usize + PE_STUB64.len()]
                        .copy_from_slice(&PE_STUB64);
                }
                crate::config::Arch::Arm => {
                    grow(stub_sym, (stub_off as usize) + PE_STUB_ARM.len());
                    stub_sym.payload[stub_off as usize..stub_off as usize + PE_STUB_ARM.len()]
                        .copy_from_slice(&PE_STUB_ARM);
                }
            }
            // Reserve the pointer-sized import slot the stub jumps through.
            add_uint(stub_sym, ByteOrder::Little, 0, cfg.ptr_size as usize);
            stub_sym.relocations.push(crate::symbol::Relocation {
                off: ptr_off,
                siz: cfg.ptr_size,
                kind: RelocationKind::Addr,
                sym: target,
                add: 0,
            });
        }

        store.get_mut(target).plt = Some(stub_off);
    }

    let stub_off = store.get(target).plt.unwrap();
    let rel = &mut store.get_mut(owner).relocations[rel_idx];
    rel.sym = stub_section;
    rel.add = stub_off as i64;
    Ok(())
}

/// Appends a `Relative`-kind RELATIVE record to `reloc_section` for the
/// slot at `owner.payload[rel.off..]`, and — if `owner` is a writable data
/// kind rather than already-read-only — marks it `rel_ro` (`spec.md`
/// §4.3: "The containing symbol, if presently writable-data-like, is
/// marked `rel_ro`").
///
/// A no-op unless: the relocation is against a defined, non-exported
/// local symbol (not `DynImport`, not a forward reference, not a literal
/// constant, and not `dynexport`), and `owner`'s kind is one of
/// [`RELRO_OWNER_KINDS`].
fn preprocess_elf_relative(
    store: &mut SymbolStore,
    cfg: &TargetConfig,
    reloc_section: SymbolId,
    owner: SymbolId,
    rel: &crate::symbol::Relocation,
) {
    let target = store.get(rel.sym);
    if matches!(target.kind, SymKind::DynImport | SymKind::Xref | SymKind::Const) || target.dynexport {
        return;
    }
    let owner_kind = store.get(owner).kind;
    if !RELRO_OWNER_KINDS.contains(&owner_kind) {
        return;
    }

    let slot = store.get(reloc_section).relocations.len() as u32;
    store.get_mut(reloc_section).relocations.push(crate::symbol::Relocation {
        off: slot * cfg.ptr_size as u32,
        siz: cfg.ptr_size,
        kind: RelocationKind::Relative,
        sym: owner,
        add: rel.off as i64,
    });

    if matches!(owner_kind, SymKind::Data | SymKind::NoPtrData) {
        store.get_mut(owner).rel_ro = true;
    }
}
