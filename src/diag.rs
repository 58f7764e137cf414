use std::borrow::Cow;

/// A single non-fatal diagnostic recorded during layout or relocation.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Name of the symbol the diagnostic is about, if any.
    pub symbol: Option<String>,
    pub message: Cow<'static, str>,
}

/// Accumulates "Diagnostic, continue" errors (spec category, not `Error`)
/// across an entire link so that every phase runs to completion and the
/// caller sees the maximal set of problems, rather than aborting on the
/// first one.
///
/// This replaces a global `cursym` + `diag()` call with an explicit sink
/// threaded through each phase by `&mut` reference.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic. Also emits it through `log::error!` when the
    /// `log` feature is enabled, so a linker embedding this crate gets the
    /// message even if it never inspects `Diagnostics` itself.
    pub fn report(&mut self, symbol: Option<&str>, message: impl Into<Cow<'static, str>>) {
        let message = message.into();
        #[cfg(feature = "log")]
        match symbol {
            Some(name) => log::error!("{name}: {message}"),
            None => log::error!("{message}"),
        }
        self.entries.push(Diagnostic {
            symbol: symbol.map(str::to_owned),
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
