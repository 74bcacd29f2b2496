use std::cell::OnceCell;
use std::fmt;

use elsa::FrozenMap;

use crashline_common::Source;

use crate::c13::ModuleLines;
use crate::dbi::{DebugInfo, ModuleInfo};
use crate::error::PdbError;
use crate::gsi::{IndexKind, SymbolIndex};
use crate::info::InfoStream;
use crate::msf::BlockStore;
use crate::names::NameTable;
use crate::raw;
use crate::streams::StreamTable;

/// A resolved source location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    /// The source file path, as recorded by the compiler.
    pub file: String,
    /// The first line of the statement.
    pub line: u32,
    /// The exclusive last line of the statement.
    pub end_line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// An opened Program Database.
///
/// Opening decodes the container, the stream directory, the info and DBI streams, the string
/// table and the global symbol index. Module line programs and the public symbol index are
/// decoded the first time they are needed and kept for the lifetime of the `Pdb`.
pub struct Pdb<S> {
    streams: StreamTable<S>,
    info: InfoStream,
    names: NameTable,
    debug_info: DebugInfo,
    globals: SymbolIndex,
    publics: OnceCell<SymbolIndex>,
    module_lines: FrozenMap<usize, Box<ModuleLines>>,
}

fn parse_index<S: Source>(
    streams: &StreamTable<S>,
    index: u32,
    kind: IndexKind,
    minimal_debug_info: bool,
) -> Result<SymbolIndex, PdbError> {
    if index == u32::from(raw::NO_STREAM) {
        return Ok(SymbolIndex::default());
    }
    SymbolIndex::parse(streams, index, kind, minimal_debug_info)
}

impl<S: Source> Pdb<S> {
    /// Opens the PDB in `source`.
    ///
    /// Any malformed structure fails the whole open, there is no partial decoding.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn open(source: S) -> Result<Self, PdbError> {
        let streams = StreamTable::open(BlockStore::open(source)?)?;
        let info = InfoStream::parse(&streams)?;
        let names = NameTable::parse(&streams, &info)?;
        let debug_info = DebugInfo::parse(&streams)?;
        let globals = parse_index(
            &streams,
            debug_info.global_symbols_stream(),
            IndexKind::Global,
            info.minimal_debug_info(),
        )?;

        Ok(Self {
            streams,
            info,
            names,
            debug_info,
            globals,
            publics: OnceCell::new(),
            module_lines: FrozenMap::new(),
        })
    }

    /// Whether the PDB was linked with minimal debug info.
    pub fn minimal_debug_info(&self) -> bool {
        self.info.minimal_debug_info()
    }

    /// All modules (compilation units) of the PDB.
    pub fn modules(&self) -> &[ModuleInfo] {
        self.debug_info.modules()
    }

    /// Resolves the image address of the global function `name` through the global symbol index.
    pub fn function_address(&self, name: &str) -> Result<Option<u32>, PdbError> {
        self.globals
            .find_procedure(&self.streams, &self.debug_info, name)
    }

    /// Resolves the image address of the public symbol `name` through the public symbol index.
    pub fn public_function_address(&self, name: &str) -> Result<Option<u32>, PdbError> {
        self.publics()?
            .find_public(&self.streams, &self.debug_info, name)
    }

    fn publics(&self) -> Result<&SymbolIndex, PdbError> {
        if let Some(publics) = self.publics.get() {
            return Ok(publics);
        }

        let publics = parse_index(
            &self.streams,
            self.debug_info.public_symbols_stream(),
            IndexKind::Public,
            self.info.minimal_debug_info(),
        )?;
        Ok(self.publics.get_or_init(|| publics))
    }

    fn module_lines(&self, index: usize) -> Result<&ModuleLines, PdbError> {
        if let Some(lines) = self.module_lines.get(&index) {
            return Ok(lines);
        }

        let module = self.debug_info.module(index)?;
        let lines = ModuleLines::parse(&self.streams, module)?;
        Ok(self.module_lines.insert(index, Box::new(lines)))
    }

    /// Resolves the image address `addr` to a source location.
    ///
    /// Returns `None` if the address is not covered by any module, the module has no line
    /// program, or the address falls into a gap of the line program.
    pub fn resolve_file_line(&self, addr: u32) -> Result<Option<SourceLocation>, PdbError> {
        let Some(module_index) = self.debug_info.module_index_for(addr) else {
            tracing::trace!(addr, "address not covered by any module");
            return Ok(None);
        };

        let lines = self.module_lines(module_index)?;
        let Some((fragment, line)) = lines.lookup(addr) else {
            tracing::trace!(addr, module_index, "no line information for address");
            return Ok(None);
        };

        let file = self.names.resolve(fragment.string_offset)?;
        Ok(Some(SourceLocation {
            file: file.into_owned(),
            line: line.start,
            end_line: line.end,
        }))
    }
}

impl<S> fmt::Debug for Pdb<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pdb")
            .field("modules", &self.debug_info.modules().len())
            .field("minimal_debug_info", &self.info.minimal_debug_info())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_display() {
        let location = SourceLocation {
            file: "src\\main.cpp".into(),
            line: 42,
            end_line: 43,
        };
        assert_eq!(location.to_string(), "src\\main.cpp:42");
    }
}
