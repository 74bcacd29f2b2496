use crate::lines::{c13_lines, Line, LineBlock, CHECKSUM_ENTRY_SIZE};
use crate::msf::MsfBuilder;
use crate::streams::{dbi_stream, info_stream, names_stream, push_u32, DbiModule, SectionContrib};
use crate::symbols::{
    gsi_stream, procedure_record, procedure_reference_record, psi_stream, public_record,
};

const NAMES_STREAM: u16 = 5;
const GLOBALS_STREAM: u16 = 6;
const PUBLICS_STREAM: u16 = 7;
const SYMBOLS_STREAM: u16 = 8;
const FIRST_MODULE_STREAM: u16 = 9;

const CV_SIGNATURE_C13: u32 = 4;

#[derive(Clone, Debug)]
struct TestFunction {
    name: Option<String>,
    file: String,
    offset: u32,
    size: u32,
    section: u16,
    lines: Vec<(u32, u32)>,
}

#[derive(Clone, Debug)]
struct TestModule {
    name: String,
    has_stream: bool,
    contributions: Vec<SectionContrib>,
    functions: Vec<TestFunction>,
}

/// Writes a synthetic but complete PDB.
///
/// The image has the stream layout of a linker-produced PDB: info stream, DBI stream, `/names`,
/// global and public symbol indices, the symbol record stream, and one stream per module holding
/// procedure symbols and a C13 line program.
///
/// # Example
///
/// ```
/// use crashline_testutils::PdbBuilder;
///
/// let pdb = PdbBuilder::new()
///     .module("main.obj")
///     .contribution(0x10, 0x10)
///     .function("f", "a.c", 0x10, 0x10, &[(0, 5)])
///     .build();
/// assert!(pdb.starts_with(b"Microsoft C/C++ MSF 7.00"));
/// ```
#[derive(Clone, Debug)]
pub struct PdbBuilder {
    block_size: u32,
    modules: Vec<TestModule>,
    publics: Vec<(String, u32, u16)>,
    minimal_debug_info: bool,
    corrupt_magic: bool,
    dbi_version: Option<u32>,
}

impl Default for PdbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdbBuilder {
    /// Creates a PDB without modules.
    pub fn new() -> Self {
        Self {
            block_size: 512,
            modules: Vec::new(),
            publics: Vec::new(),
            minimal_debug_info: false,
            corrupt_magic: false,
            dbi_version: None,
        }
    }

    /// Sets the MSF block size.
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Adds a module with a symbol stream. Subsequent calls attach to this module.
    pub fn module(mut self, name: &str) -> Self {
        self.modules.push(TestModule {
            name: name.to_owned(),
            has_stream: true,
            contributions: Vec::new(),
            functions: Vec::new(),
        });
        self
    }

    /// Adds a module without a symbol stream, like the linker module.
    pub fn module_without_stream(self, name: &str) -> Self {
        let mut builder = self.module(name);
        builder.last_module().has_stream = false;
        builder
    }

    fn last_module(&mut self) -> &mut TestModule {
        self.modules.last_mut().expect("add a module first")
    }

    /// Attributes the code section range `offset..offset + size` to the current module.
    pub fn contribution(self, offset: u32, size: u32) -> Self {
        self.contribution_in_section(1, offset, size)
    }

    /// Attributes a range of section `section` to the current module.
    pub fn contribution_in_section(mut self, section: u16, offset: u32, size: u32) -> Self {
        let module = self.modules.len() as u16 - 1;
        self.last_module().contributions.push(SectionContrib {
            section,
            offset: offset as i32,
            size: size as i32,
            module,
        });
        self
    }

    /// Adds a global function to the current module, with a line table in `file`.
    ///
    /// `lines` are `(offset relative to the function, line number)` pairs.
    pub fn function(
        mut self,
        name: &str,
        file: &str,
        offset: u32,
        size: u32,
        lines: &[(u32, u32)],
    ) -> Self {
        self.last_module().functions.push(TestFunction {
            name: Some(name.to_owned()),
            file: file.to_owned(),
            offset,
            size,
            section: 1,
            lines: lines.to_vec(),
        });
        self
    }

    /// Adds a line table to the current module without a global symbol.
    pub fn lines(mut self, file: &str, offset: u32, size: u32, lines: &[(u32, u32)]) -> Self {
        self.last_module().functions.push(TestFunction {
            name: None,
            file: file.to_owned(),
            offset,
            size,
            section: 1,
            lines: lines.to_vec(),
        });
        self
    }

    /// Adds a public symbol in the code section.
    pub fn public(mut self, name: &str, offset: u32) -> Self {
        self.publics.push((name.to_owned(), offset, 1));
        self
    }

    /// Marks the PDB as linked with minimal debug info, which enlarges the symbol indices.
    pub fn minimal_debug_info(mut self) -> Self {
        self.minimal_debug_info = true;
        self
    }

    /// Breaks the MSF signature.
    pub fn corrupt_magic(mut self) -> Self {
        self.corrupt_magic = true;
        self
    }

    /// Overrides the DBI stream version.
    pub fn dbi_version(mut self, version: u32) -> Self {
        self.dbi_version = Some(version);
        self
    }

    /// Writes the PDB image.
    pub fn build(&self) -> Vec<u8> {
        let mut files: Vec<&str> = vec![""];
        for function in self.modules.iter().flat_map(|m| &m.functions) {
            if !files.contains(&function.file.as_str()) {
                files.push(&function.file);
            }
        }
        let (names, name_offsets) = names_stream(&files);
        let name_offset = |file: &str| {
            let index = files.iter().position(|f| *f == file).unwrap_or(0);
            name_offsets[index]
        };

        let mut globals = Vec::new();
        let mut symbols = Vec::new();
        let mut module_streams = Vec::new();
        let mut dbi_modules = Vec::new();
        let mut contributions = Vec::new();

        for (module_index, module) in self.modules.iter().enumerate() {
            contributions.extend_from_slice(&module.contributions);

            if !module.has_stream {
                dbi_modules.push(DbiModule {
                    stream: None,
                    name: module.name.clone(),
                    object_file_name: module.name.clone(),
                    ..Default::default()
                });
                continue;
            }

            let mut stream = Vec::new();
            push_u32(&mut stream, CV_SIGNATURE_C13);

            let mut module_files: Vec<&str> = Vec::new();
            let mut blocks = Vec::new();
            for function in &module.functions {
                if let Some(ref name) = function.name {
                    let symbol_offset = stream.len() as u32;
                    stream.extend(procedure_record(
                        name,
                        function.offset,
                        function.size,
                        function.section,
                    ));

                    let reference_offset = symbols.len() as u32;
                    symbols.extend(procedure_reference_record(
                        name,
                        symbol_offset,
                        module_index as u16,
                    ));
                    globals.push((name.clone(), reference_offset));
                }

                let file_index = match module_files.iter().position(|f| *f == function.file) {
                    Some(index) => index,
                    None => {
                        module_files.push(&function.file);
                        module_files.len() - 1
                    }
                };
                blocks.push(LineBlock {
                    offset: function.offset,
                    size: function.size,
                    segment: function.section,
                    file: file_index as u32 * CHECKSUM_ENTRY_SIZE,
                    columns: false,
                    lines: function
                        .lines
                        .iter()
                        .map(|&(offset, line)| Line {
                            offset,
                            line,
                            delta: 0,
                        })
                        .collect(),
                });
            }

            let symbols_size = stream.len() as u32;
            let c13 = if blocks.is_empty() {
                Vec::new()
            } else {
                let checksums: Vec<u32> = module_files.iter().map(|f| name_offset(f)).collect();
                c13_lines(&blocks, &checksums)
            };
            stream.extend_from_slice(&c13);

            dbi_modules.push(DbiModule {
                stream: Some(FIRST_MODULE_STREAM + module_streams.len() as u16),
                symbols_size,
                c13_size: c13.len() as u32,
                name: module.name.clone(),
                object_file_name: module.name.clone(),
            });
            module_streams.push(stream);
        }

        let mut publics = Vec::new();
        for (name, offset, section) in &self.publics {
            let record_offset = symbols.len() as u32;
            symbols.extend(public_record(name, *offset, *section));
            publics.push((name.as_str(), record_offset));
        }
        let globals: Vec<(&str, u32)> = globals
            .iter()
            .map(|(name, offset)| (name.as_str(), *offset))
            .collect();

        let features: &[u32] = if self.minimal_debug_info {
            &[20140508, 0x494E_494D]
        } else {
            &[20140508]
        };

        let mut dbi = dbi_stream(
            (GLOBALS_STREAM, PUBLICS_STREAM, SYMBOLS_STREAM),
            &dbi_modules,
            &contributions,
        );
        if let Some(version) = self.dbi_version {
            dbi[4..8].copy_from_slice(&version.to_le_bytes());
        }

        let mut msf = MsfBuilder::new(self.block_size);
        // old directory
        msf.add_stream(Vec::new());
        msf.add_stream(info_stream(&[("/names", NAMES_STREAM.into())], features));
        // type information
        msf.add_stream(Vec::new());
        msf.add_stream(dbi);
        // id information
        msf.add_stream(Vec::new());
        msf.add_stream(names);
        msf.add_stream(gsi_stream(&globals, self.minimal_debug_info));
        msf.add_stream(psi_stream(&publics, self.minimal_debug_info));
        msf.add_stream(symbols);
        for stream in module_streams {
            msf.add_stream(stream);
        }

        let mut image = msf.build();
        if self.corrupt_magic {
            image[0] = b'm';
        }
        image
    }
}
