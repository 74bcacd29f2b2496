pub(crate) fn push_u16(data: &mut Vec<u8>, value: u16) {
    data.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_u32(data: &mut Vec<u8>, value: u32) {
    data.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_i32(data: &mut Vec<u8>, value: i32) {
    data.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_cstr(data: &mut Vec<u8>, value: &str) {
    data.extend_from_slice(value.as_bytes());
    data.push(0);
}

pub(crate) fn align4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

/// Serializes a hash table with the given entries.
///
/// All values must have the same width.
pub fn hash_table(entries: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let size = entries.len() as u32;
    let capacity = (size * 2).max(1);
    let present_words = capacity.div_ceil(32);

    let mut data = Vec::new();
    push_u32(&mut data, size);
    push_u32(&mut data, capacity);

    push_u32(&mut data, present_words);
    for word in 0..present_words {
        let mut bits = 0u32;
        for bit in 0..32 {
            if word * 32 + bit < size {
                bits |= 1 << bit;
            }
        }
        push_u32(&mut data, bits);
    }
    // no deleted entries
    push_u32(&mut data, 0);

    for (key, value) in entries {
        push_u32(&mut data, *key);
        data.extend_from_slice(value);
    }
    data
}

/// Writes a PDB info stream naming the given streams, followed by the given feature codes.
pub fn info_stream(named_streams: &[(&str, u32)], features: &[u32]) -> Vec<u8> {
    let mut data = Vec::new();
    push_u32(&mut data, 20000404);
    // signature, age and GUID
    push_u32(&mut data, 0x5f3c_9a10);
    push_u32(&mut data, 1);
    data.extend_from_slice(&[0xab; 16]);

    let mut pool = Vec::new();
    let mut entries = Vec::new();
    for (name, index) in named_streams {
        entries.push((pool.len() as u32, index.to_le_bytes().to_vec()));
        push_cstr(&mut pool, name);
    }
    push_u32(&mut data, pool.len() as u32);
    data.extend_from_slice(&pool);
    data.extend_from_slice(&hash_table(&entries));

    // niMac
    push_u32(&mut data, 0);
    for feature in features {
        push_u32(&mut data, *feature);
    }
    data
}

/// Writes a `/names` string table.
///
/// Returns the stream and the offset of each string.
pub fn names_stream(strings: &[&str]) -> (Vec<u8>, Vec<u32>) {
    let mut pool = Vec::new();
    let mut offsets = Vec::new();
    for string in strings {
        offsets.push(pool.len() as u32);
        push_cstr(&mut pool, string);
    }

    let mut data = Vec::new();
    push_u32(&mut data, 0xEFFE_EFFE);
    push_u32(&mut data, 1);
    push_u32(&mut data, pool.len() as u32);
    data.extend_from_slice(&pool);
    (data, offsets)
}

/// A module record of the DBI stream.
#[derive(Clone, Debug, Default)]
pub struct DbiModule {
    /// The module symbol stream, `None` for the `0xFFFF` sentinel.
    pub stream: Option<u16>,
    /// Byte size of the symbols in the module stream.
    pub symbols_size: u32,
    /// Byte size of the C13 line program in the module stream.
    pub c13_size: u32,
    /// The module name.
    pub name: String,
    /// The object file name.
    pub object_file_name: String,
}

/// A section contribution record of the DBI stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct SectionContrib {
    /// The one-based section index.
    pub section: u16,
    /// The start within the section.
    pub offset: i32,
    /// The length of the contribution.
    pub size: i32,
    /// The zero-based module index.
    pub module: u16,
}

fn push_section_contrib(data: &mut Vec<u8>, contrib: &SectionContrib) {
    push_u16(data, contrib.section);
    push_u16(data, 0);
    push_i32(data, contrib.offset);
    push_i32(data, contrib.size);
    // characteristics
    push_u32(data, 0x6000_0020);
    push_u16(data, contrib.module);
    push_u16(data, 0);
    // data and relocation CRCs
    push_u32(data, 0);
    push_u32(data, 0);
}

/// Writes a DBI stream.
///
/// `streams` are the global symbol index, public symbol index and symbol record stream indices.
pub fn dbi_stream(
    (global, public, symrec): (u16, u16, u16),
    modules: &[DbiModule],
    contributions: &[SectionContrib],
) -> Vec<u8> {
    let mut module_data = Vec::new();
    for module in modules {
        // opened
        push_u32(&mut module_data, 0);
        push_section_contrib(&mut module_data, &SectionContrib::default());
        // flags
        push_u16(&mut module_data, 0);
        push_u16(&mut module_data, module.stream.unwrap_or(0xFFFF));
        push_u32(&mut module_data, module.symbols_size);
        // C11 lines
        push_u32(&mut module_data, 0);
        push_u32(&mut module_data, module.c13_size);
        // source file count, padding, unused, source and PDB file name offsets
        push_u16(&mut module_data, 0);
        push_u16(&mut module_data, 0);
        push_u32(&mut module_data, 0);
        push_u32(&mut module_data, 0);
        push_u32(&mut module_data, 0);
        push_cstr(&mut module_data, &module.name);
        push_cstr(&mut module_data, &module.object_file_name);
        align4(&mut module_data);
    }

    let mut contribution_data = Vec::new();
    push_u32(&mut contribution_data, 0xF12E_BA2D);
    for contrib in contributions {
        push_section_contrib(&mut contribution_data, contrib);
    }

    let mut data = Vec::new();
    // version signature, version, age
    push_i32(&mut data, -1);
    push_u32(&mut data, 19990903);
    push_u32(&mut data, 1);
    push_u16(&mut data, global);
    // build number with the new version format flag
    push_u16(&mut data, 0x8E1D);
    push_u16(&mut data, public);
    push_u16(&mut data, 0);
    push_u16(&mut data, symrec);
    push_u16(&mut data, 0);
    push_i32(&mut data, module_data.len() as i32);
    push_i32(&mut data, contribution_data.len() as i32);
    // section map, source info, type server map, MFC type server index, optional debug header
    // and EC substream sizes, flags, machine, padding
    data.resize(64, 0);

    data.extend_from_slice(&module_data);
    data.extend_from_slice(&contribution_data);
    data
}
