use crate::streams::{align4, push_cstr, push_u16, push_u32};

const NUM_BUCKETS: u32 = 4097;
const NUM_BUCKETS_MINIMAL: u32 = 0x40000;

fn name_hash(name: &[u8], modulus: u32) -> u32 {
    let mut value = 0u32;
    let mut chunks = name.chunks_exact(4);
    for chunk in &mut chunks {
        value ^= u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let rest = chunks.remainder();
    let mut pos = 0;
    if rest.len() >= 2 {
        value ^= u32::from(rest[0]) | (u32::from(rest[1]) << 8);
        pos = 2;
    }
    if rest.len() - pos == 1 {
        value ^= u32::from(rest[pos]);
    }
    value |= 0x2020_2020;
    value ^= (value >> 11) & 0x1F_FFFF;
    value ^= (value >> 16) & 0xFFFF;
    value % modulus
}

/// Writes a global symbol index mapping names to symbol record offsets.
pub fn gsi_stream(symbols: &[(&str, u32)], minimal_debug_info: bool) -> Vec<u8> {
    let bucket_count = if minimal_debug_info {
        NUM_BUCKETS_MINIMAL
    } else {
        NUM_BUCKETS
    };

    let mut sorted: Vec<(u32, u32)> = symbols
        .iter()
        .map(|(name, offset)| (name_hash(name.as_bytes(), bucket_count - 1), *offset))
        .collect();
    sorted.sort_by_key(|(bucket, _)| *bucket);

    let mut records = Vec::new();
    for (_, offset) in &sorted {
        // offsets are stored plus one, followed by a reference count
        push_u32(&mut records, offset + 1);
        push_u32(&mut records, 1);
    }

    let mut buckets = Vec::new();
    if !sorted.is_empty() {
        let mut bitmap = vec![0u8; (bucket_count.div_ceil(32) * 4) as usize];
        let mut starts = Vec::new();
        for (index, (bucket, _)) in sorted.iter().enumerate() {
            if index > 0 && sorted[index - 1].0 == *bucket {
                continue;
            }
            bitmap[(*bucket / 8) as usize] |= 1 << (*bucket % 8);
            push_u32(&mut starts, index as u32 * 12);
        }
        buckets.extend_from_slice(&bitmap);
        buckets.extend_from_slice(&starts);
    }

    let mut data = Vec::new();
    push_u32(&mut data, 0xFFFF_FFFF);
    push_u32(&mut data, 0xF12F_091A);
    push_u32(&mut data, records.len() as u32);
    push_u32(&mut data, buckets.len() as u32);
    data.extend_from_slice(&records);
    data.extend_from_slice(&buckets);
    data
}

/// Writes a public symbol index mapping names to symbol record offsets.
pub fn psi_stream(symbols: &[(&str, u32)], minimal_debug_info: bool) -> Vec<u8> {
    let gsi = gsi_stream(symbols, minimal_debug_info);

    let mut data = Vec::new();
    push_u32(&mut data, gsi.len() as u32);
    // address map, thunk count and size, thunk table section and offset, section count
    data.resize(28, 0);
    data.extend_from_slice(&gsi);
    data
}

fn finish_record(mut record: Vec<u8>) -> Vec<u8> {
    align4(&mut record);
    let len = (record.len() - 2) as u16;
    record[0..2].copy_from_slice(&len.to_le_bytes());
    record
}

/// Writes an `S_GPROC32` symbol record.
pub fn procedure_record(name: &str, offset: u32, size: u32, section: u16) -> Vec<u8> {
    let mut record = Vec::new();
    push_u16(&mut record, 0);
    push_u16(&mut record, 0x1110);
    // parent, end, next
    push_u32(&mut record, 0);
    push_u32(&mut record, 0);
    push_u32(&mut record, 0);
    push_u32(&mut record, size);
    // debug start and end
    push_u32(&mut record, 0);
    push_u32(&mut record, size);
    // type index
    push_u32(&mut record, 0x1000);
    push_u32(&mut record, offset);
    push_u16(&mut record, section);
    // flags
    record.push(0);
    push_cstr(&mut record, name);
    finish_record(record)
}

/// Writes an `S_PROCREF` symbol record pointing at `symbol_offset` in module `module_index`.
pub fn procedure_reference_record(name: &str, symbol_offset: u32, module_index: u16) -> Vec<u8> {
    let mut record = Vec::new();
    push_u16(&mut record, 0);
    push_u16(&mut record, 0x1125);
    // sum name
    push_u32(&mut record, 0);
    push_u32(&mut record, symbol_offset);
    // module references are one-based
    push_u16(&mut record, module_index + 1);
    push_cstr(&mut record, name);
    finish_record(record)
}

/// Writes an `S_PUB32` symbol record.
pub fn public_record(name: &str, offset: u32, section: u16) -> Vec<u8> {
    let mut record = Vec::new();
    push_u16(&mut record, 0);
    push_u16(&mut record, 0x110E);
    // function flag
    push_u32(&mut record, 2);
    push_u32(&mut record, offset);
    push_u16(&mut record, section);
    push_cstr(&mut record, name);
    finish_record(record)
}
