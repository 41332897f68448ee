const KIB: usize = 1024;
const MIB: i64 = 1024 * 1024;

/// (exclusive upper bound on expected size, chunk size)
const TIERS: [(i64, usize); 4] = [
    (50 * MIB, 64 * KIB),
    (100 * MIB, 128 * KIB),
    (250 * MIB, 256 * KIB),
    (500 * MIB, 512 * KIB),
];

pub const MIN_CHUNK: usize = 64 * KIB;
pub const MAX_CHUNK: usize = 1024 * KIB;

/// Read/write granularity for a body of `expected` bytes; `-1` means unknown.
pub fn chunk_size(expected: i64) -> usize {
    if expected < 0 {
        return MIN_CHUNK;
    }
    TIERS
        .iter()
        .find(|(limit, _)| expected < *limit)
        .map(|(_, chunk)| *chunk)
        .unwrap_or(MAX_CHUNK)
}
