pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const HASH_BITS: u32 = (HASH_SIZE * BYTE) as u32;

/// Sentinel hash carried by the genesis block.
pub const GENESIS_HASH: &str = "genesis";

/// Target seconds between blocks.
pub const BLOCK_GENERATION_INTERVAL: i64 = 10;
/// Number of blocks between difficulty retargets.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;
/// Allowed clock skew, in seconds, on either side of a block timestamp.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 60;

/// P-256 scalar width; signatures are two of these back to back.
pub const CURVE_BYTES: usize = 32;
pub const SIGNATURE_SIZE: usize = CURVE_BYTES * 2;
/// Uncompressed SEC1 point: 0x04 || x || y.
pub const PUBLIC_KEY_SIZE: usize = 1 + CURVE_BYTES * 2;
