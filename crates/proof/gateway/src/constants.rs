//! Constants used throughout the gateway.

use std::time::Duration;

use alloy_primitives::{Address, B256, address, b256};

/// Default LRU capacity of a block prover's proof cache.
pub const DEFAULT_CACHE_SIZE: usize = 10_000;

/// Default number of cached commits held by the gateway.
pub const DEFAULT_COMMIT_CACHE_SIZE: u64 = 16;

/// Default number of seconds the latest commit index is reused.
pub const DEFAULT_LATEST_CACHE_SEC: u64 = 60;

/// Default maximum number of storage slots requested per proof call.
///
/// Several hosted RPC providers reject larger `eth_getProof` requests.
pub const DEFAULT_PROOF_BATCH_SIZE: usize = 64;

/// Default timeout for L1/L2 RPC requests.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of transport retries.
pub const DEFAULT_RPC_MAX_RETRIES: u32 = 3;

/// Default initial backoff delay between transport retries.
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Default maximum backoff delay between transport retries.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Keccak-256 of empty bytecode.
pub const EMPTY_CODE_HASH: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// The `L2ToL1MessagePasser` predeploy whose storage root is part of an OP output root.
pub const L2_TO_L1_MESSAGE_PASSER: Address = address!("4200000000000000000000000000000000000016");

/// Version byte of the OP output root preimage.
pub const OUTPUT_ROOT_VERSION: B256 = B256::ZERO;

/// Average L1 block time observed for Taiko proposals, in seconds.
pub const TAIKO_AVG_BLOCK_SEC: u64 = 16;

/// Linea L2 block time, in seconds.
pub const LINEA_BLOCK_SEC: u64 = 2;

/// Byte range of the keccak code hash inside a Linea account leaf value.
pub const LINEA_KECCAK_CODE_HASH_RANGE: std::ops::Range<usize> = 128..160;

/// Maximum number of distinct proofs a witness can reference with its one-byte order entries.
pub const MAX_WITNESS_PROOFS: usize = u8::MAX as usize + 1;
