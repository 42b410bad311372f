//! L2 RPC client: trait, alloy-backed implementation, and response types.

mod error;
mod l2_client;
mod traits;
mod types;

pub use error::{RpcError, RpcResult};
pub use l2_client::{L2ClientConfig, L2ClientImpl};
pub use traits::L2Client;
pub use types::{
    BlockRef, LineaExistenceProof, LineaMerkleProof, LineaNonExistenceProof, LineaProof,
    LineaProofResponse,
};
