pub mod codec;
pub mod crypto;
pub mod block;
pub mod container;
pub mod metadata;
pub mod index;
pub mod database;
pub mod report;
pub mod matcher;
pub mod spool;
pub mod check;

pub use codec::{CompressionId, Compressor, Level};
pub use crypto::{CipherId, CipherSuite};
pub use block::{decode_block, encode_block, BlockKind};
pub use database::{Database, Mode, StoreOptions};
pub use metadata::Metadata;
pub use report::{Report, Reports, TextMatch};
