//! Error taxonomy and wire types shared by `envcrypt` and the services that
//! persist its output.

pub mod error;
pub mod protocol;

pub use error::CryptoError;
pub use protocol::Envelope;
