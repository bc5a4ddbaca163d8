//! # File sessions
//!
//! A [`FileSession`] sequences the dependent derivation steps for one file
//! (open, classify, metadata, position index, decode) over an
//! [`crate::rpc::RpcChannel`] and memoizes the expensive ones. The
//! [`SessionRegistry`] owns every live session, keyed by engine descriptor.
//!
//! ```rust,ignore
//! let registry = SessionRegistry::new(channel);
//! let session = registry.open("/data/run01.mzML").await?;
//! let spectrum = session.spectrum(0).await?;
//! registry.close(session.descriptor().unwrap()).await?;
//! ```

mod cache;
mod error;
mod file_session;
pub mod naming;
mod registry;
mod spectrum;


pub use cache::SingleFlight;
pub use error::SessionError;
pub use file_session::{DerivedField, FieldKey, FileSession, SessionStatus};
pub use registry::SessionRegistry;
pub use spectrum::{MsLevelSummary, Spectrum, TicEntry, TicTable};
