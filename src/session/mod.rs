pub mod context;
pub mod storage;

pub use context::{ExportSnapshot, SessionContext};
pub use storage::{CredentialStore, Credentials};
