//! Credential storage
//!
//! Owns the bearer credential and the cached user profile. Everything here is
//! local state: values go through an opaque encode/decode pair into a
//! key/value storage backend, and malformed data always reads as "no
//! credential".

mod codec;
mod storage;
mod store;
mod types;

pub use codec::{decode, encode, CodecError};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use store::{claim_expiry, CredentialStore, TOKEN_KEY, USER_KEY};
pub use types::{Credential, UserRef};
