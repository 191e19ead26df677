//! Credential storage: key/value backends standing in for browser local storage.

mod credentials;
mod error;
mod file;
mod memory;

pub use credentials::{
    CredentialStore, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER_DATA, StoredSession,
};
pub use error::StoreError;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Minimal string key/value store with local-storage semantics.
pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
