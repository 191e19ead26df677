//! Client for the Contrax analysis backend.
//!
//! [`ApiClient`] speaks HTTP and owns the 401 refresh policy, [`Session`]
//! holds credentials, [`QueryCache`] and [`ContractService`] give cached
//! reads, [`Actions`] run mutations, and [`Watcher`] follows an analysis
//! until it settles.

pub mod actions;
pub mod auth;
pub mod cache;
pub mod contracts;
pub mod error;
pub mod http;
pub mod notify;
pub mod service;
pub mod session;
pub mod watch;

pub use actions::{Actions, Navigation};
pub use auth::Restored;
pub use cache::{Invalidation, KeyFamily, QueryCache, QueryKey, Reason, Scope};
pub use contracts::{Report, ReportFormat};
pub use error::ApiError;
pub use http::{ApiClient, ApiRequest};
pub use notify::{CollectingNotifier, Level, Notification, Notifier, TracingNotifier};
pub use service::ContractService;
pub use session::Session;
pub use watch::{ContractSource, WatchHandle, WatchRegistry, WatchUpdate, Watcher};
