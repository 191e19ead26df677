pub mod auth;
pub mod clause;
pub mod config;
pub mod contract;
pub mod poll;
pub mod risk;
pub mod validate;

pub use auth::{
    AuthResponse, AuthState, AuthTokens, LoginCredentials, RefreshResponse, Registration, User,
    UserProfile,
};
pub use clause::{Clause, ClauseNumber, Entity, GptAnalysis, MlAnalysis};
pub use config::{ClientConfig, ConfigError, DevCredential, RetryPolicy};
pub use contract::{
    AnalyzeRequest, AnalyzeResponse, Contract, ContractFilters, ContractStatus, ContractType,
    ContractTypeRef, DashboardStats, Listing, NewContract, Page,
};
pub use poll::{POLL_INTERVAL, TerminalEvent, poll_delay, poll_delay_with, terminal_event};
pub use risk::{RiskError, RiskLevel, RiskScale, RiskScore};
pub use validate::{MESSAGE_KEYS, MIN_CONTRACT_TEXT_LEN, ValidationErrors};
