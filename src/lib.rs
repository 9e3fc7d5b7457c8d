#![doc = include_str!("../README.md")]

pub mod client;
pub mod error;
pub mod gate;
pub mod guard;
pub mod manager;
pub mod onboarding;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use client::{HttpIdentityClient, IdentityApi, IdentityConfig, LoginResponse, RefreshResponse};
pub use error::Error;
pub use gate::{Gate, GateConfig};
pub use guard::{Decision, GuardState, RouteGuard, RoutePolicy};
pub use manager::SessionManager;
pub use onboarding::Onboarding;
pub use store::{JsonFileStore, MemoryStore, SessionStore};
pub use types::{GateStatus, OnboardingRecord, Role, Session, SessionSnapshot, UserId};
