// Port Layer - Interfaces for external dependencies

pub mod code_generator;
pub mod id_provider; // For deterministic testing
pub mod observer_ledger;
pub mod queue_store;
pub mod time_provider;

// Re-exports
pub use code_generator::{CodeGenerator, RandomCodeGenerator};
pub use id_provider::{IdProvider, UuidProvider};
pub use observer_ledger::ObserverLedger;
pub use queue_store::{Mutation, Mutator, QueueStore, UpdateOutcome};
pub use time_provider::{SystemTimeProvider, TimeProvider};
