//! Infrastructure layer: the transactional store, unit of work, event commit
//! coordination, read ports, application services and the engine facade.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod ports;
pub mod services;
pub mod sink;
pub mod store;
pub mod unit_of_work;
pub mod workers;

mod integration_tests;

pub use config::EngineConfig;
pub use coordinator::EventCommitCoordinator;
pub use engine::{InMemoryEngine, InventoryEngine};
pub use error::{ServiceError, ServiceResult, StoreError};
pub use sink::{BusMessageSink, InMemoryMessageSink, MessageSink, SinkError};
pub use store::{ChangeSet, InMemoryInventoryStore, InventoryStore};
pub use unit_of_work::UnitOfWork;
