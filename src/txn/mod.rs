pub mod manager;
pub mod request;

pub use manager::{HistoryEntry, Transaction, TransactionManager};
pub use request::{Mutation, Request, RequestId, RequestState};
