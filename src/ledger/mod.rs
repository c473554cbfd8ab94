pub mod balance;
pub mod model;
pub mod store;

pub use balance::{BalanceAggregator, BalanceSnapshot, LeaderboardEntry};
pub use model::{Direction, EntryKind, NewLedgerEntry, Reference, MAX_ENTRY_AMOUNT};
pub use store::LedgerStore;
