//! Domain types for DipLab

pub mod candle;
pub mod ledger;
pub mod permission;
pub mod position;
pub mod trade;

pub use candle::Candle;
pub use ledger::LedgerRow;
pub use permission::{DailyPermission, PermissionError, PermissionMap};
pub use position::{Position, CAPITAL_EPSILON};
pub use trade::ClosedTrade;
