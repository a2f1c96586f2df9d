mod category;
mod contract;
mod error;
mod event;
mod fund_entry;
mod ledger;
mod money;
mod status;

pub use category::*;
pub use contract::*;
pub use error::*;
pub use event::*;
pub use fund_entry::*;
pub use ledger::*;
pub use money::*;
pub use status::*;
