pub mod config;
pub mod error;
pub mod events;
pub mod money;

pub use config::WalletConfig;
pub use error::{WalletError, WalletResult};
pub use events::WalletEvent;
pub use money::Money;
