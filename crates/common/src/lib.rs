pub mod config;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod types;
pub mod validate;

pub use config::{BotConfig, Credentials};
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
pub use types::*;
