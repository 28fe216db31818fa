pub mod binance;
pub mod watcher;

pub use binance::{BinanceFuturesClient, UserDataStream};
pub use watcher::OcoWatcher;
