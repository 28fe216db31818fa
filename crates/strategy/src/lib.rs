pub mod grid;
pub mod oco;
pub mod twap;

pub use grid::{create_grid, grid_prices, GridSpec};
pub use oco::{place_oco, OcoOrders, OcoSpec};
pub use twap::{execute_twap, TwapSpec};
