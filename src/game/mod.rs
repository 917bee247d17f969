pub mod pool;
pub mod tank;

pub use pool::TankPool;
pub use tank::{Tank, TankId, TankState};
