pub mod matches;
pub mod player;

pub use matches::*;
pub use player::*;
