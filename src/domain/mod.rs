pub mod outcome;
pub mod payload;
pub mod schedule;

pub use outcome::*;
pub use payload::*;
pub use schedule::*;
