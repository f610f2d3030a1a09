pub mod asset;
pub mod prediction;
pub mod sensor;

pub use asset::*;
pub use prediction::*;
pub use sensor::*;
