pub mod bii;
pub mod collect;
pub mod commons;
pub mod error;
pub mod extract;
pub mod geo_core;
pub mod geometric;

pub use bii::{Bii, BiiOptions, ExtractFlags};
pub use error::{BiiError, Result};
