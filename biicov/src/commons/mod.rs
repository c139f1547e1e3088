pub mod numeric;
#[cfg(feature = "indicatif")]
pub mod progress;
