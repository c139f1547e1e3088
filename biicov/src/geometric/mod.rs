pub mod covariates;
pub mod field_size;
pub mod grid;
pub mod image;
pub mod land_cover;
pub mod layers;
pub mod local_platform;
pub mod nitrogen;
