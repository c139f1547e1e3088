pub mod catalog;
pub mod country;
pub mod global_variables;
pub mod raster_file;
