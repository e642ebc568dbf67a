pub mod area;
pub mod dobson;
pub mod fields;
#[cfg(feature = "netcdf")]
pub mod io;
pub mod logging;
pub mod units;
