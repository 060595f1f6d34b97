mod convert;
mod import;

pub use convert::run as run_convert;
pub use import::run as run_import;
