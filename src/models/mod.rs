pub mod abi;
pub mod common;
pub mod datasets;
pub mod errors;
pub mod values;
