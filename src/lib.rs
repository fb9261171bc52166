pub mod decoder;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod rpc;
pub mod stages;
pub mod utils;
