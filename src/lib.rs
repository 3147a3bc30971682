pub mod bridge;
pub mod bus;
pub mod config;
pub mod db;
pub mod logging;
pub mod reading;
pub mod sampler;
pub mod sensors;
pub mod shutdown;
