pub mod constants;
pub mod events;
pub mod hms;
pub mod huawei;
pub mod manager;
pub mod provider;
pub mod simulated;
pub mod types;
pub mod unsupported;
