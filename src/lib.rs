pub mod alert;
pub mod aws;
pub mod cli;
pub mod config;
pub mod control;
pub mod export;
pub mod observability;
pub mod reading;
pub mod record;
pub mod sensor;
pub mod sink;
pub mod window;

#[cfg(test)]
pub mod test_support;
