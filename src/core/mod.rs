pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod model;
pub mod monitor;
pub mod narrator;
pub mod speech;

#[cfg(test)]
mod sim_test;
#[cfg(test)]
mod test_support;
