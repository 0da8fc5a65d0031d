pub mod aggregator;
pub mod article;
pub mod errors;
pub mod lifecycle;
pub mod order;
pub mod ports;
pub mod pricing;
pub mod selection;
pub mod settlement;
pub mod sums;

#[cfg(test)]
pub(crate) mod fixtures;
