// Engine modules: input routing and the tick driver

pub mod driver;
pub mod input;
