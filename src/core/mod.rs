// Core helpers that do not depend on the engine

pub mod math;
