// Data pipeline: versioned layer storage and the transforms between layers

pub mod processing;
pub mod storage;
