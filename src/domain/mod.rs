// Domain layer: record model, table entity model and storage ports.

pub mod model;
pub mod ports;
