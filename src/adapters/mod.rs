// Adapters layer: concrete implementations of the storage ports (Azure REST, in-memory)

pub mod azure;
pub mod memory;
