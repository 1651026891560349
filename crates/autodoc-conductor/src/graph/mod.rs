pub mod stage;
pub mod topo;
