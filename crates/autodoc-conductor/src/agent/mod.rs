pub mod batch;
pub mod envelope;
pub mod retry;
