//! End-to-end orchestrator scenarios

mod backend_mismatch;
mod cancellation;
mod concurrent_branches;
mod dependency_order;
mod failure_propagation;
mod timeout;
mod yaml_pipeline;
