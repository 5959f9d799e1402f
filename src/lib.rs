//! Deploys preset inference workloads for GPU workspaces and waits for them to become ready.
//!
//! The [workspace::PresetInference] orchestrator derives the launch parameters of a preset
//! model, builds the Deployment or StatefulSet running it and submits it through a
//! [k8s::client::ResourceClient]. [k8s::readiness::ReadinessPoller] then waits for the
//! submitted workload to report ready.
pub mod cli;
pub mod config;
pub mod k8s;
pub mod logging;
pub mod model;
pub mod workspace;
