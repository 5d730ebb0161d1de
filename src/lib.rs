//! # Image Assurance Operator
//!
//! Library half of the operator binary.
//!
//! - [`controller::reconciler`]: the convergence engine that brings the
//!   cluster to the desired Image Assurance installation
//! - [`configsync`]: the actor that mirrors organization settings from the
//!   Image Assurance API into the cluster
//! - [`render`]: pure construction of the desired Kubernetes objects
//! - [`runtime`]: process wiring and the controller watch loop

pub mod config;
pub mod configsync;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod render;
pub mod runtime;
