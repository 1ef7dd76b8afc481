//! Virtual Try-On SDK Core
//!
//! This library provides the core functionality of the try-on SDK: it
//! uploads a user photo, starts a generation operation on the remote
//! service, polls it to completion under server-configurable retry
//! budgets, downloads the generated images, and reports per-phase timing
//! plus typed failures to the host application.

pub mod config;
pub mod models;
pub mod sdk;
pub mod services;
