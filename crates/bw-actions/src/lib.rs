//! # bw-actions
//!
//! Remediation playbook actions for Breakwater.
//!
//! This crate implements the closed set of playbooks (user lockdown,
//! resource isolation) and the executor that dispatches them on behalf of
//! the orchestrator with attempt-level idempotency.

pub mod action;
pub mod executor;
pub mod isolate_resource;
pub mod user_lockdown;

pub use action::{ActionContext, ActionError, ActionOutput, RemediationAction};
pub use executor::PlaybookActionExecutor;
pub use isolate_resource::IsolateResourceAction;
pub use user_lockdown::UserLockdownAction;
