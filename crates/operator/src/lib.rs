// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cj-operator: the effectful half of the ControlledJob operator
//!
//! The decision engine in cj-core is pure; this crate owns everything
//! that touches the cluster. The reconcile driver loads the resource and
//! its children, asks the engine for a plan, executes it (deletes, then
//! creates, then suspends, then unsuspends), records events and finally
//! writes the status back in one call.

pub mod client;
pub mod controller;
pub mod events;
pub mod health;
pub mod leader;
pub mod reconcile;

pub use client::{ClientError, ControlledJobClient, KubeControlledJobClient, NamespacedName};
pub use events::{EventSink, KubeEventSink};
pub use reconcile::{reconcile, ReconcileFailure, ReconcileOptions, ReconcileResult};
