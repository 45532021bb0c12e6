// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cj-mutators: the remote admission-webhook mutator
//!
//! Some clusters want a central service to have the final say over every
//! Job the operator creates (injecting sidecars, pinning node selectors,
//! stamping cost-center labels). Rather than invent a protocol, the
//! remote mutator speaks the MutatingAdmissionWebhook wire format: it
//! POSTs an AdmissionReview carrying the pending Job and applies the
//! JSON Patch the service returns.

mod remote;

pub use remote::{enable_remote_mutator, RemoteMutateError, RemoteMutator};
