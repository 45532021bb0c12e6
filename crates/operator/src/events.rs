// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event recording
//!
//! Every action the driver takes (or fails to take) is recorded twice:
//! as a Kubernetes Event on the ControlledJob, and as an entry in the
//! resource's own action history so `kubectl get -o yaml` tells the
//! story without chasing events. Action types prefixed "Failed" become
//! warning events; failures are deduplicated against the most recent
//! history entry so a persistent error doesn't churn the status.

use async_trait::async_trait;
use cj_api::{ActionHistoryEntry, ControlledJob};
use cj_core::error::is_warning_action;
use cj_core::history;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Resource;

/// Where recorded actions go. The driver only ever talks to this trait;
/// tests substitute a recording fake.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, controlled_job: &mut ControlledJob, action: ActionHistoryEntry);
}

/// The real sink: publishes cluster Events and appends to the action
/// history
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: kube::Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn record(&self, controlled_job: &mut ControlledJob, action: ActionHistoryEntry) {
        let type_ = if is_warning_action(&action.type_) {
            EventType::Warning
        } else {
            EventType::Normal
        };
        let event = Event {
            type_,
            reason: action.type_.clone(),
            note: Some(action.message.clone()),
            action: action.type_.clone(),
            secondary: None,
        };
        let reference = controlled_job.object_ref(&());
        if let Err(err) = self.recorder.publish(&event, &reference).await {
            tracing::warn!(error = %err, "failed to publish event");
        }

        history::record_action_ignoring_duplicates(controlled_job, action);
    }
}
