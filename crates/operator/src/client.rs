// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster client facade
//!
//! A narrow interface over the Kubernetes client for exactly the calls
//! the reconcile driver makes, so tests can drive the driver with a
//! recording fake instead of a cluster.

use async_trait::async_trait;
use cj_api::{status_mut, ControlledJob};
use cj_core::metadata;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::ResourceExt;
use thiserror::Error;

/// Namespace and name of the resource a reconcile targets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cluster request failed: {0}")]
    Kube(#[from] kube::Error),
}

/// The cluster operations the reconcile driver needs
#[async_trait]
pub trait ControlledJobClient: Send + Sync {
    /// Fetch the targeted ControlledJob, or None if it doesn't exist
    /// (deleted resources are not an error, just nothing to do)
    async fn get_controlled_job(
        &self,
        target: &NamespacedName,
    ) -> Result<Option<ControlledJob>, ClientError>;

    /// List the child Jobs owned by the targeted ControlledJob
    async fn list_jobs_for_controlled_job(
        &self,
        target: &NamespacedName,
    ) -> Result<Vec<Job>, ClientError>;

    async fn create_job(&self, job: &Job) -> Result<(), ClientError>;

    /// Delete with foreground propagation so the underlying Pods are gone
    /// before the Job object disappears. A job already deleted is not an
    /// error.
    async fn delete_job(&self, job: &Job) -> Result<(), ClientError>;

    /// Mark a Job suspended, killing its Pods
    async fn suspend_job(&self, job: &Job) -> Result<(), ClientError>;

    /// Resume a suspended Job, letting a Pod start
    async fn unsuspend_job(&self, job: &Job) -> Result<(), ClientError>;

    /// Write just the status subresource of the ControlledJob
    async fn update_status(&self, controlled_job: &mut ControlledJob) -> Result<(), ClientError>;
}

/// The real client, backed by the cluster API
#[derive(Clone)]
pub struct KubeControlledJobClient {
    client: kube::Client,
}

impl KubeControlledJobClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn controlled_jobs(&self, namespace: &str) -> Api<ControlledJob> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs_for(&self, job: &Job) -> Api<Job> {
        match job.metadata.namespace.as_deref() {
            Some(namespace) => self.jobs(namespace),
            None => Api::default_namespaced(self.client.clone()),
        }
    }
}

#[async_trait]
impl ControlledJobClient for KubeControlledJobClient {
    async fn get_controlled_job(
        &self,
        target: &NamespacedName,
    ) -> Result<Option<ControlledJob>, ClientError> {
        Ok(self
            .controlled_jobs(&target.namespace)
            .get_opt(&target.name)
            .await?)
    }

    async fn list_jobs_for_controlled_job(
        &self,
        target: &NamespacedName,
    ) -> Result<Vec<Job>, ClientError> {
        // The label narrows the list server-side; the owner reference is
        // the source of truth for actual ownership
        let params = ListParams::default().labels(&format!(
            "{}={}",
            metadata::CONTROLLED_JOB_LABEL,
            target.name
        ));
        let jobs = self.jobs(&target.namespace).list(&params).await?;
        Ok(jobs
            .items
            .into_iter()
            .filter(|job| is_controlled_by(job, &target.name))
            .collect())
    }

    async fn create_job(&self, job: &Job) -> Result<(), ClientError> {
        self.jobs_for(job)
            .create(&PostParams::default(), job)
            .await?;
        Ok(())
    }

    async fn delete_job(&self, job: &Job) -> Result<(), ClientError> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        };
        match self.jobs_for(job).delete(&job.name_any(), &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn suspend_job(&self, job: &Job) -> Result<(), ClientError> {
        self.patch_suspend(job, true).await
    }

    async fn unsuspend_job(&self, job: &Job) -> Result<(), ClientError> {
        self.patch_suspend(job, false).await
    }

    async fn update_status(&self, controlled_job: &mut ControlledJob) -> Result<(), ClientError> {
        let namespace = controlled_job.namespace().unwrap_or_default();
        let name = controlled_job.name_any();
        let status = serde_json::json!({ "status": status_mut(controlled_job) });
        self.controlled_jobs(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status))
            .await?;
        Ok(())
    }
}

impl KubeControlledJobClient {
    async fn patch_suspend(&self, job: &Job, suspend: bool) -> Result<(), ClientError> {
        let patch = serde_json::json!({ "spec": { "suspend": suspend } });
        self.jobs_for(job)
            .patch(&job.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// True if the job's controlling owner reference is the named ControlledJob
fn is_controlled_by(job: &Job, controlled_job_name: &str) -> bool {
    job.metadata
        .owner_references
        .as_ref()
        .into_iter()
        .flatten()
        .any(|owner| {
            owner.controller == Some(true)
                && owner.kind == "ControlledJob"
                && owner.name == controlled_job_name
        })
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
