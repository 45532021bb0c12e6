// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutator registry
//!
//! Mutators get a chance to rewrite each Job between construction and
//! creation (the remote admission-webhook mutator lives in cj-mutators).
//! The set is configured once at startup and shared read-only with the
//! job builder; tests register and unregister their own mutators around
//! each case.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MutateError {
    #[error("mutator with that name already exists")]
    AlreadyRegistered,
    #[error("mutator with that name could not be found")]
    NotRegistered,
    #[error("mutator {name} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A named transformation applied to every Job the builder produces
#[async_trait]
pub trait Mutator: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(
        &self,
        job: &mut Job,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A process-scoped set of mutators, applied in name order
#[derive(Clone, Default)]
pub struct MutatorSet {
    mutators: Arc<RwLock<BTreeMap<String, Arc<dyn Mutator>>>>,
}

impl MutatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mutator: Arc<dyn Mutator>) -> Result<(), MutateError> {
        let name = mutator.name().to_string();
        let mut mutators = self.mutators.write().unwrap_or_else(|e| e.into_inner());
        if mutators.contains_key(&name) {
            return Err(MutateError::AlreadyRegistered);
        }
        mutators.insert(name, mutator);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<(), MutateError> {
        let mut mutators = self.mutators.write().unwrap_or_else(|e| e.into_inner());
        mutators
            .remove(name)
            .map(|_| ())
            .ok_or(MutateError::NotRegistered)
    }

    pub fn is_empty(&self) -> bool {
        self.mutators
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Run the job through every registered mutator in turn. Any mutator
    /// error aborts the whole mutation; the input job is left untouched.
    pub async fn apply(&self, job: &Job) -> Result<Job, MutateError> {
        let mutators: Vec<Arc<dyn Mutator>> = {
            let mutators = self.mutators.read().unwrap_or_else(|e| e.into_inner());
            mutators.values().cloned().collect()
        };

        let mut mutated = job.clone();
        for mutator in mutators {
            mutator
                .apply(&mut mutated)
                .await
                .map_err(|source| MutateError::Failed {
                    name: mutator.name().to_string(),
                    source,
                })?;
        }
        Ok(mutated)
    }
}

#[cfg(test)]
#[path = "mutate_tests.rs"]
mod tests;
