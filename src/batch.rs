//! Batch aggregate (C4, spec §4.6): a named grouping of jobs used only for
//! aggregate status reporting. Jobs may outlive their batch.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::job::JobState;
use crate::registry::Registry;

#[derive(Debug, Clone)]
pub struct Batch {
    pub id: u64,
    pub attributes: HashMap<String, String>,
    pub job_ids: Vec<u64>,
}

impl Batch {
    pub fn new(id: u64, attributes: HashMap<String, String>) -> Self {
        Batch { id, attributes, job_ids: Vec::new() }
    }

    /// Tallies member states into `{Created, Complete, Cancelled}` counts
    /// (law L4: "equal the literal per-state tally of current members").
    /// Member ids whose job has since been deleted (but not removed from
    /// this batch's own membership, which only happens via `Registry::remove_job`)
    /// are simply absent from the registry and contribute nothing.
    pub fn to_json(&self, registry: &Registry) -> Value {
        let mut created = 0u64;
        let mut complete = 0u64;
        let mut cancelled = 0u64;

        for job_id in &self.job_ids {
            if let Some(job) = registry.job(*job_id) {
                match job.state {
                    JobState::Created => created += 1,
                    JobState::Complete { .. } => complete += 1,
                    JobState::Cancelled => cancelled += 1,
                }
            }
        }

        json!({
            "id": self.id,
            "jobs": {
                "Created": created,
                "Complete": complete,
                "Cancelled": cancelled,
            },
            "attributes": self.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use k8s_openapi::api::core::v1::Pod;

    fn job(id: u64, batch_id: u64, state: JobState) -> Job {
        Job {
            id,
            batch_id: Some(batch_id),
            attributes: HashMap::new(),
            callback: None,
            pod_template: Pod::default(),
            pod_name: None,
            state,
        }
    }

    #[test]
    fn tallies_match_member_states() {
        let mut reg = Registry::new();
        let batch = Batch::new(1, HashMap::from([("k".to_string(), "v".to_string())]));
        reg.insert_batch(batch.clone());
        reg.insert_job(job(2, 1, JobState::Cancelled));
        reg.insert_job(job(3, 1, JobState::Complete { exit_code: 0 }));

        let batch = reg.batch(1).unwrap().clone();
        let doc = batch.to_json(&reg);
        assert_eq!(doc["jobs"]["Created"], 0);
        assert_eq!(doc["jobs"]["Complete"], 1);
        assert_eq!(doc["jobs"]["Cancelled"], 1);
        assert_eq!(doc["attributes"]["k"], "v");
    }
}
