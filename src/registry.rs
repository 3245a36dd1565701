use std::collections::HashMap;

use crate::batch::Batch;
use crate::job::Job;

/// The single mediator of the job/pod/batch relation (spec §4.1). No other
/// component mutates `jobs`, `pod_to_job`, or `batches` directly; every
/// mutation goes through a method here so invariants I3/I4 ("for every
/// `(p, j)` in the pod map, `j.pod_name = p`, and vice versa") can't drift.
///
/// Re-architected per spec §9 as a value owned by the service rather than
/// the original's process-wide globals (`pod_name_job`, `job_id_job`,
/// `batch_id_batch`, `counter`).
#[derive(Default)]
pub struct Registry {
    next_id: u64,
    jobs: HashMap<u64, Job>,
    pod_to_job: HashMap<String, u64>,
    batches: HashMap<u64, Batch>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Monotonic id allocator (C1), shared by jobs and batches, never
    /// reused within the process lifetime.
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert_job(&mut self, job: Job) {
        if let Some(ref pod_name) = job.pod_name {
            self.pod_to_job.insert(pod_name.clone(), job.id);
        }
        if let Some(batch_id) = job.batch_id {
            if let Some(batch) = self.batches.get_mut(&batch_id) {
                batch.job_ids.push(job.id);
            }
        }
        self.jobs.insert(job.id, job);
    }

    /// Removes a job from the registry and, if it was a batch member,
    /// from that batch's membership list. Unbinds its pod if one was
    /// bound. Returns the removed job, if any existed.
    pub fn remove_job(&mut self, id: u64) -> Option<Job> {
        let job = self.jobs.remove(&id)?;
        if let Some(ref pod_name) = job.pod_name {
            self.pod_to_job.remove(pod_name);
        }
        if let Some(batch_id) = job.batch_id {
            if let Some(batch) = self.batches.get_mut(&batch_id) {
                batch.job_ids.retain(|j| *j != id);
            }
        }
        Some(job)
    }

    pub fn job(&self, id: u64) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn job_mut(&mut self, id: u64) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn job_id_for_pod(&self, pod_name: &str) -> Option<u64> {
        self.pod_to_job.get(pod_name).copied()
    }

    /// Rebinds a job's pod: unbinds `old` (if any) and binds `new` (if
    /// any) in both the job record and the pod→job map, preserving
    /// I3/I4 as a single atomic operation under the registry's lock.
    pub fn rebind_pod(&mut self, job_id: u64, old: Option<&str>, new: Option<String>) {
        if let Some(old) = old {
            self.pod_to_job.remove(old);
        }
        if let Some(ref new_name) = new {
            self.pod_to_job.insert(new_name.clone(), job_id);
        }
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.pod_name = new;
        }
    }

    pub fn insert_batch(&mut self, batch: Batch) {
        self.batches.insert(batch.id, batch);
    }

    /// Removes a batch and clears `batch_id` on every member job (spec
    /// §3 "member jobs may outlive the batch").
    pub fn remove_batch(&mut self, id: u64) -> Option<Batch> {
        let batch = self.batches.remove(&id)?;
        for job_id in &batch.job_ids {
            if let Some(job) = self.jobs.get_mut(job_id) {
                job.batch_id = None;
            }
        }
        Some(batch)
    }

    pub fn batch(&self, id: u64) -> Option<&Batch> {
        self.batches.get(&id)
    }

    pub fn batch_exists(&self, id: u64) -> bool {
        self.batches.contains_key(&id)
    }

    pub fn iter_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Snapshot of the pod→job map, used by the periodic reconciler (C6)
    /// so it iterates a stable copy instead of the live map while
    /// `mark_unscheduled` mutates it mid-sweep (spec §9 open question).
    pub fn pod_map_snapshot(&self) -> Vec<(String, u64)> {
        self.pod_to_job.iter().map(|(name, id)| (name.clone(), *id)).collect()
    }
}
