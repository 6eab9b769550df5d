use purge_common::db::job_registry::Dao as JobRegistryDao;
use purge_common::db::DaoError;

use async_trait::async_trait;
use futures::future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::time;

use crate::jobs::Job;

/// Where the runner keeps each job's last run time across restarts.
#[async_trait]
pub trait RunRegistry: Send + Sync {
    async fn last_run(&self, job_name: &str) -> Result<Option<SystemTime>, DaoError>;
    async fn record_run(&self, job_name: &str, time: SystemTime) -> Result<(), DaoError>;
}

#[async_trait]
impl RunRegistry for JobRegistryDao {
    async fn last_run(&self, job_name: &str) -> Result<Option<SystemTime>, DaoError> {
        self.get_job_last_run_timestamp(job_name).await
    }

    async fn record_run(&self, job_name: &str, time: SystemTime) -> Result<(), DaoError> {
        self.set_job_last_run_timestamp(job_name, time).await
    }
}

struct JobContainer {
    job: Box<dyn Job>,
    run_frequency: Duration,
    last_run_time: SystemTime,
}

pub struct JobRunner {
    jobs: Vec<JobContainer>,
    update_frequency: Duration,
    registry: Arc<dyn RunRegistry>,
}

impl JobRunner {
    pub fn new(update_frequency: Duration, registry: Arc<dyn RunRegistry>) -> Self {
        Self {
            jobs: Vec::new(),
            update_frequency,
            registry,
        }
    }

    pub async fn register(&mut self, job: Box<dyn Job>, run_frequency: Duration) {
        let job_name_ref = job.name();

        log::info!(
            "Registered job \"{}\" to run every {} seconds",
            job_name_ref,
            run_frequency.as_secs()
        );

        let last_run_time = self
            .registry
            .last_run(job_name_ref)
            .await
            .unwrap_or_else(|e| {
                log::error!(
                    "Failed to get last run timestamp for job '{}': {}",
                    job_name_ref,
                    e
                );
                None
            });

        let job_container = JobContainer {
            job,
            run_frequency,
            last_run_time: last_run_time.unwrap_or(SystemTime::now()),
        };

        self.jobs.push(job_container);
    }

    /// Runs every job whose frequency has elapsed, concurrently, and records the run times.
    /// Returns the number of jobs started.
    pub async fn run_due_jobs(&mut self) -> usize {
        let now = SystemTime::now();

        let mut job_names = Vec::with_capacity(self.jobs.len());
        let mut job_futures = Vec::with_capacity(self.jobs.len());
        let mut record_job_run_futures = Vec::with_capacity(self.jobs.len());

        for job_container in &mut self.jobs {
            let time_elapsed_since_last_run = now
                .duration_since(job_container.last_run_time)
                .unwrap_or(Duration::from_nanos(0));
            let is_time_to_run = time_elapsed_since_last_run >= job_container.run_frequency;

            if is_time_to_run && job_container.job.is_ready() {
                let name_ref = job_container.job.name();
                log::info!("Executing job \"{}\"", name_ref);

                job_container.last_run_time = now;
                job_names.push(name_ref);
                job_futures.push(job_container.job.execute());
                record_job_run_futures.push(self.registry.record_run(name_ref, now));
            }
        }

        let (job_results, recording_results) = future::join(
            future::join_all(job_futures),
            future::join_all(record_job_run_futures),
        )
        .await;

        for (i, result) in job_results.into_iter().enumerate() {
            if let Err(e) = result {
                log::error!("Job \"{}\" failed: {}", job_names[i], e);
            } else {
                log::info!("Job \"{}\" finished successfully", job_names[i]);
            }
        }

        for result in recording_results.into_iter() {
            if let Err(e) = result {
                log::error!("Error recording job run: {}", e);
            }
        }

        job_names.len()
    }

    pub async fn start(&mut self) -> ! {
        loop {
            let before = Instant::now();

            self.run_due_jobs().await;

            let delta = Instant::now() - before;

            if delta < self.update_frequency {
                time::sleep(self.update_frequency - delta).await;
            }
        }
    }
}
