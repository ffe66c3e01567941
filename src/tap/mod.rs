//! Table Access Protocol (TAP) client.
//!
//! Includes:
//! - `TapService`: synchronous ADQL queries against `{base}/sync`.
//! - `job`: the UWS asynchronous job resource under `{base}/async` —
//!   submit, run, poll, fetch, abort, delete.

mod job;
#[cfg(test)]
mod tap_test;

pub use job::{AsyncJob, ErrorSummary, JobPhase, JobResult, JobSummary};

use crate::dal::{check_status, DalResults};
use crate::error::Result;
use crate::vosi::{self, Availability, Capabilities};
use reqwest::Client;
use tracing::{debug, info};

/// An asynchronous client for a TAP service.
pub struct TapService {
    client: Client,
    base_url: String,
}

impl TapService {
    /// Creates a new `TapService` for the given base URL (the resource that
    /// has `sync`, `async` and the VOSI endpoints as children).
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a new `TapService` sharing an existing HTTP client. Used by
    /// the CLI (one client for everything) and by tests pointing at a mock
    /// server.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs an ADQL query synchronously against `{base}/sync`.
    pub async fn run_sync(&self, query: &str) -> Result<DalResults> {
        self.run_sync_with(query, None).await
    }

    /// Runs an ADQL query synchronously with an explicit row limit.
    pub async fn run_sync_with(&self, query: &str, maxrec: Option<u64>) -> Result<DalResults> {
        let url = format!("{}/sync", self.base_url);
        info!("Running synchronous TAP query against {}", url);
        debug!("ADQL: {}", query);

        let response = self
            .client
            .post(&url)
            .form(&query_form(query, maxrec))
            .send()
            .await?;
        let response = check_status(response)?;
        let body = response.text().await?;

        let results = DalResults::from_xml(&body)?;
        debug!("Query returned {} rows", results.len());
        Ok(results)
    }

    /// Submits an ADQL query as an asynchronous UWS job. The job is created
    /// in the `PENDING` phase; call [`AsyncJob::run`] to start it.
    pub async fn submit(&self, query: &str) -> Result<AsyncJob> {
        self.submit_with(query, None).await
    }

    /// Submits an asynchronous job with an explicit row limit.
    pub async fn submit_with(&self, query: &str, maxrec: Option<u64>) -> Result<AsyncJob> {
        let url = format!("{}/async", self.base_url);
        info!("Submitting asynchronous TAP job to {}", url);
        debug!("ADQL: {}", query);

        let response = self
            .client
            .post(&url)
            .form(&query_form(query, maxrec))
            .send()
            .await?;
        let response = check_status(response)?;

        // The server answers the create with a 303 to the job resource. The
        // redirect has already been followed here, so the final URL is the
        // job URL — unless the server answered 200 in place, in which case
        // the job id from the document fills the gap.
        let final_url = response.url().clone();
        let body = response.text().await?;
        let summary = JobSummary::from_xml(&body)?;
        let job_url = if final_url.path().trim_end_matches('/').ends_with("/async") {
            format!("{}/async/{}", self.base_url, summary.job_id)
        } else {
            final_url.to_string()
        };

        info!(
            "Created TAP job {} in phase {} at {}",
            summary.job_id, summary.phase, job_url
        );
        Ok(AsyncJob::from_parts(self.client.clone(), job_url, summary))
    }

    /// Fetches the VOSI capabilities document for this service.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        vosi::capabilities(&self.client, &self.base_url).await
    }

    /// Fetches the VOSI availability document for this service.
    pub async fn availability(&self) -> Result<Availability> {
        vosi::availability(&self.client, &self.base_url).await
    }
}

/// The form body shared by sync queries and job submission.
fn query_form(query: &str, maxrec: Option<u64>) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("REQUEST", "doQuery".to_string()),
        ("LANG", "ADQL".to_string()),
        ("FORMAT", "votable".to_string()),
        ("QUERY", query.to_string()),
    ];
    if let Some(maxrec) = maxrec {
        form.push(("MAXREC", maxrec.to_string()));
    }
    form
}
