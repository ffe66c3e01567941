//! The UWS asynchronous job resource: phases, the parsed job document and
//! the operations a client may perform on a job.
//!
//! A job moves through `PENDING -> QUEUED -> EXECUTING` and ends in one of
//! the terminal phases (`COMPLETED`, `ERROR`, `ABORTED`, `ARCHIVED`). Every
//! method that talks to the server refreshes the cached [`JobSummary`], so
//! the accessors reflect the last observed server state, never a guess.

use crate::dal::{check_status, DalResults};
use crate::error::{Error, Result};
use crate::votable::{attr_local, element_children};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Poll backoff bounds for [`AsyncJob::wait`].
const POLL_INITIAL: Duration = Duration::from_secs(1);
const POLL_MAX: Duration = Duration::from_secs(20);

/// The execution phases defined by UWS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Queued,
    Executing,
    Completed,
    Error,
    Aborted,
    Unknown,
    Held,
    Suspended,
    Archived,
}

impl JobPhase {
    /// Terminal phases: the job will never leave them on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Error | JobPhase::Aborted | JobPhase::Archived
        )
    }

    /// Phases in which the server is (or may be) working on the job.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobPhase::Queued | JobPhase::Executing | JobPhase::Suspended
        )
    }
}

impl From<&str> for JobPhase {
    /// Parses the wire spelling. Anything unrecognised maps to `Unknown`,
    /// as UWS instructs clients to do.
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => JobPhase::Pending,
            "QUEUED" => JobPhase::Queued,
            "EXECUTING" => JobPhase::Executing,
            "COMPLETED" => JobPhase::Completed,
            "ERROR" => JobPhase::Error,
            "ABORTED" => JobPhase::Aborted,
            "HELD" => JobPhase::Held,
            "SUSPENDED" => JobPhase::Suspended,
            "ARCHIVED" => JobPhase::Archived,
            _ => JobPhase::Unknown,
        }
    }
}

impl std::str::FromStr for JobPhase {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(JobPhase::from(s))
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Pending => "PENDING",
            JobPhase::Queued => "QUEUED",
            JobPhase::Executing => "EXECUTING",
            JobPhase::Completed => "COMPLETED",
            JobPhase::Error => "ERROR",
            JobPhase::Aborted => "ABORTED",
            JobPhase::Unknown => "UNKNOWN",
            JobPhase::Held => "HELD",
            JobPhase::Suspended => "SUSPENDED",
            JobPhase::Archived => "ARCHIVED",
        };
        write!(f, "{}", name)
    }
}

/// One entry of the job's result list.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub id: String,
    /// Possibly relative to the job URL.
    pub href: String,
}

/// The `errorSummary` element of a failed job.
#[derive(Debug, Clone)]
pub struct ErrorSummary {
    pub message: String,
    /// `transient` or `fatal`.
    pub error_type: String,
    /// Whether the full error document at `{job}/error` has more detail.
    pub has_detail: bool,
}

/// The parsed UWS job document.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub owner_id: Option<String>,
    pub run_id: Option<String>,
    pub phase: JobPhase,
    /// Server's estimate of when the job would complete if started now.
    pub quote: Option<DateTime<Utc>>,
    pub creation_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum run time in seconds; 0 means unlimited.
    pub execution_duration: Option<u64>,
    /// When the server will delete the job and its results.
    pub destruction: Option<DateTime<Utc>>,
    pub parameters: Vec<(String, String)>,
    pub results: Vec<JobResult>,
    pub error_summary: Option<ErrorSummary>,
}

impl JobSummary {
    /// Parses a UWS job document.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "job" {
            return Err(Error::Votable(format!(
                "expected UWS job document, found `{}`",
                root.tag_name().name()
            )));
        }

        let mut summary = JobSummary {
            job_id: String::new(),
            owner_id: None,
            run_id: None,
            phase: JobPhase::Unknown,
            quote: None,
            creation_time: None,
            start_time: None,
            end_time: None,
            execution_duration: None,
            destruction: None,
            parameters: Vec::new(),
            results: Vec::new(),
            error_summary: None,
        };

        for child in element_children(root) {
            let text = || child.text().map(str::trim).unwrap_or("").to_string();
            match child.tag_name().name() {
                "jobId" => summary.job_id = text(),
                "ownerId" => summary.owner_id = nonnil(child),
                "runId" => summary.run_id = nonnil(child),
                "phase" => summary.phase = JobPhase::from(text().as_str()),
                "quote" => summary.quote = parse_time(child),
                "creationTime" => summary.creation_time = parse_time(child),
                "startTime" => summary.start_time = parse_time(child),
                "endTime" => summary.end_time = parse_time(child),
                "executionDuration" => {
                    let raw = text();
                    if !raw.is_empty() {
                        match raw.parse::<u64>() {
                            Ok(secs) => summary.execution_duration = Some(secs),
                            Err(_) => warn!("unparseable executionDuration `{}`", raw),
                        }
                    }
                },
                "destruction" => summary.destruction = parse_time(child),
                "parameters" => {
                    for param in element_children(child) {
                        if param.tag_name().name() == "parameter" {
                            let id = attr_local(param, "id").unwrap_or("").to_string();
                            let value = param.text().unwrap_or("").to_string();
                            summary.parameters.push((id, value));
                        }
                    }
                },
                "results" => {
                    for result in element_children(child) {
                        if result.tag_name().name() == "result" {
                            summary.results.push(JobResult {
                                id: attr_local(result, "id").unwrap_or("result").to_string(),
                                href: attr_local(result, "href").unwrap_or("").to_string(),
                            });
                        }
                    }
                },
                "errorSummary" => {
                    let message = element_children(child)
                        .find(|n| n.tag_name().name() == "message")
                        .and_then(|n| n.text())
                        .map(str::trim)
                        .unwrap_or("")
                        .to_string();
                    summary.error_summary = Some(ErrorSummary {
                        message,
                        error_type: attr_local(child, "type").unwrap_or("fatal").to_string(),
                        has_detail: attr_local(child, "hasDetail") == Some("true"),
                    });
                },
                _ => {},
            }
        }

        if summary.job_id.is_empty() {
            return Err(Error::Votable("job document has no jobId".to_string()));
        }
        Ok(summary)
    }
}

/// True when the element is marked `xsi:nil="true"` or empty.
fn nonnil(node: roxmltree::Node) -> Option<String> {
    if attr_local(node, "nil") == Some("true") {
        return None;
    }
    node.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// UWS timestamps are ISO 8601, with or without an explicit offset.
fn parse_time(node: roxmltree::Node) -> Option<DateTime<Utc>> {
    let raw = nonnil(node)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
        })
        .map_err(|e| {
            warn!("unparseable UWS timestamp `{}`: {}", raw, e);
            e
        })
        .ok()
}

/// A handle on one UWS job resource.
pub struct AsyncJob {
    client: Client,
    job_url: String,
    summary: JobSummary,
}

impl AsyncJob {
    pub(crate) fn from_parts(client: Client, job_url: String, summary: JobSummary) -> Self {
        Self {
            client,
            job_url,
            summary,
        }
    }

    /// Attaches to an existing job resource, e.g. one submitted in an
    /// earlier session, and fetches its current state.
    pub async fn attach(client: Client, job_url: &str) -> Result<Self> {
        let response = check_status(client.get(job_url).send().await?)?;
        let body = response.text().await?;
        let summary = JobSummary::from_xml(&body)?;
        Ok(Self {
            client,
            job_url: job_url.trim_end_matches('/').to_string(),
            summary,
        })
    }

    pub fn job_url(&self) -> &str {
        &self.job_url
    }

    pub fn job_id(&self) -> &str {
        &self.summary.job_id
    }

    /// The phase from the last observed job state. Does not talk to the
    /// server; see [`Self::current_phase`] for that.
    pub fn phase(&self) -> JobPhase {
        self.summary.phase
    }

    /// The last observed job state.
    pub fn summary(&self) -> &JobSummary {
        &self.summary
    }

    pub fn quote(&self) -> Option<DateTime<Utc>> {
        self.summary.quote
    }

    pub fn error_summary(&self) -> Option<&ErrorSummary> {
        self.summary.error_summary.as_ref()
    }

    /// Result entries of the last observed state, resolved against the job
    /// URL where relative.
    pub fn result_urls(&self) -> Result<Vec<url::Url>> {
        self.summary
            .results
            .iter()
            .map(|r| self.resolve(&r.href))
            .collect()
    }

    /// Re-reads the whole job document from the server.
    pub async fn refresh(&mut self) -> Result<&JobSummary> {
        let response = check_status(self.client.get(&self.job_url).send().await?)?;
        let body = response.text().await?;
        self.summary = JobSummary::from_xml(&body)?;
        debug!("Job {} is in phase {}", self.summary.job_id, self.summary.phase);
        Ok(&self.summary)
    }

    /// Reads just the phase endpoint (a bare text body, much cheaper than
    /// the full document).
    pub async fn current_phase(&mut self) -> Result<JobPhase> {
        let url = format!("{}/phase", self.job_url);
        let response = check_status(self.client.get(&url).send().await?)?;
        let text = response.text().await?;
        let phase = JobPhase::from(text.as_str());
        self.summary.phase = phase;
        Ok(phase)
    }

    /// Starts the job (`PHASE=RUN`). Only legal while the job is `PENDING`
    /// or `HELD`.
    pub async fn run(&mut self) -> Result<()> {
        let phase = self.current_phase().await?;
        if !matches!(phase, JobPhase::Pending | JobPhase::Held) {
            return Err(Error::WrongPhase {
                expected: "PENDING or HELD".to_string(),
                actual: phase.to_string(),
            });
        }
        info!("Starting job {}", self.summary.job_id);
        self.post_phase("RUN").await
    }

    /// Aborts the job (`PHASE=ABORT`). Illegal once the job is terminal.
    pub async fn abort(&mut self) -> Result<()> {
        let phase = self.current_phase().await?;
        if phase.is_terminal() {
            return Err(Error::WrongPhase {
                expected: "a non-terminal phase".to_string(),
                actual: phase.to_string(),
            });
        }
        info!("Aborting job {}", self.summary.job_id);
        self.post_phase("ABORT").await
    }

    async fn post_phase(&mut self, phase: &str) -> Result<()> {
        let url = format!("{}/phase", self.job_url);
        let response = self
            .client
            .post(&url)
            .form(&[("PHASE", phase)])
            .send()
            .await?;
        let response = check_status(response)?;
        let body = response.text().await?;
        self.update_from_body(&body).await
    }

    /// Phase and parameter updates answer with a redirect to the job
    /// document; some servers answer 200 with an empty body instead, in
    /// which case the state is re-fetched explicitly.
    async fn update_from_body(&mut self, body: &str) -> Result<()> {
        match JobSummary::from_xml(body) {
            Ok(summary) => {
                self.summary = summary;
                Ok(())
            },
            Err(_) => {
                debug!("update response was not a job document, re-fetching job state");
                self.refresh().await.map(|_| ())
            },
        }
    }

    /// Polls until the job reaches a terminal phase.
    pub async fn wait(&mut self) -> Result<JobPhase> {
        self.wait_inner(None).await
    }

    /// Polls until the job reaches a terminal phase, giving up after
    /// `limit`. On timeout the job keeps running server-side; the error
    /// carries the last observed phase.
    pub async fn wait_timeout(&mut self, limit: Duration) -> Result<JobPhase> {
        self.wait_inner(Some(limit)).await
    }

    async fn wait_inner(&mut self, limit: Option<Duration>) -> Result<JobPhase> {
        let start = Instant::now();
        let mut delay = POLL_INITIAL;
        loop {
            let phase = self.current_phase().await?;
            if phase.is_terminal() {
                // Pick up results/error summary along with the phase.
                self.refresh().await?;
                return Ok(self.summary.phase);
            }
            if let Some(limit) = limit {
                if start.elapsed() + delay > limit {
                    return Err(Error::JobTimeout(phase.to_string()));
                }
            }
            debug!(
                "Job {} still {}, polling again in {:?}",
                self.summary.job_id, phase, delay
            );
            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay * 3 / 2, POLL_MAX);
        }
    }

    /// Fetches the job result table. Only legal in `COMPLETED`; in `ERROR`
    /// the job's error summary is surfaced instead.
    pub async fn fetch_result(&mut self) -> Result<DalResults> {
        self.refresh().await?;
        match self.summary.phase {
            JobPhase::Completed => {},
            JobPhase::Error => return Err(self.job_error().await),
            other => {
                return Err(Error::WrongPhase {
                    expected: "COMPLETED".to_string(),
                    actual: other.to_string(),
                });
            },
        }

        // TAP names its table result "result"; fall back to the sole entry
        // for servers that name it differently.
        let result = self
            .summary
            .results
            .iter()
            .find(|r| r.id == "result")
            .or_else(|| self.summary.results.first())
            .ok_or_else(|| Error::Job {
                message: "job completed but reported no result".to_string(),
                error_type: "fatal".to_string(),
            })?;

        let url = self.resolve(&result.href)?;
        info!("Fetching result of job {} from {}", self.summary.job_id, url);
        let response = check_status(self.client.get(url).send().await?)?;
        let body = response.text().await?;
        DalResults::from_xml(&body)
    }

    /// Builds the `Error::Job` for a failed job, pulling the error document
    /// body when the summary says there is more detail than its message.
    async fn job_error(&self) -> Error {
        let (mut message, error_type, has_detail) = match &self.summary.error_summary {
            Some(summary) => (
                summary.message.clone(),
                summary.error_type.clone(),
                summary.has_detail,
            ),
            None => (String::new(), "fatal".to_string(), true),
        };

        if message.is_empty() && has_detail {
            let url = format!("{}/error", self.job_url);
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    message = response.text().await.unwrap_or_default();
                },
                _ => debug!("no readable error document at {}", url),
            }
        }
        if message.trim().is_empty() {
            message = "job failed without an error message".to_string();
        }

        Error::Job {
            message: message.trim().to_string(),
            error_type,
        }
    }

    /// Deletes the job resource, consuming the handle.
    pub async fn delete(self) -> Result<()> {
        info!("Deleting job {}", self.summary.job_id);
        check_status(self.client.delete(&self.job_url).send().await?)?;
        Ok(())
    }

    /// Sets the destruction time of the job.
    pub async fn set_destruction(&mut self, when: DateTime<Utc>) -> Result<()> {
        let url = format!("{}/destruction", self.job_url);
        let value = when.to_rfc3339_opts(SecondsFormat::Secs, true);
        let response = self
            .client
            .post(&url)
            .form(&[("DESTRUCTION", value.as_str())])
            .send()
            .await?;
        let response = check_status(response)?;
        let body = response.text().await?;
        self.update_from_body(&body).await
    }

    /// Sets the maximum run time of the job, in seconds.
    pub async fn set_execution_duration(&mut self, secs: u64) -> Result<()> {
        let url = format!("{}/executionduration", self.job_url);
        let value = secs.to_string();
        let response = self
            .client
            .post(&url)
            .form(&[("EXECUTIONDURATION", value.as_str())])
            .send()
            .await?;
        let response = check_status(response)?;
        let body = response.text().await?;
        self.update_from_body(&body).await
    }

    fn resolve(&self, href: &str) -> Result<url::Url> {
        // Join against the job resource as a directory, so relative result
        // hrefs like `results/result` land under the job URL.
        let base = url::Url::parse(&format!("{}/", self.job_url.trim_end_matches('/')))?;
        Ok(base.join(href)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const JOB_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<uws:job xmlns:uws="http://www.ivoa.net/xml/UWS/v1.0"
         xmlns:xlink="http://www.w3.org/1999/xlink"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <uws:jobId>tap-101</uws:jobId>
  <uws:ownerId xsi:nil="true"/>
  <uws:phase>COMPLETED</uws:phase>
  <uws:quote>2026-08-06T12:30:00Z</uws:quote>
  <uws:startTime>2026-08-06T12:00:01.196</uws:startTime>
  <uws:endTime>2026-08-06T12:00:05Z</uws:endTime>
  <uws:executionDuration>3600</uws:executionDuration>
  <uws:destruction>2026-08-13T12:00:00Z</uws:destruction>
  <uws:parameters>
    <uws:parameter id="QUERY">SELECT TOP 5 * FROM tab</uws:parameter>
    <uws:parameter id="LANG">ADQL</uws:parameter>
  </uws:parameters>
  <uws:results>
    <uws:result id="result" xlink:href="results/result"/>
  </uws:results>
</uws:job>"#;

    #[test]
    fn job_document_parses() {
        let summary = JobSummary::from_xml(JOB_DOC).unwrap();
        assert_eq!(summary.job_id, "tap-101");
        assert_eq!(summary.phase, JobPhase::Completed);
        assert_eq!(summary.owner_id, None);
        assert_eq!(summary.execution_duration, Some(3600));
        assert_eq!(summary.parameters.len(), 2);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].href, "results/result");
        assert!(summary.quote.is_some());
        // The offset-less startTime still parses.
        assert!(summary.start_time.is_some());
    }

    #[test]
    fn error_summary_parses() {
        let xml = r#"<uws:job xmlns:uws="http://www.ivoa.net/xml/UWS/v1.0">
            <uws:jobId>j1</uws:jobId>
            <uws:phase>ERROR</uws:phase>
            <uws:errorSummary type="transient" hasDetail="true">
                <uws:message>backend unavailable</uws:message>
            </uws:errorSummary>
        </uws:job>"#;
        let summary = JobSummary::from_xml(xml).unwrap();
        let error = summary.error_summary.unwrap();
        assert_eq!(error.message, "backend unavailable");
        assert_eq!(error.error_type, "transient");
        assert!(error.has_detail);
    }

    #[test]
    fn document_without_job_id_is_rejected() {
        let xml = r#"<uws:job xmlns:uws="http://www.ivoa.net/xml/UWS/v1.0">
            <uws:phase>PENDING</uws:phase>
        </uws:job>"#;
        assert!(JobSummary::from_xml(xml).is_err());
    }

    #[rstest]
    #[case("PENDING", JobPhase::Pending)]
    #[case("executing", JobPhase::Executing)]
    #[case(" COMPLETED\n", JobPhase::Completed)]
    #[case("ARCHIVED", JobPhase::Archived)]
    #[case("whatever", JobPhase::Unknown)]
    fn phase_parses_wire_spellings(#[case] wire: &str, #[case] expected: JobPhase) {
        assert_eq!(JobPhase::from(wire), expected);
    }

    #[rstest]
    #[case(JobPhase::Completed, true)]
    #[case(JobPhase::Error, true)]
    #[case(JobPhase::Aborted, true)]
    #[case(JobPhase::Archived, true)]
    #[case(JobPhase::Executing, false)]
    #[case(JobPhase::Pending, false)]
    fn terminal_phases(#[case] phase: JobPhase, #[case] terminal: bool) {
        assert_eq!(phase.is_terminal(), terminal);
    }

    #[test]
    fn phase_display_round_trips() {
        for phase in [
            JobPhase::Pending,
            JobPhase::Queued,
            JobPhase::Executing,
            JobPhase::Completed,
            JobPhase::Error,
            JobPhase::Aborted,
            JobPhase::Held,
            JobPhase::Suspended,
            JobPhase::Archived,
        ] {
            assert_eq!(JobPhase::from(phase.to_string().as_str()), phase);
        }
    }
}
