//! Datalink client: the `{links}` endpoint that associates a dataset ID with
//! its related resources (the dataset itself, previews, cutout services,
//! provenance, ...).

use crate::dal::{DalQuery, DalResults, Record};
use crate::error::{Error, Result};
use crate::soda::{service_descriptors, SodaService};
use reqwest::Client;
use tracing::info;

/// The columns the Datalink standard requires of every links response.
const REQUIRED_COLUMNS: [&str; 8] = [
    "ID",
    "access_url",
    "service_def",
    "error_message",
    "description",
    "semantics",
    "content_type",
    "content_length",
];

/// An asynchronous client for a Datalink `{links}` endpoint.
pub struct DatalinkService {
    client: Client,
    base_url: String,
}

impl DatalinkService {
    /// Creates a new `DatalinkService` for the given links endpoint.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a new `DatalinkService` sharing an existing HTTP client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the links for one dataset identifier.
    pub async fn links(&self, id: &str) -> Result<DatalinkResults> {
        info!("Fetching datalinks for {} from {}", id, self.base_url);
        let results = DalQuery::new(self.client.clone(), &self.base_url)
            .param("ID", id)
            .execute()
            .await?;
        DatalinkResults::from_results(results)
    }
}

/// A links table; each record points at one resource related to the queried
/// dataset.
#[derive(Debug)]
pub struct DatalinkResults {
    inner: DalResults,
}

impl DatalinkResults {
    /// Wraps a generic result table, verifying the Datalink column contract.
    pub fn from_results(results: DalResults) -> Result<Self> {
        let fieldnames = results.fieldnames();
        for required in REQUIRED_COLUMNS {
            if !fieldnames
                .iter()
                .any(|name| name.eq_ignore_ascii_case(required))
            {
                return Err(Error::Votable(format!(
                    "links response is missing the required column `{}`",
                    required
                )));
            }
        }
        Ok(Self { inner: results })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = DatalinkRecord<'_>> {
        self.inner.records().map(DatalinkRecord)
    }

    pub fn get(&self, row: usize) -> Option<DatalinkRecord<'_>> {
        self.inner.get(row).map(DatalinkRecord)
    }

    /// The link carrying the dataset itself (semantics `#this`), if any.
    pub fn this(&self) -> Option<DatalinkRecord<'_>> {
        self.records().find(|r| r.is_this())
    }

    /// A SODA cutout service advertised by the response's service
    /// descriptors, if any.
    pub fn soda_service(&self) -> Option<SodaService> {
        service_descriptors(self.inner.votable())
            .into_iter()
            .find_map(|descriptor| SodaService::from_descriptor(&descriptor))
    }

    pub fn as_results(&self) -> &DalResults {
        &self.inner
    }
}

/// One link row.
pub struct DatalinkRecord<'a>(Record<'a>);

impl<'a> DatalinkRecord<'a> {
    pub fn id(&self) -> Option<&'a str> {
        self.0.get("ID").ok().and_then(|v| v.as_str())
    }

    pub fn access_url(&self) -> Option<&'a str> {
        self.0.get("access_url").ok().and_then(|v| v.as_str())
    }

    /// Reference into a service descriptor, for rows that are served by a
    /// parameterised service instead of a plain URL.
    pub fn service_def(&self) -> Option<&'a str> {
        self.0.get("service_def").ok().and_then(|v| v.as_str())
    }

    pub fn error_message(&self) -> Option<&'a str> {
        self.0.get("error_message").ok().and_then(|v| v.as_str())
    }

    pub fn description(&self) -> Option<&'a str> {
        self.0.get("description").ok().and_then(|v| v.as_str())
    }

    /// The relationship of this link to the queried dataset, e.g. `#this`,
    /// `#preview`, `#cutout`.
    pub fn semantics(&self) -> Option<&'a str> {
        self.0.get("semantics").ok().and_then(|v| v.as_str())
    }

    pub fn content_type(&self) -> Option<&'a str> {
        self.0.get("content_type").ok().and_then(|v| v.as_str())
    }

    pub fn content_length(&self) -> Option<i64> {
        self.0.get("content_length").ok().and_then(|v| v.as_i64())
    }

    /// True when this link is the dataset itself.
    pub fn is_this(&self) -> bool {
        self.semantics() == Some("#this")
    }

    /// True when the service could not produce a link for this row.
    pub fn is_error(&self) -> bool {
        self.error_message().is_some_and(|m| !m.is_empty())
    }

    pub fn record(&self) -> &Record<'a> {
        &self.0
    }
}
