//! Simple Cone Search (SCS) client: positional queries over catalog tables.

use crate::dal::{fmt_f64, DalQuery, DalResults};
use crate::error::Result;
use reqwest::Client;
use tracing::info;

/// An asynchronous client for a cone-search service.
pub struct ConeSearchService {
    client: Client,
    base_url: String,
}

impl ConeSearchService {
    /// Creates a new `ConeSearchService` for the given access URL.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a new `ConeSearchService` sharing an existing HTTP client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Searches the catalog for sources within `radius_deg` of the ICRS
    /// position (`ra_deg`, `dec_deg`).
    pub async fn search(&self, ra_deg: f64, dec_deg: f64, radius_deg: f64) -> Result<DalResults> {
        self.search_with(ra_deg, dec_deg, radius_deg, None, None).await
    }

    /// Cone search with explicit verbosity (`VERB`, 1..3) and row limit.
    pub async fn search_with(
        &self,
        ra_deg: f64,
        dec_deg: f64,
        radius_deg: f64,
        verbosity: Option<u8>,
        maxrec: Option<u64>,
    ) -> Result<DalResults> {
        info!(
            "Cone search at ({}, {}) radius {} deg against {}",
            ra_deg, dec_deg, radius_deg, self.base_url
        );
        let mut query = DalQuery::new(self.client.clone(), &self.base_url)
            .param("RA", fmt_f64(ra_deg))
            .param("DEC", fmt_f64(dec_deg))
            .param("SR", fmt_f64(radius_deg));
        if let Some(verb) = verbosity {
            query = query.param("VERB", verb.to_string());
        }
        if let Some(maxrec) = maxrec {
            query = query.param("MAXREC", maxrec.to_string());
        }
        query.execute().await
    }
}
