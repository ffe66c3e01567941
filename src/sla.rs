//! Simple Line Access (SLA) client: discovering spectral-line transitions
//! within a wavelength range.

use crate::dal::{interval, DalQuery, DalResults};
use crate::error::Result;
use reqwest::Client;
use tracing::info;

/// An asynchronous client for a spectral-line catalog service.
pub struct SlaService {
    client: Client,
    base_url: String,
}

impl SlaService {
    /// Creates a new `SlaService` for the given access URL.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a new `SlaService` sharing an existing HTTP client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Searches for transitions whose wavelength falls inside the given
    /// range, in meters. Either bound may be open.
    pub async fn search(
        &self,
        wavelength_min_m: Option<f64>,
        wavelength_max_m: Option<f64>,
    ) -> Result<DalResults> {
        self.search_with(wavelength_min_m, wavelength_max_m, None).await
    }

    /// Line search with a row limit.
    pub async fn search_with(
        &self,
        wavelength_min_m: Option<f64>,
        wavelength_max_m: Option<f64>,
        maxrec: Option<u64>,
    ) -> Result<DalResults> {
        let range = interval(wavelength_min_m, wavelength_max_m);
        info!("SLA search for wavelength {} against {}", range, self.base_url);
        let mut query = DalQuery::new(self.client.clone(), &self.base_url)
            .param("REQUEST", "queryData")
            .param("WAVELENGTH", range);
        if let Some(maxrec) = maxrec {
            query = query.param("MAXREC", maxrec.to_string());
        }
        query.execute().await
    }
}
