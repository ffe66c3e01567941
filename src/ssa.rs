//! Simple Spectral Access (SSA) client: discovering spectra by position,
//! spectral band and time coverage.

use crate::dal::{fmt_f64, interval, DalQuery, DalResults, Record};
use crate::error::Result;
use crate::votable::Value;
use reqwest::Client;
use tracing::info;

/// Parameters of one spectrum query.
#[derive(Debug, Clone)]
pub struct SsaQuery {
    /// ICRS position, decimal degrees.
    pub pos: (f64, f64),
    /// Search diameter in degrees.
    pub diameter_deg: f64,
    /// Spectral range in meters; either bound may be open.
    pub band: Option<(Option<f64>, Option<f64>)>,
    /// Time coverage as an ISO 8601 range literal (`1998-05-21/1999`),
    /// passed through verbatim.
    pub time: Option<String>,
    pub format: Option<String>,
    pub maxrec: Option<u64>,
}

impl SsaQuery {
    pub fn new(ra_deg: f64, dec_deg: f64, diameter_deg: f64) -> Self {
        Self {
            pos: (ra_deg, dec_deg),
            diameter_deg,
            band: None,
            time: None,
            format: None,
            maxrec: None,
        }
    }
}

/// Spectrum-discovery results.
pub struct SsaResults {
    inner: DalResults,
}

impl SsaResults {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn overflowed(&self) -> bool {
        self.inner.overflowed()
    }

    pub fn records(&self) -> impl Iterator<Item = SsaRecord<'_>> {
        self.inner.records().map(SsaRecord)
    }

    pub fn get(&self, row: usize) -> Option<SsaRecord<'_>> {
        self.inner.get(row).map(SsaRecord)
    }

    pub fn as_results(&self) -> &DalResults {
        &self.inner
    }

    pub fn into_inner(self) -> DalResults {
        self.inner
    }
}

/// One spectrum record. SSA expresses its column contract in utypes, with a
/// UCD fallback kept for older services.
pub struct SsaRecord<'a>(Record<'a>);

impl<'a> SsaRecord<'a> {
    pub fn title(&self) -> Option<&'a str> {
        self.0
            .by_utype_suffix("DataID.Title")
            .and_then(Value::as_str)
    }

    /// URL the spectrum can be fetched from.
    pub fn access_url(&self) -> Option<&'a str> {
        self.0
            .by_utype_suffix("Access.Reference")
            .and_then(Value::as_str)
            .or_else(|| self.0.str_by_ucd("DATA_LINK"))
    }

    /// MIME type of the dataset behind the access URL.
    pub fn format(&self) -> Option<&'a str> {
        self.0
            .by_utype_suffix("Access.Format")
            .and_then(Value::as_str)
    }

    pub fn record(&self) -> &Record<'a> {
        &self.0
    }
}

/// An asynchronous client for an SSA service.
pub struct SsaService {
    client: Client,
    base_url: String,
}

impl SsaService {
    /// Creates a new `SsaService` for the given access URL.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a new `SsaService` sharing an existing HTTP client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs a spectrum query.
    pub async fn search(&self, query: &SsaQuery) -> Result<SsaResults> {
        info!(
            "SSA search at ({}, {}) diameter {} against {}",
            query.pos.0, query.pos.1, query.diameter_deg, self.base_url
        );
        let mut dal = DalQuery::new(self.client.clone(), &self.base_url)
            .param("REQUEST", "queryData")
            .param(
                "POS",
                format!("{},{}", fmt_f64(query.pos.0), fmt_f64(query.pos.1)),
            )
            .param("DIAMETER", fmt_f64(query.diameter_deg));
        if let Some((lo, hi)) = query.band {
            dal = dal.param("BAND", interval(lo, hi));
        }
        if let Some(time) = &query.time {
            dal = dal.param("TIME", time.clone());
        }
        if let Some(format) = &query.format {
            dal = dal.param("FORMAT", format.clone());
        }
        if let Some(maxrec) = query.maxrec {
            dal = dal.param("MAXREC", maxrec.to_string());
        }
        Ok(SsaResults {
            inner: dal.execute().await?,
        })
    }
}
