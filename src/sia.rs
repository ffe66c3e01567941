//! Simple Image Access (SIA) client: discovering images that overlap a sky
//! region, with typed access to the standard result columns.

use crate::dal::{fmt_f64, DalQuery, DalResults, Record};
use crate::error::Result;
use reqwest::Client;
use std::fmt;
use tracing::info;

/// The SIA region-matching modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersect {
    Covers,
    Enclosed,
    Center,
    Overlaps,
}

impl fmt::Display for Intersect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intersect::Covers => "COVERS",
            Intersect::Enclosed => "ENCLOSED",
            Intersect::Center => "CENTER",
            Intersect::Overlaps => "OVERLAPS",
        };
        write!(f, "{}", name)
    }
}

/// Parameters of one image query.
#[derive(Debug, Clone)]
pub struct SiaQuery {
    /// ICRS position, decimal degrees.
    pub pos: (f64, f64),
    /// Angular extent in degrees; the second value defaults to the first.
    pub size: (f64, Option<f64>),
    /// MIME filter, e.g. `image/fits`, or the SIA specials `ALL`/`GRAPHIC`.
    pub format: Option<String>,
    pub intersect: Option<Intersect>,
    pub verbosity: Option<u8>,
    pub maxrec: Option<u64>,
}

impl SiaQuery {
    pub fn new(ra_deg: f64, dec_deg: f64, size_deg: f64) -> Self {
        Self {
            pos: (ra_deg, dec_deg),
            size: (size_deg, None),
            format: None,
            intersect: None,
            verbosity: None,
            maxrec: None,
        }
    }

    fn size_param(&self) -> String {
        match self.size.1 {
            Some(height) => format!("{},{}", fmt_f64(self.size.0), fmt_f64(height)),
            None => fmt_f64(self.size.0),
        }
    }
}

/// Image-discovery results; each record describes one matching image.
pub struct SiaResults {
    inner: DalResults,
}

impl SiaResults {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn overflowed(&self) -> bool {
        self.inner.overflowed()
    }

    pub fn records(&self) -> impl Iterator<Item = SiaRecord<'_>> {
        self.inner.records().map(SiaRecord)
    }

    pub fn get(&self, row: usize) -> Option<SiaRecord<'_>> {
        self.inner.get(row).map(SiaRecord)
    }

    /// The plain tabular view, for callers that want other columns.
    pub fn as_results(&self) -> &DalResults {
        &self.inner
    }

    pub fn into_inner(self) -> DalResults {
        self.inner
    }
}

/// One image record. The SIA column contract is expressed through UCDs, so
/// the accessors look columns up by UCD rather than by name.
pub struct SiaRecord<'a>(Record<'a>);

impl<'a> SiaRecord<'a> {
    pub fn title(&self) -> Option<&'a str> {
        self.0.str_by_ucd("VOX:Image_Title")
    }

    /// URL the image can be fetched from.
    pub fn access_url(&self) -> Option<&'a str> {
        self.0.str_by_ucd("VOX:Image_AccessReference")
    }

    /// MIME type of the dataset behind the access URL.
    pub fn format(&self) -> Option<&'a str> {
        self.0.str_by_ucd("VOX:Image_Format")
    }

    pub fn ra(&self) -> Option<f64> {
        self.0.f64_by_ucd("POS_EQ_RA_MAIN")
    }

    pub fn dec(&self) -> Option<f64> {
        self.0.f64_by_ucd("POS_EQ_DEC_MAIN")
    }

    /// The underlying record, for non-standard columns.
    pub fn record(&self) -> &Record<'a> {
        &self.0
    }
}

/// An asynchronous client for an SIA service.
pub struct SiaService {
    client: Client,
    base_url: String,
}

impl SiaService {
    /// Creates a new `SiaService` for the given access URL.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a new `SiaService` sharing an existing HTTP client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs an image query.
    pub async fn search(&self, query: &SiaQuery) -> Result<SiaResults> {
        info!(
            "SIA search at ({}, {}) size {} against {}",
            query.pos.0,
            query.pos.1,
            query.size_param(),
            self.base_url
        );
        let mut dal = DalQuery::new(self.client.clone(), &self.base_url)
            .param(
                "POS",
                format!("{},{}", fmt_f64(query.pos.0), fmt_f64(query.pos.1)),
            )
            .param("SIZE", query.size_param());
        if let Some(format) = &query.format {
            dal = dal.param("FORMAT", format.clone());
        }
        if let Some(intersect) = query.intersect {
            dal = dal.param("INTERSECT", intersect.to_string());
        }
        if let Some(verb) = query.verbosity {
            dal = dal.param("VERB", verb.to_string());
        }
        if let Some(maxrec) = query.maxrec {
            dal = dal.param("MAXREC", maxrec.to_string());
        }
        Ok(SiaResults {
            inner: dal.execute().await?,
        })
    }
}
