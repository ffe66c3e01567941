//! SODA client: server-side processing (cutouts, band/time/polarization
//! filtering) of a dataset, usually reached through a Datalink service
//! descriptor.

use crate::dal::{fmt_f64, interval};
use crate::download;
use crate::error::Result;
use crate::votable::{Resource, VoTable};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::info;

/// A service descriptor from a `type="meta"` / `utype="adhoc:service"`
/// resource of a response document.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub access_url: String,
    pub standard_id: Option<String>,
    pub resource_id: Option<String>,
}

/// Extracts every service descriptor from a response document.
pub fn service_descriptors(votable: &VoTable) -> Vec<ServiceDescriptor> {
    fn walk(resources: &[Resource], out: &mut Vec<ServiceDescriptor>) {
        for resource in resources {
            let is_meta = resource.resource_type.as_deref() == Some("meta")
                || resource.utype.as_deref() == Some("adhoc:service");
            if is_meta {
                let param = |name: &str| {
                    resource
                        .params
                        .iter()
                        .find(|p| p.name.eq_ignore_ascii_case(name))
                        .map(|p| p.value.clone())
                };
                if let Some(access_url) = param("accessURL") {
                    out.push(ServiceDescriptor {
                        access_url,
                        standard_id: param("standardID"),
                        resource_id: resource.id.clone(),
                    });
                }
            }
            walk(&resource.resources, out);
        }
    }
    let mut out = Vec::new();
    walk(&votable.resources, &mut out);
    out
}

/// A cutout/filtering request against a SODA sync endpoint.
#[derive(Debug, Clone, Default)]
pub struct SodaQuery {
    pub id: String,
    /// Circular cutout: center (ra, dec) and radius, decimal degrees.
    pub circle: Option<(f64, f64, f64)>,
    /// Spectral filter in meters; either bound may be open.
    pub band: Option<(Option<f64>, Option<f64>)>,
    /// Time filter in MJD; either bound may be open.
    pub time: Option<(Option<f64>, Option<f64>)>,
    /// Polarization states to keep, e.g. `I`, `Q`.
    pub pol: Vec<String>,
}

impl SodaQuery {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn circle(mut self, ra_deg: f64, dec_deg: f64, radius_deg: f64) -> Self {
        self.circle = Some((ra_deg, dec_deg, radius_deg));
        self
    }

    pub fn band(mut self, min_m: Option<f64>, max_m: Option<f64>) -> Self {
        self.band = Some((min_m, max_m));
        self
    }

    pub fn time(mut self, min_mjd: Option<f64>, max_mjd: Option<f64>) -> Self {
        self.time = Some((min_mjd, max_mjd));
        self
    }

    pub fn pol(mut self, state: &str) -> Self {
        self.pol.push(state.to_string());
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("ID", self.id.clone())];
        if let Some((ra, dec, radius)) = self.circle {
            params.push((
                "CIRCLE",
                format!("{} {} {}", fmt_f64(ra), fmt_f64(dec), fmt_f64(radius)),
            ));
        }
        if let Some((lo, hi)) = self.band {
            params.push(("BAND", interval(lo, hi)));
        }
        if let Some((lo, hi)) = self.time {
            params.push(("TIME", interval(lo, hi)));
        }
        for state in &self.pol {
            params.push(("POL", state.clone()));
        }
        params
    }
}

/// An asynchronous client for a SODA sync endpoint.
pub struct SodaService {
    client: Client,
    base_url: String,
}

impl SodaService {
    /// Creates a new `SodaService` for the given sync endpoint.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a new `SodaService` sharing an existing HTTP client.
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    /// Builds a service from a descriptor, accepting only SODA ones.
    pub fn from_descriptor(descriptor: &ServiceDescriptor) -> Option<Self> {
        let standard_id = descriptor.standard_id.as_deref()?;
        if standard_id.to_ascii_lowercase().contains("soda") {
            Some(Self::new(&descriptor.access_url))
        } else {
            None
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The full request URL for a cutout, for handing to other tools.
    pub fn cutout_url(&self, query: &SodaQuery) -> Result<url::Url> {
        Ok(url::Url::parse_with_params(
            &self.base_url,
            query.params().iter().map(|(k, v)| (*k, v.as_str())),
        )?)
    }

    /// Runs the cutout and streams the processed dataset to `dest`.
    pub async fn execute_to_file(&self, query: &SodaQuery, dest: &Path) -> Result<PathBuf> {
        let url = self.cutout_url(query)?;
        info!("Running SODA cutout {}", url);
        download::fetch_to_file(&self.client, url.as_str(), dest, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::votable;

    #[test]
    fn cutout_url_renders_all_filters() {
        let service = SodaService::new("http://data/soda/sync");
        let query = SodaQuery::new("ivo://obs/123")
            .circle(83.6, 22.0, 0.1)
            .band(Some(0.0000005), None)
            .pol("I")
            .pol("Q");
        let url = service.cutout_url(&query).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(pairs.contains(&("ID".to_string(), "ivo://obs/123".to_string())));
        assert!(pairs.contains(&("CIRCLE".to_string(), "83.6 22 0.1".to_string())));
        assert!(pairs.contains(&("BAND".to_string(), "0.0000005/".to_string())));
        assert_eq!(
            pairs.iter().filter(|(k, _)| k == "POL").count(),
            2,
            "POL must repeat per state"
        );
    }

    #[test]
    fn descriptors_are_extracted_from_meta_resources() {
        let xml = r#"<VOTABLE>
          <RESOURCE type="results"><TABLE><FIELD name="x" datatype="int"/></TABLE></RESOURCE>
          <RESOURCE type="meta" utype="adhoc:service" ID="soda-svc">
            <PARAM name="accessURL" datatype="char" arraysize="*" value="http://d/soda/sync"/>
            <PARAM name="standardID" datatype="char" arraysize="*" value="ivo://ivoa.net/std/SODA#sync-1.0"/>
          </RESOURCE>
        </VOTABLE>"#;
        let vot = votable::parse(xml).unwrap();
        let descriptors = service_descriptors(&vot);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].access_url, "http://d/soda/sync");
        assert_eq!(descriptors[0].resource_id.as_deref(), Some("soda-svc"));
        assert!(SodaService::from_descriptor(&descriptors[0]).is_some());
    }

    #[test]
    fn non_soda_descriptor_is_not_a_cutout_service() {
        let descriptor = ServiceDescriptor {
            access_url: "http://d/other".to_string(),
            standard_id: Some("ivo://ivoa.net/std/DataLink#links-1.0".to_string()),
            resource_id: None,
        };
        assert!(SodaService::from_descriptor(&descriptor).is_none());
    }
}
