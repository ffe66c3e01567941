//! VOSI introspection: the `capabilities` and `availability` documents every
//! compliant service publishes next to its query endpoints.

use crate::dal::check_status;
use crate::error::{Error, Result};
use crate::votable::{attr_local, element_children};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

/// One `capability` entry of a capabilities document.
#[derive(Debug, Clone, Serialize)]
pub struct Capability {
    /// The IVOA standard this capability implements,
    /// e.g. `ivo://ivoa.net/std/TAP`.
    pub standard_id: Option<String>,
    pub interfaces: Vec<Interface>,
}

/// An `interface` child of a capability.
#[derive(Debug, Clone, Serialize)]
pub struct Interface {
    pub access_url: String,
    /// The `use` attribute of the access URL (`base`, `full`, `dir`).
    pub use_role: Option<String>,
    /// The `xsi:type` of the interface, e.g. `vs:ParamHTTP`.
    pub interface_type: Option<String>,
    pub version: Option<String>,
}

/// The parsed capabilities document.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    capabilities: Vec<Capability>,
}

impl Capabilities {
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// The first capability whose standardID contains `fragment`
    /// (case-insensitive), e.g. `find("tap")` or `find("soda")`.
    pub fn find(&self, fragment: &str) -> Option<&Capability> {
        let fragment = fragment.to_ascii_lowercase();
        self.capabilities.iter().find(|c| {
            c.standard_id
                .as_deref()
                .is_some_and(|id| id.to_ascii_lowercase().contains(&fragment))
        })
    }
}

/// The parsed availability document.
#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub available: bool,
    pub up_since: Option<DateTime<Utc>>,
    /// Scheduled downtime start, when announced.
    pub down_at: Option<DateTime<Utc>>,
    /// Expected return of service, when announced.
    pub back_at: Option<DateTime<Utc>>,
    pub notes: Vec<String>,
}

/// Fetches and parses `{base}/capabilities`.
pub async fn capabilities(client: &Client, base_url: &str) -> Result<Capabilities> {
    let url = format!("{}/capabilities", base_url.trim_end_matches('/'));
    info!("Fetching capabilities from {}", url);
    let response = check_status(client.get(&url).send().await?)?;
    let body = response.text().await?;
    parse_capabilities(&body)
}

/// Fetches and parses `{base}/availability`.
pub async fn availability(client: &Client, base_url: &str) -> Result<Availability> {
    let url = format!("{}/availability", base_url.trim_end_matches('/'));
    info!("Fetching availability from {}", url);
    let response = check_status(client.get(&url).send().await?)?;
    let body = response.text().await?;
    parse_availability(&body)
}

pub(crate) fn parse_capabilities(xml: &str) -> Result<Capabilities> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "capabilities" {
        return Err(Error::Votable(format!(
            "expected VOSI capabilities document, found `{}`",
            root.tag_name().name()
        )));
    }

    let mut capabilities = Vec::new();
    for node in element_children(root).filter(|n| n.tag_name().name() == "capability") {
        let mut capability = Capability {
            standard_id: attr_local(node, "standardID").map(str::to_string),
            interfaces: Vec::new(),
        };
        for interface in element_children(node).filter(|n| n.tag_name().name() == "interface") {
            let access_url = element_children(interface)
                .find(|n| n.tag_name().name() == "accessURL");
            let Some(access_url_node) = access_url else {
                debug!("interface without accessURL skipped");
                continue;
            };
            capability.interfaces.push(Interface {
                access_url: access_url_node
                    .text()
                    .map(str::trim)
                    .unwrap_or("")
                    .to_string(),
                use_role: attr_local(access_url_node, "use").map(str::to_string),
                interface_type: attr_local(interface, "type").map(str::to_string),
                version: attr_local(interface, "version").map(str::to_string),
            });
        }
        capabilities.push(capability);
    }

    Ok(Capabilities { capabilities })
}

pub(crate) fn parse_availability(xml: &str) -> Result<Availability> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "availability" {
        return Err(Error::Votable(format!(
            "expected VOSI availability document, found `{}`",
            root.tag_name().name()
        )));
    }

    let mut availability = Availability {
        available: false,
        up_since: None,
        down_at: None,
        back_at: None,
        notes: Vec::new(),
    };

    for child in element_children(root) {
        let text = child.text().map(str::trim).unwrap_or("");
        match child.tag_name().name() {
            "available" => availability.available = text.eq_ignore_ascii_case("true"),
            "upSince" => availability.up_since = parse_vosi_time(text),
            "downAt" => availability.down_at = parse_vosi_time(text),
            "backAt" => availability.back_at = parse_vosi_time(text),
            "note" => {
                if !text.is_empty() {
                    availability.notes.push(text.to_string());
                }
            },
            _ => {},
        }
    }

    Ok(availability)
}

fn parse_vosi_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const CAPABILITIES: &str = r#"<?xml version="1.0"?>
<vosi:capabilities xmlns:vosi="http://www.ivoa.net/xml/VOSICapabilities/v1.0"
                   xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <capability standardID="ivo://ivoa.net/std/TAP">
    <interface xsi:type="vs:ParamHTTP" version="1.1" role="std">
      <accessURL use="base">http://archive.example.org/tap</accessURL>
    </interface>
  </capability>
  <capability standardID="ivo://ivoa.net/std/VOSI#availability">
    <interface xsi:type="vs:ParamHTTP">
      <accessURL use="full">http://archive.example.org/tap/availability</accessURL>
    </interface>
  </capability>
</vosi:capabilities>"#;

    #[test]
    fn capabilities_document_parses() {
        let caps = parse_capabilities(CAPABILITIES).unwrap();
        assert_eq!(caps.len(), 2);
        let tap = caps.find("std/TAP").unwrap();
        assert_eq!(tap.interfaces.len(), 1);
        assert_eq!(tap.interfaces[0].access_url, "http://archive.example.org/tap");
        assert_eq!(tap.interfaces[0].use_role.as_deref(), Some("base"));
        assert_eq!(tap.interfaces[0].interface_type.as_deref(), Some("vs:ParamHTTP"));
    }

    #[test]
    fn find_is_case_insensitive() {
        let caps = parse_capabilities(CAPABILITIES).unwrap();
        assert!(caps.find("vosi#availability").is_some());
        assert!(caps.find("sia").is_none());
    }

    #[test]
    fn availability_document_parses() {
        let xml = r#"<vosi:availability xmlns:vosi="http://www.ivoa.net/xml/VOSIAvailability/v1.0">
            <vosi:available>true</vosi:available>
            <vosi:upSince>2026-01-01T00:00:00Z</vosi:upSince>
            <vosi:note>nightly maintenance window 03:00-03:30 UTC</vosi:note>
        </vosi:availability>"#;
        let availability = parse_availability(xml).unwrap();
        assert!(availability.available);
        assert!(availability.up_since.is_some());
        assert_eq!(availability.notes.len(), 1);
    }

    #[tokio::test]
    async fn capabilities_endpoint_is_fetched() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/tap/capabilities")
            .with_status(200)
            .with_body(CAPABILITIES)
            .create_async()
            .await;

        let caps = capabilities(&reqwest::Client::new(), &format!("{}/tap", server.url()))
            .await
            .unwrap();
        assert!(caps.find("tap").is_some());
        mock.assert_async().await;
    }
}
