//! Shared data-access-layer machinery used by every protocol front-end.
//!
//! Includes:
//! - `DalQuery`: a parameterised GET query against a service endpoint.
//! - `DalResults`: the table-like object a search returns.
//! - `Record`: row access with by-name and by-UCD column lookup.

use crate::error::{Error, Result};
use crate::votable::{self, Field, QueryStatus, Table, Value, VoTable};
use reqwest::{Client, Response};
use tracing::{debug, error};

/// Checks the HTTP status of a response, mapping non-success codes onto
/// `Error::Status` with the offending URL attached.
pub(crate) fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let url = response.url().to_string();
        error!("request to {} failed with HTTP status {}", url, status);
        Err(Error::Status { status, url })
    }
}

/// Formats a floating-point number for a query parameter. Rust's `Display`
/// for floats is locale-independent and round-trips, which is exactly what
/// the wire wants.
pub(crate) fn fmt_f64(v: f64) -> String {
    format!("{}", v)
}

/// Renders a DALI interval, with an empty side for an open bound:
/// `lo/hi`, `lo/`, `/hi`.
pub(crate) fn interval(lo: Option<f64>, hi: Option<f64>) -> String {
    format!(
        "{}/{}",
        lo.map(fmt_f64).unwrap_or_default(),
        hi.map(fmt_f64).unwrap_or_default()
    )
}

/// A GET query against a DAL endpoint, built up parameter by parameter and
/// executed into a `DalResults`.
#[derive(Debug, Clone)]
pub struct DalQuery {
    client: Client,
    base_url: String,
    params: Vec<(String, String)>,
}

impl DalQuery {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            params: Vec::new(),
        }
    }

    /// Adds a query parameter. Repeated keys are sent repeatedly, as DALI
    /// allows (e.g. SODA `POL`).
    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    /// The accumulated parameter list, in insertion order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The full request URL for this query.
    pub fn url(&self) -> Result<url::Url> {
        Ok(url::Url::parse_with_params(
            &self.base_url,
            self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?)
    }

    /// Runs the query and maps the response onto a `DalResults`.
    pub async fn execute(&self) -> Result<DalResults> {
        debug!("GET {} with {} parameters", self.base_url, self.params.len());
        let response = self
            .client
            .get(&self.base_url)
            .query(&self.params)
            .send()
            .await?;
        let response = check_status(response)?;
        let body = response.text().await?;
        DalResults::from_xml(&body)
    }
}

/// The table-like object every search returns: the first result table of the
/// response VOTable plus the overflow flag, with the rest of the document
/// kept around for Datalink service descriptors.
#[derive(Debug, Clone)]
pub struct DalResults {
    table: Table,
    votable: VoTable,
    overflowed: bool,
}

impl DalResults {
    /// Builds results from a parsed document.
    ///
    /// A `QUERY_STATUS = ERROR` anywhere in the document becomes
    /// `Error::Service`; a success document without any table is malformed.
    pub fn new(mut votable: VoTable) -> Result<Self> {
        let overflowed = match votable.query_status() {
            QueryStatus::Error(message) => return Err(Error::Service(message)),
            QueryStatus::Overflow => true,
            QueryStatus::Ok => false,
        };
        let table = votable
            .take_first_table()
            .ok_or_else(|| Error::Votable("response contains no result table".to_string()))?;
        Ok(Self {
            table,
            votable,
            overflowed,
        })
    }

    /// Parses XML text and builds results from it.
    pub fn from_xml(xml: &str) -> Result<Self> {
        Self::new(votable::parse(xml)?)
    }

    pub fn len(&self) -> usize {
        self.table.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.rows.is_empty()
    }

    /// True when the service truncated the row set at the MAXREC limit.
    /// The rows present are still valid.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn fields(&self) -> &[Field] {
        &self.table.fields
    }

    pub fn fieldnames(&self) -> Vec<&str> {
        self.table.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// The remainder of the response document (trailing INFOs, meta
    /// resources such as Datalink service descriptors).
    pub fn votable(&self) -> &VoTable {
        &self.votable
    }

    /// The record at `row`, if in range.
    pub fn get(&self, row: usize) -> Option<Record<'_>> {
        self.table.rows.get(row).map(|cells| Record {
            fields: &self.table.fields,
            row: cells,
        })
    }

    /// Iterates over all records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.table.rows.iter().map(|cells| Record {
            fields: &self.table.fields,
            row: cells,
        })
    }
}

/// One result row bound to its column metadata.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    fields: &'a [Field],
    row: &'a [Value],
}

impl<'a> Record<'a> {
    pub fn fields(&self) -> &'a [Field] {
        self.fields
    }

    /// The cell for `name`. Lookup is case-insensitive and also matches the
    /// field ID, since writers disagree about which one carries the column
    /// label.
    pub fn get(&self, name: &str) -> Result<&'a Value> {
        self.fields
            .iter()
            .position(|f| {
                f.name.eq_ignore_ascii_case(name)
                    || f.id.as_deref().is_some_and(|id| id.eq_ignore_ascii_case(name))
            })
            .map(|i| &self.row[i])
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    /// String view of a column; `None` for a null cell.
    pub fn get_str(&self, name: &str) -> Result<Option<&'a str>> {
        Ok(self.get(name)?.as_str())
    }

    /// Floating-point view of a column; `None` for a null cell or a
    /// non-numeric value.
    pub fn get_f64(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.get(name)?.as_f64())
    }

    /// Integer view of a column; `None` for a null cell or a non-integer
    /// value.
    pub fn get_i64(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.get(name)?.as_i64())
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        Ok(self.get(name)?.as_bool())
    }

    /// The cell of the first column declaring `ucd` (case-insensitive).
    /// Protocol record wrappers use this: the SIA/SSA column contract is
    /// expressed in UCDs, not names.
    pub fn by_ucd(&self, ucd: &str) -> Option<&'a Value> {
        self.fields
            .iter()
            .position(|f| f.ucd.as_deref().is_some_and(|u| u.eq_ignore_ascii_case(ucd)))
            .map(|i| &self.row[i])
    }

    /// The cell of the first column whose utype ends with `suffix`, ignoring
    /// the namespace prefix (`ssa:Access.Reference` matches
    /// `Access.Reference`).
    pub fn by_utype_suffix(&self, suffix: &str) -> Option<&'a Value> {
        self.fields
            .iter()
            .position(|f| {
                f.utype.as_deref().is_some_and(|u| {
                    u.rsplit(':')
                        .next()
                        .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
                })
            })
            .map(|i| &self.row[i])
    }

    pub fn str_by_ucd(&self, ucd: &str) -> Option<&'a str> {
        self.by_ucd(ucd).and_then(Value::as_str)
    }

    pub fn f64_by_ucd(&self, ucd: &str) -> Option<f64> {
        self.by_ucd(ucd).and_then(Value::as_f64)
    }

    /// The raw cells of this record, in column order.
    pub fn values(&self) -> &'a [Value] {
        self.row
    }

    /// Renders the record as a JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .zip(self.row)
            .map(|(field, value)| (field.name.clone(), serde_json::Value::from(value)))
            .collect::<serde_json::Map<String, serde_json::Value>>();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK: &str = r#"<VOTABLE><RESOURCE>
        <INFO name="QUERY_STATUS" value="OK"/>
        <TABLE>
          <FIELD name="Target" datatype="char" arraysize="*"/>
          <FIELD name="ra" datatype="double" ucd="POS_EQ_RA_MAIN"/>
          <FIELD name="url" datatype="char" arraysize="*" utype="ssa:Access.Reference"/>
          <DATA><TABLEDATA>
            <TR><TD>M31</TD><TD>10.68</TD><TD>http://a/1</TD></TR>
            <TR><TD>M33</TD><TD>23.46</TD><TD>http://a/2</TD></TR>
          </TABLEDATA></DATA>
        </TABLE>
    </RESOURCE></VOTABLE>"#;

    #[test]
    fn results_expose_rows_and_fieldnames() {
        let results = DalResults::from_xml(OK).unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results.overflowed());
        assert_eq!(results.fieldnames(), vec!["Target", "ra", "url"]);
    }

    #[test]
    fn record_lookup_is_case_insensitive() {
        let results = DalResults::from_xml(OK).unwrap();
        let record = results.get(0).unwrap();
        assert_eq!(record.get_str("TARGET").unwrap(), Some("M31"));
        assert_eq!(record.get_f64("Ra").unwrap(), Some(10.68));
    }

    #[test]
    fn record_lookup_by_ucd_and_utype() {
        let results = DalResults::from_xml(OK).unwrap();
        let record = results.get(1).unwrap();
        assert_eq!(record.f64_by_ucd("pos_eq_ra_main"), Some(23.46));
        assert_eq!(
            record.by_utype_suffix("Access.Reference").and_then(Value::as_str),
            Some("http://a/2")
        );
    }

    #[test]
    fn unknown_column_is_an_error() {
        let results = DalResults::from_xml(OK).unwrap();
        let record = results.get(0).unwrap();
        assert!(matches!(
            record.get("nope"),
            Err(Error::NoSuchColumn(name)) if name == "nope"
        ));
    }

    #[test]
    fn service_error_document_becomes_service_error() {
        let xml = r#"<VOTABLE><RESOURCE>
            <INFO name="QUERY_STATUS" value="ERROR">bad query</INFO>
        </RESOURCE></VOTABLE>"#;
        assert!(matches!(
            DalResults::from_xml(xml),
            Err(Error::Service(message)) if message == "bad query"
        ));
    }

    #[test]
    fn missing_table_on_success_is_malformed() {
        let xml = r#"<VOTABLE><RESOURCE>
            <INFO name="QUERY_STATUS" value="OK"/>
        </RESOURCE></VOTABLE>"#;
        assert!(matches!(DalResults::from_xml(xml), Err(Error::Votable(_))));
    }

    #[test]
    fn interval_renders_open_bounds() {
        assert_eq!(interval(Some(1.5), Some(2.0)), "1.5/2");
        assert_eq!(interval(None, Some(2.0)), "/2");
        assert_eq!(interval(Some(1.5), None), "1.5/");
    }

    #[test]
    fn record_to_json_keys_by_column() {
        let results = DalResults::from_xml(OK).unwrap();
        let json = results.get(0).unwrap().to_json();
        assert_eq!(json["Target"], serde_json::json!("M31"));
        assert_eq!(json["ra"], serde_json::json!(10.68));
    }
}
