//! Defines the in-memory model a parsed VOTable document maps onto.
//!
//! Includes structs for:
//! - Document structure (`VoTable`, `Resource`, `Table`, `Info`, `Param`).
//! - Column metadata (`Field`, `Datatype`).
//! - Typed cell values (`Value`).

use crate::error::{Error, Result};
use std::fmt;

/// The primitive datatypes a VOTable `FIELD` may declare.
///
/// Complex datatypes (`floatComplex`, `doubleComplex`) are not accepted; no
/// data-access service response uses them for result columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    Boolean,
    Bit,
    UnsignedByte,
    Short,
    Int,
    Long,
    Char,
    UnicodeChar,
    Float,
    Double,
}

impl Datatype {
    /// Parses the `datatype` attribute value.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "boolean" => Datatype::Boolean,
            "bit" => Datatype::Bit,
            "unsignedByte" => Datatype::UnsignedByte,
            "short" => Datatype::Short,
            "int" => Datatype::Int,
            "long" => Datatype::Long,
            "char" => Datatype::Char,
            "unicodeChar" => Datatype::UnicodeChar,
            "float" => Datatype::Float,
            "double" => Datatype::Double,
            other => {
                return Err(Error::Votable(format!("unsupported datatype `{}`", other)));
            },
        })
    }

    /// Character datatypes hold strings regardless of arraysize.
    pub fn is_char(&self) -> bool {
        matches!(self, Datatype::Char | Datatype::UnicodeChar)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Datatype::Boolean => "boolean",
            Datatype::Bit => "bit",
            Datatype::UnsignedByte => "unsignedByte",
            Datatype::Short => "short",
            Datatype::Int => "int",
            Datatype::Long => "long",
            Datatype::Char => "char",
            Datatype::UnicodeChar => "unicodeChar",
            Datatype::Float => "float",
            Datatype::Double => "double",
        };
        write!(f, "{}", name)
    }
}

/// Column metadata from a `FIELD` element.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub id: Option<String>,
    pub datatype: Datatype,
    pub arraysize: Option<String>,
    pub unit: Option<String>,
    pub ucd: Option<String>,
    pub utype: Option<String>,
    pub description: Option<String>,
    /// Declared null literal from a `<VALUES null="...">` child, if any.
    pub null_literal: Option<String>,
}

impl Field {
    /// A field is scalar when no arraysize is declared (or it is exactly 1).
    pub fn is_scalar(&self) -> bool {
        matches!(self.arraysize.as_deref(), None | Some("1"))
    }
}

/// A single decoded table cell.
///
/// Integer widths below `short` are widened on decode; accessors widen
/// further, so callers usually go through `as_i64` / `as_f64`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of the value. Widens the integer types; never truncates
    /// floating-point values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating-point view of the value, promoting integers and `float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Short(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            },
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::from(*b),
            Value::Short(v) => serde_json::Value::from(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Long(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Value::from(*v),
            Value::String(s) => serde_json::Value::from(s.as_str()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            },
        }
    }
}

/// An `INFO` element: out-of-band metadata such as the DALI query status.
#[derive(Debug, Clone)]
pub struct Info {
    pub name: String,
    pub value: String,
    /// Element text content, used by DALI for the error message body.
    pub content: Option<String>,
}

/// A `PARAM` element; carries service-descriptor metadata such as `accessURL`.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub id: Option<String>,
    pub ucd: Option<String>,
    pub utype: Option<String>,
}

/// One table: column metadata plus row-major decoded cells.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: Option<String>,
    pub utype: Option<String>,
    pub fields: Vec<Field>,
    pub rows: Vec<Vec<Value>>,
    pub infos: Vec<Info>,
}

/// A `RESOURCE` element. Data-access responses put the result table in the
/// first resource; Datalink responses append `type="meta"` resources that
/// describe server-side processing services.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: Option<String>,
    pub resource_type: Option<String>,
    pub utype: Option<String>,
    pub infos: Vec<Info>,
    pub params: Vec<Param>,
    pub tables: Vec<Table>,
    pub resources: Vec<Resource>,
}

/// Outcome reported by the service inside the response document itself.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStatus {
    Ok,
    /// The query succeeded but the row set was truncated at the MAXREC limit.
    Overflow,
    Error(String),
}

/// A parsed VOTable document.
#[derive(Debug, Clone)]
pub struct VoTable {
    pub version: Option<String>,
    pub infos: Vec<Info>,
    pub resources: Vec<Resource>,
}

impl VoTable {
    /// The first table in document order, searching nested resources
    /// depth-first.
    pub fn first_table(&self) -> Option<&Table> {
        fn walk(resources: &[Resource]) -> Option<&Table> {
            for resource in resources {
                if let Some(table) = resource.tables.first() {
                    return Some(table);
                }
                if let Some(table) = walk(&resource.resources) {
                    return Some(table);
                }
            }
            None
        }
        walk(&self.resources)
    }

    /// Removes and returns the first table, leaving the rest of the document
    /// (trailing INFOs, service-descriptor resources) intact.
    pub fn take_first_table(&mut self) -> Option<Table> {
        fn walk(resources: &mut [Resource]) -> Option<Table> {
            for resource in resources {
                if !resource.tables.is_empty() {
                    return Some(resource.tables.remove(0));
                }
                if let Some(table) = walk(&mut resource.resources) {
                    return Some(table);
                }
            }
            None
        }
        walk(&mut self.resources)
    }

    /// All `INFO` elements in document order, across every nesting level.
    pub fn all_infos(&self) -> Vec<&Info> {
        fn walk<'a>(resources: &'a [Resource], out: &mut Vec<&'a Info>) {
            for resource in resources {
                out.extend(resource.infos.iter());
                for table in &resource.tables {
                    out.extend(table.infos.iter());
                }
                walk(&resource.resources, out);
            }
        }
        let mut out: Vec<&Info> = self.infos.iter().collect();
        walk(&self.resources, &mut out);
        out
    }

    /// Scans the document's `INFO` elements for the service-reported status.
    ///
    /// Recognises the DALI `QUERY_STATUS` convention and the legacy
    /// cone-search `INFO name="Error"` form. An `ERROR` anywhere wins over an
    /// `OVERFLOW`; a document without any status INFO counts as `Ok`, since
    /// older services omit it on success.
    pub fn query_status(&self) -> QueryStatus {
        let mut overflowed = false;
        for info in self.all_infos() {
            if info.name.eq_ignore_ascii_case("QUERY_STATUS") {
                match info.value.to_ascii_uppercase().as_str() {
                    "ERROR" => {
                        let message = info
                            .content
                            .as_deref()
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .unwrap_or("service reported an error without a message");
                        return QueryStatus::Error(message.to_string());
                    },
                    "OVERFLOW" => overflowed = true,
                    _ => {},
                }
            } else if info.name.eq_ignore_ascii_case("Error") {
                // Pre-DALI cone-search services put the message in `value`.
                let message = if info.value.trim().is_empty() {
                    info.content.clone().unwrap_or_default()
                } else {
                    info.value.clone()
                };
                return QueryStatus::Error(message.trim().to_string());
            }
        }
        if overflowed {
            QueryStatus::Overflow
        } else {
            QueryStatus::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_accessors_widen_integers() {
        assert_eq!(Value::Short(7).as_i64(), Some(7));
        assert_eq!(Value::Int(-3).as_i64(), Some(-3));
        assert_eq!(Value::Long(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::Double(1.5).as_i64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn value_display_is_wire_friendly() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "1 2"
        );
    }

    #[test]
    fn json_conversion_maps_null_and_arrays() {
        assert_eq!(serde_json::Value::from(&Value::Null), serde_json::Value::Null);
        assert_eq!(
            serde_json::Value::from(&Value::Array(vec![Value::Long(5), Value::Null])),
            serde_json::json!([5, null])
        );
    }
}
