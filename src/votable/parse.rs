//! Maps VOTable XML onto the `model` types.
//!
//! Matching is namespace-agnostic throughout: deployed services emit VOTable
//! 1.1 through 1.4 namespaces, prefixed or default, and some emit none at all.
//! Only the TABLEDATA serialization is decoded; BINARY/BINARY2/FITS streams
//! are not part of this client's scope.

use crate::error::{Error, Result};
use crate::votable::model::{Datatype, Field, Info, Param, Resource, Table, Value, VoTable};
use roxmltree::{Document, Node};

/// Parses a VOTable document from its XML text.
pub fn parse(xml: &str) -> Result<VoTable> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "VOTABLE" {
        return Err(Error::Votable(format!(
            "expected VOTABLE root element, found `{}`",
            root.tag_name().name()
        )));
    }

    let mut infos = Vec::new();
    let mut resources = Vec::new();
    for child in element_children(root) {
        match child.tag_name().name() {
            "INFO" => infos.push(parse_info(child)),
            "RESOURCE" => resources.push(parse_resource(child)?),
            // DESCRIPTION, COOSYS, GROUP, PARAM at document level carry no
            // tabular content.
            _ => {},
        }
    }

    Ok(VoTable {
        version: root.attribute("version").map(str::to_string),
        infos,
        resources,
    })
}

fn parse_resource(node: Node) -> Result<Resource> {
    let mut resource = Resource {
        id: attr_local(node, "ID").map(str::to_string),
        resource_type: node.attribute("type").map(str::to_string),
        utype: node.attribute("utype").map(str::to_string),
        infos: Vec::new(),
        params: Vec::new(),
        tables: Vec::new(),
        resources: Vec::new(),
    };

    for child in element_children(node) {
        match child.tag_name().name() {
            "INFO" => resource.infos.push(parse_info(child)),
            "PARAM" => resource.params.push(parse_param(child)),
            "TABLE" => resource.tables.push(parse_table(child)?),
            "RESOURCE" => resource.resources.push(parse_resource(child)?),
            _ => {},
        }
    }

    Ok(resource)
}

fn parse_info(node: Node) -> Info {
    Info {
        name: node.attribute("name").unwrap_or_default().to_string(),
        value: node.attribute("value").unwrap_or_default().to_string(),
        content: node
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

fn parse_param(node: Node) -> Param {
    Param {
        name: node.attribute("name").unwrap_or_default().to_string(),
        value: node.attribute("value").unwrap_or_default().to_string(),
        id: attr_local(node, "ID").map(str::to_string),
        ucd: node.attribute("ucd").map(str::to_string),
        utype: node.attribute("utype").map(str::to_string),
    }
}

fn parse_table(node: Node) -> Result<Table> {
    let mut table = Table {
        name: node.attribute("name").map(str::to_string),
        utype: node.attribute("utype").map(str::to_string),
        fields: Vec::new(),
        rows: Vec::new(),
        infos: Vec::new(),
    };

    for child in element_children(node) {
        match child.tag_name().name() {
            "FIELD" => table.fields.push(parse_field(child)?),
            "INFO" => table.infos.push(parse_info(child)),
            "DATA" => {
                for data_child in element_children(child) {
                    if data_child.tag_name().name() == "TABLEDATA" {
                        parse_tabledata(data_child, &table.fields, &mut table.rows)?;
                    }
                }
            },
            _ => {},
        }
    }

    Ok(table)
}

fn parse_field(node: Node) -> Result<Field> {
    let id = attr_local(node, "ID").map(str::to_string);
    let name = match node.attribute("name") {
        Some(name) => name.to_string(),
        // Some writers only set ID; fall back to it so lookups still work.
        None => id
            .clone()
            .ok_or_else(|| Error::Votable("FIELD element without name or ID".to_string()))?,
    };

    let datatype = node
        .attribute("datatype")
        .ok_or_else(|| Error::Votable(format!("field `{}` has no datatype", name)))
        .and_then(Datatype::parse)?;

    let mut description = None;
    let mut null_literal = None;
    for child in element_children(node) {
        match child.tag_name().name() {
            "DESCRIPTION" => {
                description = child.text().map(str::trim).map(str::to_string);
            },
            "VALUES" => {
                null_literal = node_values_null(child);
            },
            _ => {},
        }
    }

    Ok(Field {
        name,
        id,
        datatype,
        arraysize: node.attribute("arraysize").map(str::to_string),
        unit: node.attribute("unit").map(str::to_string),
        ucd: node.attribute("ucd").map(str::to_string),
        utype: node.attribute("utype").map(str::to_string),
        description,
        null_literal,
    })
}

fn node_values_null(values: Node) -> Option<String> {
    values.attribute("null").map(str::to_string)
}

fn parse_tabledata(node: Node, fields: &[Field], rows: &mut Vec<Vec<Value>>) -> Result<()> {
    for (row_index, tr) in element_children(node)
        .filter(|n| n.tag_name().name() == "TR")
        .enumerate()
    {
        let cells: Vec<&str> = element_children(tr)
            .filter(|n| n.tag_name().name() == "TD")
            .map(|td| td.text().unwrap_or(""))
            .collect();
        if cells.len() != fields.len() {
            return Err(Error::Votable(format!(
                "row {} has {} cells but the table declares {} fields",
                row_index,
                cells.len(),
                fields.len()
            )));
        }
        let row = fields
            .iter()
            .zip(cells)
            .map(|(field, raw)| decode_cell(field, raw))
            .collect::<Result<Vec<Value>>>()?;
        rows.push(row);
    }
    Ok(())
}

/// Decodes one TABLEDATA cell according to its field's declared type.
fn decode_cell(field: &Field, raw: &str) -> Result<Value> {
    let text = raw.trim();
    if let Some(null_literal) = &field.null_literal {
        if text == null_literal {
            return Ok(Value::Null);
        }
    }
    if text.is_empty() {
        return Ok(Value::Null);
    }
    // char columns are strings no matter what arraysize says.
    if field.datatype.is_char() {
        return Ok(Value::String(text.to_string()));
    }
    if field.is_scalar() {
        decode_scalar(field, text)
    } else {
        let items = text
            .split_whitespace()
            .map(|token| decode_scalar(field, token))
            .collect::<Result<Vec<Value>>>()?;
        Ok(Value::Array(items))
    }
}

fn decode_scalar(field: &Field, token: &str) -> Result<Value> {
    let bad = || {
        Error::Votable(format!(
            "field `{}`: cannot decode `{}` as {}",
            field.name, token, field.datatype
        ))
    };

    Ok(match field.datatype {
        Datatype::Boolean => match token {
            "1" | "t" | "T" | "true" | "True" | "TRUE" => Value::Boolean(true),
            "0" | "f" | "F" | "false" | "False" | "FALSE" => Value::Boolean(false),
            "?" => Value::Null,
            _ => return Err(bad()),
        },
        Datatype::Bit => match token {
            "0" => Value::Boolean(false),
            "1" => Value::Boolean(true),
            _ => return Err(bad()),
        },
        Datatype::UnsignedByte => {
            Value::Short(i16::from(token.parse::<u8>().map_err(|_| bad())?))
        },
        Datatype::Short => Value::Short(token.parse().map_err(|_| bad())?),
        Datatype::Int => Value::Int(token.parse().map_err(|_| bad())?),
        Datatype::Long => Value::Long(token.parse().map_err(|_| bad())?),
        Datatype::Float => {
            let v: f32 = token.parse().map_err(|_| bad())?;
            if v.is_nan() {
                Value::Null
            } else {
                Value::Float(v)
            }
        },
        Datatype::Double => {
            let v: f64 = token.parse().map_err(|_| bad())?;
            if v.is_nan() {
                Value::Null
            } else {
                Value::Double(v)
            }
        },
        // Unreachable: char datatypes are handled in decode_cell.
        Datatype::Char | Datatype::UnicodeChar => Value::String(token.to_string()),
    })
}

/// Element children of a node, in document order.
pub(crate) fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

/// Attribute lookup by local name, ignoring any namespace prefix. Needed for
/// `xlink:href`, `xsi:type` and the like.
pub(crate) fn attr_local<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == name)
        .map(|a| a.value())
}
