//! VOTable handling: the typed tabular model and the XML parser that fills it.
//!
//! Includes:
//! - `model`: `VoTable`, `Resource`, `Table`, `Field`, `Value` and friends.
//! - `parse`: mapping a VOTable XML document onto the model.

mod model;
mod parse;

pub use model::*;
pub use parse::parse;

pub(crate) use parse::{attr_local, element_children};
