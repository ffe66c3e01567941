//! Client library for the IVOA data-access protocols.
//!
//! Query remote astronomical archives over the standard VO interfaces and
//! get tabular results back:
//!
//! - [`tap`]: ADQL queries, synchronously or through UWS asynchronous jobs.
//! - [`scs`] / [`sia`] / [`ssa`] / [`sla`]: cone, image, spectrum and
//!   spectral-line searches.
//! - [`datalink`] / [`soda`]: related-dataset discovery and server-side
//!   cutouts.
//! - [`vosi`]: service capabilities and availability.
//! - [`votable`] / [`dal`]: the VOTable-to-table mapping every response
//!   goes through.
//!
//! # Quick start
//!
//! ```ignore
//! use vodal::tap::TapService;
//!
//! let service = TapService::new("https://archive.example.org/tap");
//! let results = service
//!     .run_sync("SELECT TOP 10 ra, dec FROM gaia.source")
//!     .await?;
//! for record in results.records() {
//!     println!("{:?} {:?}", record.get_f64("ra")?, record.get_f64("dec")?);
//! }
//! ```

pub mod cli;
pub mod dal;
pub mod datalink;
pub mod download;
pub mod error;
pub mod scs;
pub mod sia;
pub mod sla;
pub mod soda;
pub mod ssa;
pub mod tap;
pub mod vosi;
pub mod votable;

pub use dal::{DalQuery, DalResults, Record};
pub use error::{Error, Result};
pub use tap::{AsyncJob, JobPhase, TapService};
