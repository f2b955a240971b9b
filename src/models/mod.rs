//! Normalized gazetteer records.
//!
//! One struct per table. Importers build these from raw source rows; the
//! store, lookup and search layers only ever see these types.

pub mod btaa;
pub mod fast;
pub mod geonames;
pub mod lookup;
pub mod wof;

pub use btaa::BtaaRegion;
pub use fast::FastEntry;
pub use geonames::{Country, GeonamesRecord};
pub use lookup::LookupResult;
pub use wof::{WofAncestor, WofConcordance, WofDetails, WofGeoJson, WofName, WofPlace};
