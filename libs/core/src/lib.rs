//! Shared vocabulary for the searchlink crates: node addresses and the
//! key/value configuration source consumed by the cluster services.

pub mod address;
pub mod error;
pub mod properties;

pub use address::NodeAddress;
pub use error::{Error, Result};
pub use properties::{Properties, PropertyValue};
