pub mod countdown;
pub mod error;
pub mod metrics;
pub mod model;
pub mod ports;
pub mod reconcile;

pub use countdown::*;
pub use error::*;
pub use metrics::*;
pub use model::*;
pub use ports::*;
pub use reconcile::*;
