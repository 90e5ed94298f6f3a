pub mod aggregator;
pub mod error;
pub mod value;

pub use aggregator::*;
pub use error::*;
pub use value::*;

pub type OlapResult<T> = Result<T, OlapError>;
