// JSON adapters.
//
// - params: request document -> staged query parameters
// - result_set: column values -> response rows and the response document

pub mod params;
pub mod result_set;

pub use result_set::{JsonRow, QueryResponse, row_object};
