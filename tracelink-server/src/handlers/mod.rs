pub mod response;
pub mod submission;
pub mod tracelinks;

pub use response::TraceLinkResponse;
