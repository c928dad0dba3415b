pub mod blocking;
pub mod pipeline;
pub mod ports;
pub mod response;

pub use pipeline::{ClientProtocol, DnsContext, QueryPipeline, QueryPipelineConfig};
