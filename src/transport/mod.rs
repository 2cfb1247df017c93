pub mod headers;
mod http_transport;
mod prepared_upstream;

pub use headers::{build_downstream_headers, build_upstream_headers};
pub use http_transport::HttpTransport;
pub use prepared_upstream::{PreparedUpstream, UpstreamCredentials};
