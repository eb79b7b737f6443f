pub mod ports;
pub mod publisher;
pub mod ingest_use_case;
pub mod transform_use_case;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use service::PulseService;
