pub(crate) mod cors;
pub mod health;
pub(crate) mod non_streaming;
pub(crate) mod proxy;
pub(crate) mod streaming;
