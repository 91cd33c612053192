pub mod cloud_http;
pub mod cloud_pg;
pub mod cloud_store;
pub mod debounce;
pub mod legacy;
pub mod local_store;
pub mod reports;
pub mod session;
pub mod sync;
