pub mod cloud_api;
pub mod retry;

pub use cloud_api::CloudApiClient;
pub use retry::RetryPolicy;
