//! 客户端：缓存、重试、去重与超时的统一入口。
//!
//! Unified client interface.
//!
//! Keep the public surface small and predictable. Implementation details are
//! split into submodules under `src/client/`.

pub mod builder;
pub mod config;
pub mod core;
pub mod options;
pub mod response;
pub mod types;

pub use builder::ApiClientBuilder;
pub use config::{CacheSettings, CacheStrategy, ClientConfig};
pub use core::ApiClient;
pub use options::RequestOptions;
pub use response::{ApiResponse, ResponseBody};
pub use types::CallStats;
