mod config;
mod queue;
mod request;
mod runtime;

pub use config::{ConfigError, EngineConfig, OptionsConfig, RequestOptions};
pub use queue::RequestQueue;
pub use request::{Request, RequestError, RequestSpec};
pub use runtime::{AjaxRuntime, Navigator};
