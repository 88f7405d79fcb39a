//! Configuration
//!
//! ```ignore
//! use fanscope_core::config::{default_config_path, load_config, save_config, FanscopeConfig};
//!
//! let path = default_config_path();
//! let config: FanscopeConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;
mod settings;

pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, default_model_dir};
pub use settings::{CacheConfig, FanscopeConfig, PlaybackConfig, SpectrumConfig};
