mod settings;

pub use settings::{
    AuthenticationMode, BackendKind, DatabaseConfig, DocumentConfig, RedisConfig, ServerConfig,
    Settings, TokenConfig,
};
