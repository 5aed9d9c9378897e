pub mod identity;
pub mod json_error;
pub mod jwt;
pub mod login;
pub mod server_config;

pub use self::identity::{IdentitySummary, SetUserAuthority};
pub use self::json_error::ErrorResponse;
pub use self::jwt::Claims;
pub use self::login::{LoginData, LoginError, LoginResponse};
pub use self::server_config::{AppConfig, ConfigError, SigningAlgorithm, StoreBackend};
