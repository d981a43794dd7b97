//! Web API 层。
//!
//! 提供 Axum 路由：名称登记、消息的 REST 接口，以及承载实时总线的 WebSocket 端点。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{JwtService, SessionResponse};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
