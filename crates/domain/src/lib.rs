//! 聊天室实时层的领域模型
//!
//! 包含显示名称、聊天消息、提示通知、在线事件等核心类型，
//! 以及实时总线上传输的帧格式。

pub mod errors;
pub mod events;
pub mod message;
pub mod notification;
pub mod presence;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use message::*;
pub use notification::*;
pub use presence::*;
pub use value_objects::*;
