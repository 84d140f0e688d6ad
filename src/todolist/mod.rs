pub mod auth;
pub mod db;
pub mod feedback;
pub mod kv;
pub mod preferences;
pub mod serialization;
pub mod session;
pub mod todos;
pub mod types;
pub mod user;
pub mod validate;

// 重新导出会话相关类型
pub use session::{LoginState, RegistrationFlow, SessionConfig, SessionContext, SessionIdentity};

// 重新导出待办存储相关类型
pub use todos::{EmptyTodoListener, TodoListener, TodoStore};
pub use types::{TodoId, TodoItem};
