pub mod todolist;

// 重新导出常用类型和函数，方便外部使用
pub use todolist::{
    preferences::{Preferences, PreferencesDao},
    session::{LoginState, RegistrationFlow, SessionConfig, SessionContext, SessionIdentity},
    todos::{EmptyTodoListener, TodoListener, TodoStore},
    types::{TodoId, TodoItem},
};
