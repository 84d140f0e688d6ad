pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;
pub mod watch;

pub use api::{HttpTodoApi, TodoApi};
pub use dao::TodoBlobDao;
pub use listener::{EmptyTodoListener, TodoListener};
pub use models::TodoStoreConfig;
pub use service::TodoStore;
pub use watch::WatchHandle;
