pub mod gate;
pub mod repository;
pub mod service;

pub use gate::TaskMutation;
pub use repository::{SqliteTaskRepository, TaskFilter, TaskRepository};
pub use service::{NewUpload, TaskService};
