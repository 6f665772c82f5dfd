pub mod chat_history;
pub mod task_done;
pub mod thinking;
