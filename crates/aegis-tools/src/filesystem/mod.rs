//! Filesystem tools (spec §4.E): `read_file`, `search_in_file`,
//! `list_directory`, `create_directory`, `execute_command`,
//! `get_today_date`, `get_current_time`. Every path-taking tool resolves
//! and checks the path against the context's [`aegis_terminal::PathPolicy`]
//! before touching disk.

pub mod create_directory;
pub mod datetime;
pub mod execute_command;
pub mod list_directory;
pub mod read_file;
pub mod search_in_file;

pub use create_directory::CreateDirectoryTool;
pub use datetime::{GetCurrentTimeTool, GetTodayDateTool};
pub use execute_command::ExecuteCommandTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use search_in_file::SearchInFileTool;
