//! # Messages
//!
//! Contains constant strings and format functions for user-facing messages.
//! Includes access denials, input prompts, task notifications and button labels.

// Access
pub const USERNAME_REQUIRED: &str = "Username is not set.";
pub const ACCESS_DENIED_USERNAME: &str = "Access denied. Your username is not in the access list.";
pub const ACCESS_DENIED_KEY: &str = "Access denied. Your access key is not valid.";

// Dispatch
pub const GENERIC_FAILURE: &str = "⚠️ Something went wrong. Please try again.";
pub const UNKNOWN_COMMAND: &str = "❓ Unknown command.";

// Input
pub const DEFAULT_INPUT_ERROR: &str = "Invalid input format";
pub const DEFAULT_CANCEL_TEXT: &str = "Cancel";
pub const DEFAULT_CANCEL_ACTION: &str = "home.index[cancel_wait=1]";
pub const CANCEL_HINT: &str = "Use the \"Cancel\" button to cancel input.";

pub fn input_attempt(message: &str, attempt: u32) -> String {
    format!("{message} (attempt {attempt})")
}

pub fn cancel_button_label(text: &str) -> String {
    format!("❌ {text}")
}

pub fn unsupported_file_type(allowed: &[String]) -> String {
    format!("Unsupported file type. Allowed: {}", allowed.join(", "))
}

pub fn file_too_large(max_bytes: u64) -> String {
    format!("File is too large. Maximum size: {} MB", max_bytes.div_ceil(1024 * 1024))
}

pub fn file_too_small(min_bytes: u64) -> String {
    format!("File is too small. Minimum size: {} KB", min_bytes.div_ceil(1024))
}

// Tasks
pub const TASK_STARTED: &str = "Task started and will run in the background.";
pub const TASK_COMPLETED: &str = "Task completed successfully!";
pub const TASK_FAILED: &str = "An error occurred while running the task.";

pub fn task_message(task_id: &str, text: &str) -> String {
    format!("[Task {task_id}]: {text}")
}

pub fn task_external_message(task_id: &str, text: &str) -> String {
    format!("[External message for task {task_id}]: {text}")
}

pub fn task_failed(base: &str, err: &str) -> String {
    format!("{base}\nError: {err}")
}

// Pagination
pub const PAGE_PREV: &str = "⬅️ Back";
pub const PAGE_NEXT: &str = "Next ➡️";
pub const PAGE_FIRST: &str = "⏮ First";
pub const PAGE_LAST: &str = "Last ⏭";
