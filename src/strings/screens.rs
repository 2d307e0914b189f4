//! # Screens
//!
//! Texts and button labels of the bundled sections.

// Home
pub const HOME_HELP: &str = "ℹ️ Help

Commands:
• /start - Main menu
• /input - Input examples
• /tasks - Background tasks

Buttons edit the current message; typed answers are picked up by pending questions.";

pub const BTN_HELP: &str = "ℹ️ Help";
pub const BTN_HOME: &str = "🏠 Home";
pub const BTN_INPUT: &str = "✍️ Input examples";
pub const BTN_TASKS: &str = "⏱ Background tasks";

pub fn home_welcome(name: &str, visits: u32) -> String {
    format!("🏠 Welcome, {name}!\n\nVisits this session: {visits}\nChoose an action:")
}

// Input examples
pub const INPUT_MENU: &str = "✍️ Input examples";
pub const INPUT_ASK_TEXT: &str = "Please enter some text:";
pub const INPUT_ASK_AWAIT: &str = "Please enter some text (with awaiting):";
pub const INPUT_ASK_NUMBER: &str = "Enter a number:";
pub const INPUT_NOT_A_NUMBER: &str = "That is not a number";
pub const INPUT_ASK_PHONE: &str = "Send your phone number:";
pub const INPUT_BAD_PHONE: &str = "That does not look like a phone number";
pub const INPUT_ASK_FILE: &str = "Upload a PDF or PNG (up to 5 MB):";
pub const INPUT_CANCELLED: &str = "Input was cancelled.";
pub const INPUT_SUPERSEDED: &str = "That question was replaced by a newer one.";
pub const INPUT_EXPIRED: &str = "Your session expired. Please start again.";

pub const BTN_ASK_TEXT: &str = "➕ Example input";
pub const BTN_ASK_AWAIT: &str = "➕ Example input with awaiting";
pub const BTN_ASK_NUMBER: &str = "🔢 Number";
pub const BTN_ASK_PHONE: &str = "📞 Phone";
pub const BTN_ASK_FILE: &str = "📎 File";

pub fn input_echo(text: &str) -> String {
    format!("You entered: {text}")
}

pub fn input_echo_awaited(text: &str) -> String {
    format!("You entered (awaiting): {text}")
}

pub fn input_number(value: f64) -> String {
    format!("Your number doubled is {}", value * 2.0)
}

pub fn input_phone(phone: &str) -> String {
    format!("Saved phone: {phone}")
}

pub fn input_file(name: &str, size: u64) -> String {
    format!("Received {name} ({size} bytes)")
}

// Tasks
pub const TASKS_MENU: &str = "⏱ Background tasks";
pub const TASKS_NONE: &str = "No task started yet.";
pub const TASKS_EMPTY_LIST: &str = "You have no tasks.";
pub const TASK_NOT_RUNNING: &str = "The task is not running.";
pub const TASK_PING: &str = "ping";

pub const BTN_RUN: &str = "▶️ Run task";
pub const BTN_STOP: &str = "⏹ Stop";
pub const BTN_STATUS: &str = "ℹ️ Status";
pub const BTN_PING: &str = "📨 Ping";
pub const BTN_LIST: &str = "📋 My tasks";

pub fn task_started(id: &str) -> String {
    format!("Task {id} is running.")
}

pub fn task_step(step: u32, total: u32) -> String {
    format!("Step {step}/{total} done")
}

pub fn task_pong(text: &str) -> String {
    format!("pong: {text}")
}

pub fn task_stopping(id: &str) -> String {
    format!("Stopping task {id}…")
}

pub fn task_status(id: &str, status: &str, messages: usize, error: Option<&str>) -> String {
    let mut text = format!("Task {id}\nStatus: {status}\nMessages: {messages}");
    if let Some(error) = error {
        text.push_str(&format!("\nError: {error}"));
    }
    text
}

pub fn task_list_line(id: &str, status: &str) -> String {
    format!("• {id}: {status}")
}
