//! # Sections
//!
//! Bundled sections and the registry the binary starts with.

pub mod home;
pub mod input_demo;
pub mod tasker;

use crate::application::resolver::SectionRegistry;

pub fn registry() -> SectionRegistry {
    SectionRegistry::new()
        .definition(home::definition())
        .definition(input_demo::definition())
        .definition(tasker::definition())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::application::bot::Bot;
    use crate::domain::config::AppConfig;
    use crate::domain::types::{EventKind, FileInfo, InboundEvent, Sender};
    use crate::infrastructure::memory_store::InMemoryUserStore;
    use crate::infrastructure::recording::RecordingChat;
    use crate::strings::{messages, screens};

    fn bot(chat: Arc<RecordingChat>) -> Arc<Bot> {
        let bot = Bot::builder(AppConfig::default(), chat, Arc::new(InMemoryUserStore::new()))
            .sections(registry())
            .build()
            .unwrap();
        Arc::new(bot)
    }

    fn bob() -> Sender {
        Sender::new("7", "bob")
    }

    async fn wait_for(chat: &RecordingChat, check: impl Fn(&str) -> bool) -> String {
        for _ in 0..400 {
            if let Some(text) = chat.texts().await.into_iter().find(|t| check(t)) {
                return text;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected message never arrived");
    }

    #[test]
    fn test_registry_lists_bundled_sections() {
        let registry = registry();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["home", "input_demo", "tasker"]);
    }

    #[tokio::test]
    async fn test_start_counts_visits() {
        let chat = Arc::new(RecordingChat::new());
        let bot = bot(chat.clone());

        bot.handle_event(InboundEvent::command(bob(), "start", "")).await.unwrap();
        bot.handle_event(InboundEvent::callback(bob(), "home.index")).await.unwrap();

        let texts = chat.texts().await;
        assert_eq!(texts[0], screens::home_welcome("bob", 1));
        assert_eq!(texts[1], screens::home_welcome("bob", 2));
    }

    #[tokio::test]
    async fn test_text_continuation_echoes_answer() {
        let chat = Arc::new(RecordingChat::new());
        let bot = bot(chat.clone());

        bot.handle_event(InboundEvent::callback(bob(), "input_demo.ask_text")).await.unwrap();
        bot.handle_event(InboundEvent::text(bob(), "hello there")).await.unwrap();

        assert_eq!(
            chat.texts().await.last().cloned(),
            Some(screens::input_echo("hello there"))
        );
    }

    #[tokio::test]
    async fn test_number_question_retries_then_answers() {
        let chat = Arc::new(RecordingChat::new());
        let bot = bot(chat.clone());

        let asking = {
            let bot = bot.clone();
            tokio::spawn(async move {
                bot.handle_event(InboundEvent::callback(bob(), "input_demo.ask_number")).await
            })
        };
        wait_for(&chat, |t| t == screens::INPUT_ASK_NUMBER).await;

        bot.handle_event(InboundEvent::text(bob(), "twelve")).await.unwrap();
        wait_for(&chat, |t| t.starts_with(screens::INPUT_NOT_A_NUMBER)).await;

        bot.handle_event(InboundEvent::text(bob(), "12")).await.unwrap();
        asking.await.unwrap().unwrap();
        wait_for(&chat, |t| t == screens::input_number(12.0)).await;
    }

    #[tokio::test]
    async fn test_file_question_rejects_wrong_type() {
        let chat = Arc::new(RecordingChat::new());
        let bot = bot(chat.clone());

        let asking = {
            let bot = bot.clone();
            tokio::spawn(async move {
                bot.handle_event(InboundEvent::callback(bob(), "input_demo.ask_file")).await
            })
        };
        wait_for(&chat, |t| t == screens::INPUT_ASK_FILE).await;

        let upload = |mime: &str| {
            InboundEvent::new(
                bob(),
                EventKind::Document(FileInfo {
                    file_id: "f1".into(),
                    file_name: Some("report".into()),
                    mime_type: Some(mime.into()),
                    file_size: 2048,
                }),
            )
        };
        bot.handle_event(upload("text/plain")).await.unwrap();
        wait_for(&chat, |t| t.starts_with("Unsupported file type")).await;

        bot.handle_event(upload("application/pdf")).await.unwrap();
        asking.await.unwrap().unwrap();
        wait_for(&chat, |t| t == screens::input_file("report", 2048)).await;
    }

    #[tokio::test]
    async fn test_cancel_button_ends_awaited_question() {
        let chat = Arc::new(RecordingChat::new());
        let bot = bot(chat.clone());

        let asking = {
            let bot = bot.clone();
            tokio::spawn(async move {
                bot.handle_event(InboundEvent::callback(bob(), "input_demo.ask_phone")).await
            })
        };
        wait_for(&chat, |t| t == screens::INPUT_ASK_PHONE).await;

        bot.handle_event(InboundEvent::callback(bob(), messages::DEFAULT_CANCEL_ACTION))
            .await
            .unwrap();
        asking.await.unwrap().unwrap();
        wait_for(&chat, |t| t == screens::INPUT_CANCELLED).await;
    }

    #[tokio::test]
    async fn test_tasker_run_ping_and_stop() {
        let chat = Arc::new(RecordingChat::new());
        let bot = bot(chat.clone());

        bot.handle_event(InboundEvent::callback(bob(), "tasker.run")).await.unwrap();
        let started = wait_for(&chat, |t| t.starts_with("Task task_")).await;
        let id = started
            .trim_start_matches("Task ")
            .trim_end_matches(" is running.")
            .to_string();

        bot.handle_event(InboundEvent::callback(bob(), "tasker.ping")).await.unwrap();
        let pong = messages::task_message(&id, &screens::task_pong(screens::TASK_PING));
        wait_for(&chat, |t| t == pong).await;

        bot.handle_event(InboundEvent::callback(bob(), "tasker.stop")).await.unwrap();
        wait_for(&chat, |t| t == screens::task_stopping(&id)).await;

        for _ in 0..400 {
            let info = bot.tasks().info(&id).await.unwrap();
            if info.status.is_terminal() {
                assert_eq!(info.status, crate::application::tasks::TaskStatus::Cancelled);
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task never stopped");
    }

    #[tokio::test]
    async fn test_tasker_without_task() {
        let chat = Arc::new(RecordingChat::new());
        let bot = bot(chat.clone());

        bot.handle_event(InboundEvent::callback(bob(), "tasker.status")).await.unwrap();
        bot.handle_event(InboundEvent::callback(bob(), "tasker.list")).await.unwrap();
        assert_eq!(
            chat.texts().await,
            vec![screens::TASKS_NONE.to_string(), screens::TASKS_EMPTY_LIST.to_string()]
        );
    }
}
