// 关联更新 - 保存会话后把活动指定的待办状态写回待办库
//
// 同一个待办被多条活动引用时，按条目顺序后者覆盖前者，每个待办只更新一次。
// 更新失败只记录，不影响已保存的记录。

use std::sync::Arc;
use tracing::{info, warn};

use super::entities::{Todo, TodoStatus};
use super::entry::ActivityEntry;
use crate::event_bus::{AppEvent, EventBus};
use crate::notion::RemoteStore;

/// 一次待办状态更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoUpdate {
    pub todo_id: String,
    pub status: TodoStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkFailure {
    pub todo_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkReport {
    pub updated: Vec<String>,
    pub failed: Vec<LinkFailure>,
}

impl LinkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct RelationLinker {
    store: Arc<dyn RemoteStore>,
    events: Option<Arc<EventBus>>,
}

impl RelationLinker {
    pub fn new(store: Arc<dyn RemoteStore>, events: Option<Arc<EventBus>>) -> Self {
        Self { store, events }
    }

    /// 收集待办状态更新，保持每个待办首次出现的顺序
    pub fn collect<'a, I>(entries: I) -> Vec<TodoUpdate>
    where
        I: IntoIterator<Item = &'a ActivityEntry>,
    {
        let mut updates: Vec<TodoUpdate> = Vec::new();
        for entry in entries {
            let (Some(todo_id), Some(status)) = (&entry.todo_id, entry.todo_status) else {
                continue;
            };
            match updates.iter_mut().find(|u| &u.todo_id == todo_id) {
                Some(existing) => existing.status = status,
                None => updates.push(TodoUpdate {
                    todo_id: todo_id.clone(),
                    status,
                }),
            }
        }
        updates
    }

    pub async fn apply(&self, updates: &[TodoUpdate]) -> LinkReport {
        let mut report = LinkReport::default();

        for update in updates {
            let props = Todo::status_properties(update.status);
            match self.store.update_page(&update.todo_id, &props).await {
                Ok(_) => {
                    info!("待办 {} 状态更新为 {}", update.todo_id, update.status);
                    report.updated.push(update.todo_id.clone());
                    if let Some(events) = &self.events {
                        events.publish(AppEvent::TodoStatusUpdated {
                            todo_id: update.todo_id.clone(),
                            status: update.status.to_string(),
                        });
                    }
                }
                Err(e) => {
                    warn!("待办 {} 状态更新失败: {}", update.todo_id, e);
                    report.failed.push(LinkFailure {
                        todo_id: update.todo_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::entities::RemoteEnum;
    use crate::models::DatabaseIds;
    use crate::notion::{InMemoryStore, Page};
    use crate::schema::target::{self, EntityKind};

    fn entry(todo: &str, status: TodoStatus) -> ActivityEntry {
        ActivityEntry::new("任务", 30).with_todo(todo, Some(status))
    }

    #[test]
    fn test_collect_last_writer_wins() {
        let entries = vec![
            entry("t1", TodoStatus::InProgress),
            entry("t2", TodoStatus::InProgress),
            ActivityEntry::new("无关", 10),
            entry("t1", TodoStatus::Completed),
        ];
        let updates = RelationLinker::collect(&entries);
        assert_eq!(
            updates,
            vec![
                TodoUpdate {
                    todo_id: "t1".to_string(),
                    status: TodoStatus::Completed
                },
                TodoUpdate {
                    todo_id: "t2".to_string(),
                    status: TodoStatus::InProgress
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_isolates_failures() {
        let store = Arc::new(InMemoryStore::new());
        let ids = DatabaseIds {
            todo: "todo-db".to_string(),
            goal: "goal-db".to_string(),
            ..Default::default()
        };
        store
            .insert_database(target::target_schema(EntityKind::Todo, &ids))
            .await;
        for id in ["t1", "t2"] {
            let todo = Todo::new(id);
            store
                .insert_page(
                    "todo-db",
                    Page {
                        id: id.to_string(),
                        properties: todo.to_properties(),
                    },
                )
                .await;
        }
        store.fail_page_update("t1").await;

        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let linker = RelationLinker::new(store.clone(), Some(events));
        let updates = RelationLinker::collect(&[
            entry("t1", TodoStatus::Completed),
            entry("t2", TodoStatus::Completed),
        ]);
        let report = linker.apply(&updates).await;

        assert_eq!(report.updated, vec!["t2".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].todo_id, "t1");
        assert_eq!(store.call_count("update_page").await, 2);

        let page = store.page("t2").await.unwrap();
        assert_eq!(
            page.text(target::todo::STATUS),
            Some(TodoStatus::Completed.remote_name())
        );
        assert!(matches!(
            rx.try_recv(),
            Ok(AppEvent::TodoStatusUpdated { ref todo_id, .. }) if todo_id == "t2"
        ));
    }
}
