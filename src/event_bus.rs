// 事件总线 - 用于模块间解耦通信
//
// 账本保存和迁移任务在这里发布进度，命令行订阅后打印实时统计
// 使用 tokio::sync::broadcast 实现发布/订阅

use tokio::sync::broadcast;

/// 应用事件
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    // --- 账本事件 ---

    /// 会话保存完成（可能有部分明细失败）
    SessionSaved {
        record_id: String,
        created: usize,
        failed: usize,
    },

    /// 单条活动明细写入失败
    ActivityWriteFailed {
        name: String,
        error: String,
    },

    /// 待办状态已更新
    TodoStatusUpdated {
        todo_id: String,
        status: String,
    },

    // --- 迁移事件 ---

    /// 数据库结构已追加字段
    SchemaUpdated {
        database_id: String,
        added: Vec<String>,
    },

    /// 数据库结构更新失败
    SchemaUpdateFailed {
        database_id: String,
        error: String,
    },

    /// 字段迁移进度
    MigrationProgress {
        database_id: String,
        processed: usize,
        total: usize,
        updated: usize,
        failed: usize,
    },

    /// 单条记录迁移失败
    RecordMigrationFailed {
        database_id: String,
        page_id: String,
        error: String,
    },
}

/// 事件总线
///
/// 支持多个订阅者同时接收事件
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    ///
    /// # 参数
    /// - `capacity`: 事件缓冲区大小,建议 100-1000
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件
    ///
    /// 如果没有订阅者,事件会被丢弃
    pub fn publish(&self, event: AppEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                tracing::trace!("事件已发布，订阅者数量: {}", receiver_count);
            }
            Err(_) => {
                tracing::trace!("事件已发布但无订阅者");
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// 获取当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new(100);
        let mut receiver = bus.subscribe();

        bus.publish(AppEvent::TodoStatusUpdated {
            todo_id: "t1".to_string(),
            status: "已完成".to_string(),
        });

        match receiver.recv().await {
            Ok(AppEvent::TodoStatusUpdated { todo_id, .. }) => {
                assert_eq!(todo_id, "t1");
            }
            _ => panic!("未收到预期事件"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(100);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(AppEvent::SessionSaved {
            record_id: "1700000000000".to_string(),
            created: 2,
            failed: 0,
        });

        assert!(receiver1.try_recv().is_ok());
        assert!(receiver2.try_recv().is_ok());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(AppEvent::SchemaUpdateFailed {
            database_id: "db".to_string(),
            error: "boom".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_drains_after_bus_dropped() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(event) = receiver.recv().await {
                seen.push(event);
            }
            seen
        });

        for processed in 1..=3 {
            bus.publish(AppEvent::MigrationProgress {
                database_id: "db".to_string(),
                processed,
                total: 3,
                updated: processed,
                failed: 0,
            });
        }
        drop(bus);

        let seen = collector.await.unwrap();
        assert_eq!(seen.len(), 3);
    }
}
