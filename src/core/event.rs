//! 事件系统定义
//!
//! 用于采集管线与 UI 之间的完全解耦通信

use flume::{Receiver, Sender};

/// Spider 事件类型
#[derive(Debug, Clone)]
pub enum SpiderEvent {
    /// 任务开始
    TaskStarted { novel_id: u64, title: String },

    /// 发现待采集卷总数
    VolumesDiscovered { total: usize },

    /// 卷采集开始
    VolumeStarted {
        volume_id: u64,
        title: String,
        chapters: usize,
    },

    /// 章节采集完成
    ChapterCompleted { volume_id: u64, title: String },

    /// 卷采集完成
    VolumeCompleted { volume_id: u64, title: String },

    /// 卷采集失败 (已从结果中剔除)
    VolumeFailed { volume_id: u64, error: String },

    /// 打包完成
    PackGenerated { path: String },

    /// 任务完成
    TaskCompleted { title: String },

    /// 任务失败
    TaskFailed { error: String },
}

/// 事件发送器
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<SpiderEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<SpiderEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件
    pub fn emit(&self, event: SpiderEvent) {
        let _ = self.tx.send(event);
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<SpiderEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<SpiderEvent>) -> Self {
        Self { rx }
    }

    /// 非阻塞接收事件
    pub fn try_recv(&self) -> Option<SpiderEvent> {
        self.rx.try_recv().ok()
    }

    /// 异步接收事件
    pub async fn recv_async(&self) -> Option<SpiderEvent> {
        self.rx.recv_async().await.ok()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}
