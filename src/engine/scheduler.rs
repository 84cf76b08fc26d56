//! 卷调度器
//!
//! 每个目录位置一个任务，由固定容量的信号量限流。
//! 结果按目录位置写回预分配的槽位，完成顺序不影响最终卷序。

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::core::error::{Result, SpiderError};
use crate::core::model::Volume;

pub struct VolumeScheduler {
    concurrency: usize,
}

impl VolumeScheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// 为每个未跳过的卷调用 `job(目录位置, 卷 ID)`
    ///
    /// 失败的卷记录日志后从结果中剔除；返回值按目录顺序排列，
    /// `series_idx` 即目录位置。
    pub async fn run<F, Fut>(&self, volume_ids: &[u64], skip: &HashSet<u64>, job: F) -> Vec<Volume>
    where
        F: Fn(usize, u64) -> Fut,
        Fut: Future<Output = Result<Volume>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (position, &volume_id) in volume_ids.iter().enumerate() {
            if skip.contains(&volume_id) {
                debug!("跳过卷 {}", volume_id);
                continue;
            }

            let gate = semaphore.clone();
            let fut = job(position, volume_id);
            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return (
                        position,
                        volume_id,
                        Err(SpiderError::Custom("volume gate closed".into())),
                    );
                };
                (position, volume_id, fut.await)
            });
        }

        let mut slots: Vec<Option<Volume>> = std::iter::repeat_with(|| None)
            .take(volume_ids.len())
            .collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, _, Ok(mut volume))) => {
                    volume.series_idx = position;
                    slots[position] = Some(volume);
                }
                Ok((_, volume_id, Err(e))) => {
                    error!("卷获取失败，已跳过 (卷 ID: {}): {}", volume_id, e);
                }
                Err(e) => {
                    error!("并发调度错误: {}", e);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}
