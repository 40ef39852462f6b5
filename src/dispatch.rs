//! 固定大小的工作池
//!
//! 生产者通过容量等于工作者数量的有界队列提交任务，队列满时阻塞；
//! 每个工作者在创建时注册到 `JoinSet`，`finish` 关闭队列并等待全部退出。

use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::model::{ClassificationJob, ClassificationResult};
use crate::wildcard::WildcardClassifier;

/// 分发管道
pub struct DispatchPipeline {
    jobs: mpsc::Sender<ClassificationJob>,
    workers: JoinSet<()>,
    running: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<Error>>>,
}

impl DispatchPipeline {
    /// 启动 `workers` 个工作者
    pub fn spawn(
        workers: usize,
        classifier: Arc<WildcardClassifier>,
        results: mpsc::Sender<ClassificationResult>,
        job_timeout: Option<Duration>,
    ) -> Self {
        let workers = workers.max(1);
        let (jobs, rx) = mpsc::channel::<ClassificationJob>(workers);
        let rx = Arc::new(AsyncMutex::new(rx));
        let running = Arc::new(AtomicBool::new(true));
        let fatal = Arc::new(Mutex::new(None));

        let mut set = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                jobs: Arc::clone(&rx),
                classifier: Arc::clone(&classifier),
                results: results.clone(),
                running: Arc::clone(&running),
                fatal: Arc::clone(&fatal),
                job_timeout,
            };
            set.spawn(worker.run());
        }

        DispatchPipeline {
            jobs,
            workers: set,
            running,
            fatal,
        }
    }

    /// 是否仍在运行（没有发生致命错误）
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 提交一个任务，队列满时等待
    pub async fn submit(&self, job: ClassificationJob) -> Result<()> {
        if !self.is_running() {
            return Err(Error::PipelineClosed);
        }
        self.jobs.send(job).await.map_err(|_| Error::PipelineClosed)
    }

    /// 关闭队列，等待所有工作者处理完剩余任务后退出
    pub async fn finish(self) -> Result<()> {
        let DispatchPipeline {
            jobs,
            mut workers,
            fatal,
            ..
        } = self;
        drop(jobs);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("工作者异常退出: {}", e);
            }
        }

        let fatal = fatal.lock().unwrap_or_else(|e| e.into_inner()).take();
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct Worker {
    id: usize,
    jobs: Arc<AsyncMutex<mpsc::Receiver<ClassificationJob>>>,
    classifier: Arc<WildcardClassifier>,
    results: mpsc::Sender<ClassificationResult>,
    running: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<Error>>>,
    job_timeout: Option<Duration>,
}

impl Worker {
    async fn run(self) {
        while self.running.load(Ordering::Acquire) {
            let job = {
                let mut jobs = self.jobs.lock().await;
                jobs.recv().await
            };
            let Some(job) = job else {
                break;
            };
            // 等待期间其他工作者可能已遇到致命错误
            if !self.running.load(Ordering::Acquire) {
                debug!("worker {}: 管道已停止，丢弃 {}", self.id, job.name);
                break;
            }

            match self.process(&job).await {
                Ok(result) => {
                    if self.results.send(result).await.is_err() {
                        debug!("worker {}: 结果通道已关闭", self.id);
                        break;
                    }
                }
                Err(e) if !e.is_fatal() => {
                    warn!("worker {}: {} 分类失败: {}，按非泛解析处理", self.id, job.name, e);
                    let result = ClassificationResult::new(&job.name, &job.domain, false, Vec::new());
                    if self.results.send(result).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("worker {}: {} 分类失败: {}", self.id, job.name, e);
                    self.running.store(false, Ordering::Release);
                    let mut fatal = self.fatal.lock().unwrap_or_else(|e| e.into_inner());
                    if fatal.is_none() {
                        *fatal = Some(e);
                    }
                    break;
                }
            }
        }
        debug!("worker {} 退出", self.id);
    }

    async fn process(&self, job: &ClassificationJob) -> Result<ClassificationResult> {
        let Some(limit) = self.job_timeout else {
            return self.classifier.classify_job(job).await;
        };
        match timeout(limit, self.classifier.classify_job(job)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} 分类超时，按非泛解析处理", job.name);
                Ok(ClassificationResult::new(&job.name, &job.domain, false, Vec::new()))
            }
        }
    }
}
