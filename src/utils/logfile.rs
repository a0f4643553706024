//! # 测量日志文件
//!
//! 测量运行期间把日志同时写入数据文件旁的 `<basename>.log`。
//!
//! ## 功能
//! - `MeasurementLog`: 可切换目标文件的 `MakeWriter`，未打开文件时丢弃输出
//! - `LogFileGuard`: 打开日志文件，离开作用域时关闭
//! - `file_layer`: 写入全局测量日志的 fmt 层
//!
//! ## 依赖关系
//! - 被 `main.rs`, `engine/sequence.rs` 使用

use crate::error::{PqcError, Result};

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::Layer;

/// 日志文件时间格式
const LOG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

static GLOBAL: OnceLock<MeasurementLog> = OnceLock::new();

/// 全局测量日志
pub fn global() -> &'static MeasurementLog {
    GLOBAL.get_or_init(MeasurementLog::default)
}

/// 写入全局测量日志的 fmt 层
pub fn file_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    layer_for(global().clone())
}

fn layer_for<S>(log: MeasurementLog) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(LOG_TIME_FORMAT.to_string()))
        .with_writer(log)
        .with_filter(tracing_subscriber::filter::LevelFilter::INFO)
}

/// 可切换目标文件的日志写入端
#[derive(Debug, Clone, Default)]
pub struct MeasurementLog {
    file: Arc<Mutex<Option<File>>>,
}

impl MeasurementLog {
    /// 创建日志文件，守卫释放前的日志都写入该文件
    pub fn open(&self, path: &Path) -> Result<LogFileGuard> {
        let file = File::create(path).map_err(|e| PqcError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;
        if let Ok(mut slot) = self.file.lock() {
            *slot = Some(file);
        }
        Ok(LogFileGuard { log: self.clone() })
    }

    fn close(&self) {
        if let Ok(mut slot) = self.file.lock() {
            if let Some(mut file) = slot.take() {
                let _ = file.flush();
            }
        }
    }
}

impl Write for MeasurementLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut slot) = self.file.lock() {
            if let Some(file) = slot.as_mut() {
                return file.write(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Ok(mut slot) = self.file.lock() {
            if let Some(file) = slot.as_mut() {
                return file.flush();
            }
        }
        Ok(())
    }
}

impl MakeWriter<'_> for MeasurementLog {
    type Writer = Self;

    fn make_writer(&self) -> Self::Writer {
        self.clone()
    }
}

/// 打开中的测量日志
#[must_use]
#[derive(Debug)]
pub struct LogFileGuard {
    log: MeasurementLog,
}

impl Drop for LogFileGuard {
    fn drop(&mut self) {
        self.log.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_events_written_while_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iv.log");
        let log = MeasurementLog::default();
        let subscriber = tracing_subscriber::registry().with(layer_for(log.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("before");
            let guard = log.open(&path).unwrap();
            tracing::info!("ramp to -10 V");
            tracing::debug!("not written");
            drop(guard);
            tracing::warn!("after");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("INFO"));
        assert!(content.contains("ramp to -10 V"));
        assert!(!content.contains("before"));
        assert!(!content.contains("after"));
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = MeasurementLog::default()
            .open(&dir.path().join("missing").join("iv.log"))
            .unwrap_err();
        assert!(err.to_string().contains("iv.log"));
    }
}
