pub mod metrics;
pub mod tracing;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder, proto::MetricFamily};

use self::metrics::Metrics;

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// メトリクスを初期化する。トレーシングは [`tracing::init`] で別途初期化する。
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(
            Metrics::new(Arc::clone(&registry)).context("failed to register metrics")?,
        );
        Ok(Self { registry, metrics })
    }

    /// メトリクスへのアクセスを提供する。
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_arc(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Prometheusメトリクスをレンダリングする。
    pub fn render_prometheus(&self) -> String {
        encode_text(&self.registry.gather())
    }

    /// node_exporter の textfile collector 向けにメトリクスを書き出す。
    ///
    /// 一時ファイルに書いてから rename するので、収集側が書きかけの内容を読むことはない。
    pub async fn write_textfile(&self, path: &Path) -> Result<()> {
        let staging = path.with_extension("prom.tmp");
        tokio::fs::write(&staging, self.render_prometheus())
            .await
            .with_context(|| format!("failed to write metrics to {}", staging.display()))?;
        tokio::fs::rename(&staging, path)
            .await
            .with_context(|| format!("failed to move metrics into {}", path.display()))?;
        ::tracing::debug!(path = %path.display(), "metrics textfile written");
        Ok(())
    }
}

/// エンコードに失敗した場合は警告を出し、それまでに書けた分だけを返す。
fn encode_text(metric_families: &[MetricFamily]) -> String {
    let mut buffer = Vec::new();
    if let Err(error) = TextEncoder::new().encode(metric_families, &mut buffer) {
        ::tracing::warn!(error = %error, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_else(|error| {
        ::tracing::warn!(error = %error, "encoded metrics are not valid UTF-8");
        String::new()
    })
}
