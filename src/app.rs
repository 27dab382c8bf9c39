use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    clients::{YouTubeClient, YouTubeConfig, youtube::NewPlaylist},
    config::Config,
    observability::Telemetry,
    pipeline::{
        CurationPipeline, RunSummary,
        fetch::{JsonFileSource, VideoSource},
        publish::{DryRunPublisher, PlaylistInfo, PlaylistPublisher},
    },
};

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    youtube: Option<Arc<YouTubeClient>>,
    pipeline: CurationPipeline,
}

impl ComponentRegistry {
    /// 設定から取得元・公開先・メトリクスを組み立てる。
    ///
    /// `--input` があれば JSON ファイルから読み、`--dry-run` なら公開はログ出力のみとする。
    ///
    /// # Errors
    /// メトリクス登録や HTTP クライアント構築が失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;

        let needs_api = config.input().is_none() || !config.dry_run() || config.status_only();
        let youtube = if needs_api {
            Some(Arc::new(
                YouTubeClient::new(YouTubeConfig {
                    base_url: config.youtube_base_url().to_string(),
                    api_key: config.api_key().map(ToString::to_string),
                    access_token: config.access_token().map(ToString::to_string),
                    playlist_id: config.playlist_id().map(ToString::to_string),
                    playlist_id_file: config.playlist_id_file().map(Path::to_path_buf),
                    new_playlist: NewPlaylist {
                        title: config.playlist_title().map(ToString::to_string),
                        description: config.playlist_description().map(ToString::to_string),
                        privacy: config.playlist_privacy(),
                    },
                    connect_timeout: config.connect_timeout(),
                    total_timeout: config.total_timeout(),
                })
                .context("failed to build YouTube client")?,
            ))
        } else {
            None
        };

        let source: Arc<dyn VideoSource> = match config.input() {
            Some(path) => Arc::new(JsonFileSource::new(path)),
            None => youtube
                .clone()
                .context("YouTube client is required without an input file")?,
        };
        let publisher: Arc<dyn PlaylistPublisher> = match youtube.clone() {
            Some(client) if !config.dry_run() => client,
            _ => Arc::new(DryRunPublisher),
        };

        let pipeline = CurationPipeline::new(Arc::clone(&config), source, publisher)
            .with_metrics(telemetry.metrics_arc());

        Ok(Self {
            config,
            telemetry,
            youtube,
            pipeline,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// 1 回分の選定を実行し、指定があればメトリクスを書き出す。
    ///
    /// # Errors
    /// パイプラインが失敗した場合はエラーを返す。メトリクスは失敗時も書き出す。
    pub async fn run(&self) -> Result<RunSummary> {
        let result = self.pipeline.run().await;

        if let Some(path) = self.config.metrics_file() {
            if let Err(error) = self.telemetry.write_textfile(path).await {
                warn!(error = %error, "failed to write metrics file");
            }
        }

        let summary = result.context("curation run failed")?;
        info!(
            run_id = %summary.run_id,
            selected = summary.video_ids.len(),
            published = summary.published,
            dry_run = summary.publish.dry_run,
            created = summary.publish.created,
            removed = summary.publish.removed,
            inserted = summary.publish.inserted,
            playlist_url = summary.publish.playlist.as_ref().map_or("", |info| info.url.as_str()),
            "curation run finished"
        );
        Ok(summary)
    }

    /// 対象プレイリストのタイトル・件数・URL を取得してログに出す。
    ///
    /// # Errors
    /// プレイリスト ID が無い、見つからない、または取得に失敗した場合はエラーを返す。
    pub async fn report_status(&self) -> Result<PlaylistInfo> {
        let client = self
            .youtube
            .as_ref()
            .context("YouTube client is required to read playlist status")?;
        let playlist_id = client
            .playlist_id()
            .context("no playlist id configured")?
            .to_string();
        let info = client
            .playlist_info(&playlist_id)
            .await?
            .with_context(|| format!("playlist {playlist_id} not found"))?;

        info!(
            playlist_id = %info.id,
            title = %info.title,
            privacy = info.privacy_status.as_deref().unwrap_or("unknown"),
            item_count = info.item_count,
            url = %info.url,
            "playlist status"
        );
        Ok(info)
    }
}
