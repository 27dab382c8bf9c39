//! YouTube Data API v3 クライアント。
//!
//! 候補動画の取得（uploads プレイリスト → playlistItems → videos）と、
//! 対象プレイリストの置き換え（全削除 → 順番に挿入）を行う。
//! 対象プレイリストが未設定なら作成し、公開後にプレイリストの状態を読み戻す。
//! 再試行は行わず、2xx 以外の応答はステータスと本文を含むエラーとして返す。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_YOUTUBE_BASE_URL, PlaylistPrivacy};
use crate::model::VideoMetadata;
use crate::pipeline::fetch::{FetchRequest, VideoSource};
use crate::pipeline::publish::{PlaylistInfo, PlaylistPublisher, PublishReport};
use crate::util::time::{parse_iso8601_duration, parse_timestamp};

/// API の 1 リクエストあたりの上限件数。
const MAX_PAGE_SIZE: usize = 50;

/// Settings for a playlist created when no target id is configured.
///
/// Blank title and description fall back to dated defaults at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPlaylist {
    pub title: Option<String>,
    pub description: Option<String>,
    pub privacy: PlaylistPrivacy,
}

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub playlist_id: Option<String>,
    /// Where a newly created playlist id is written for later runs.
    pub playlist_id_file: Option<PathBuf>,
    pub new_playlist: NewPlaylist,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_YOUTUBE_BASE_URL.to_string(),
            api_key: None,
            access_token: None,
            playlist_id: None,
            playlist_id_file: None,
            new_playlist: NewPlaylist::default(),
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    access_token: Option<String>,
    /// Set from config, or once by the first publish that creates the playlist.
    playlist_id: OnceCell<String>,
    playlist_id_file: Option<PathBuf>,
    new_playlist: NewPlaylist,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    #[serde(default)]
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    #[serde(default)]
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Default, Deserialize)]
struct RelatedPlaylists {
    #[serde(default)]
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    id: String,
    #[serde(default)]
    snippet: Option<ItemSnippet>,
    #[serde(default)]
    content_details: Option<PlaylistItemDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
    #[serde(default)]
    video_published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    #[serde(default)]
    snippet: Option<ItemSnippet>,
    #[serde(default)]
    content_details: Option<VideoDetails>,
    #[serde(default)]
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Deserialize)]
struct VideoDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistResource {
    id: String,
    #[serde(default)]
    snippet: Option<PlaylistSnippet>,
    #[serde(default)]
    content_details: Option<PlaylistContentDetails>,
    #[serde(default)]
    status: Option<PlaylistStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistContentDetails {
    #[serde(default)]
    item_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistStatus {
    #[serde(default)]
    privacy_status: Option<String>,
}

/// Counts arrive as decimal strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default)]
    view_count: Option<String>,
    #[serde(default)]
    like_count: Option<String>,
    #[serde(default)]
    comment_count: Option<String>,
}

impl YouTubeClient {
    /// # Errors
    /// ベース URL が不正、または HTTP クライアントの構築に失敗した場合はエラーを返す。
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build YouTube HTTP client")?;

        let mut raw_base = config.base_url;
        if !raw_base.ends_with('/') {
            raw_base.push('/');
        }
        let base_url = Url::parse(&raw_base).context("invalid YouTube base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            access_token: config.access_token,
            playlist_id: OnceCell::new_with(config.playlist_id),
            playlist_id_file: config.playlist_id_file,
            new_playlist: config.new_playlist,
        })
    }

    /// The target playlist id, if configured or already created.
    #[must_use]
    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.get().map(String::as_str)
    }

    /// チャンネルの uploads プレイリスト ID を返す。見つからない場合は `None`。
    ///
    /// # Errors
    /// リクエストまたはレスポンスの解析に失敗した場合はエラーを返す。
    pub async fn uploads_playlist_id(&self, channel_id: &str) -> Result<Option<String>> {
        let response: ListResponse<ChannelItem> = self
            .get_json("channels", &[("part", "contentDetails"), ("id", channel_id)])
            .await
            .with_context(|| format!("failed to look up channel {channel_id}"))?;

        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.content_details)
            .and_then(|details| details.related_playlists.uploads))
    }

    /// Lists at most `cap` uploads published at or after `published_after`.
    ///
    /// Paging stops at the cap, at the last page, or after a page that
    /// contained nothing recent (uploads are listed newest first).
    ///
    /// # Errors
    /// Returns an error when a page request fails.
    pub async fn recent_uploads(
        &self,
        playlist_id: &str,
        published_after: DateTime<Utc>,
        cap: usize,
    ) -> Result<Vec<VideoMetadata>> {
        let page_size = cap.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        while videos.len() < cap {
            let mut params = vec![
                ("part", "snippet,contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let page: ListResponse<PlaylistItem> = self
                .get_json("playlistItems", &params)
                .await
                .with_context(|| format!("failed to list playlist {playlist_id}"))?;

            let mut recent_in_page = 0usize;
            for item in page.items {
                let Some(video) = upload_to_video(item) else {
                    continue;
                };
                if video
                    .published_at
                    .is_some_and(|published_at| published_at < published_after)
                {
                    continue;
                }
                recent_in_page += 1;
                videos.push(video);
                if videos.len() >= cap {
                    break;
                }
            }

            debug!(
                playlist_id,
                recent_in_page,
                total = videos.len(),
                "fetched playlist page"
            );

            match page.next_page_token {
                Some(token) if recent_in_page > 0 => page_token = Some(token),
                _ => break,
            }
        }

        Ok(videos)
    }

    /// 動画の詳細（再生時間・統計・タグ）を 50 件ずつ取得して `videos` に反映する。
    ///
    /// 詳細が返らなかった動画は一覧の情報のまま残す。
    ///
    /// # Errors
    /// リクエストが失敗した場合はエラーを返す。
    pub async fn attach_details(&self, videos: &mut [VideoMetadata]) -> Result<()> {
        let ids: Vec<String> = videos.iter().map(|video| video.id.clone()).collect();
        let mut details: HashMap<String, VideoItem> = HashMap::with_capacity(ids.len());

        for batch in ids.chunks(MAX_PAGE_SIZE) {
            let joined = batch.join(",");
            let response: ListResponse<VideoItem> = self
                .get_json(
                    "videos",
                    &[("part", "snippet,contentDetails,statistics"), ("id", joined.as_str())],
                )
                .await
                .context("failed to fetch video details")?;
            details.extend(response.items.into_iter().map(|item| (item.id.clone(), item)));
        }

        for video in videos.iter_mut() {
            match details.remove(&video.id) {
                Some(item) => merge_details(video, item),
                None => warn!(video_id = %video.id, "no details returned for video"),
            }
        }
        Ok(())
    }

    /// Returns the ids of every item currently in `playlist_id`.
    ///
    /// # Errors
    /// Returns an error when no access token is configured or a request fails.
    pub async fn playlist_item_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let page_size = MAX_PAGE_SIZE.to_string();
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "id"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let url = self.endpoint("playlistItems", &params)?;
            let request = self.with_bearer(self.client.get(url))?;
            let page: ListResponse<PlaylistItem> = send_checked(request, "list playlist items")
                .await?
                .json()
                .await
                .context("failed to deserialize playlist items")?;

            ids.extend(page.items.into_iter().map(|item| item.id));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(ids)
    }

    /// 新しいプレイリストを作成し、その ID を返す。
    ///
    /// # Errors
    /// アクセストークンが無い場合、またはリクエストが失敗した場合はエラーを返す。
    pub async fn create_playlist(
        &self,
        title: &str,
        description: &str,
        privacy: PlaylistPrivacy,
    ) -> Result<String> {
        let url = self.endpoint("playlists", &[("part", "snippet,status")])?;
        let body = json!({
            "snippet": {
                "title": title,
                "description": description,
            },
            "status": {
                "privacyStatus": privacy.as_str(),
            }
        });
        let request = self.with_bearer(self.client.post(url).json(&body))?;
        let created: CreatedResource = send_checked(request, "create playlist")
            .await?
            .json()
            .await
            .context("failed to deserialize created playlist")?;
        info!(playlist_id = %created.id, title, privacy = privacy.as_str(), "created playlist");
        Ok(created.id)
    }

    /// プレイリストのタイトル・件数・公開設定を取得する。存在しない場合は `None`。
    ///
    /// # Errors
    /// リクエストまたはレスポンスの解析に失敗した場合はエラーを返す。
    pub async fn playlist_info(&self, playlist_id: &str) -> Result<Option<PlaylistInfo>> {
        let response: ListResponse<PlaylistResource> = self
            .get_json(
                "playlists",
                &[("part", "snippet,contentDetails,status"), ("id", playlist_id)],
            )
            .await
            .with_context(|| format!("failed to look up playlist {playlist_id}"))?;

        Ok(response.items.into_iter().next().map(|playlist| {
            let snippet = playlist.snippet.unwrap_or_default();
            PlaylistInfo {
                url: PlaylistInfo::url_for(&playlist.id),
                id: playlist.id,
                title: snippet.title,
                description: snippet.description,
                privacy_status: playlist.status.and_then(|status| status.privacy_status),
                item_count: playlist
                    .content_details
                    .map_or(0, |details| details.item_count),
                published_at: snippet.published_at.as_deref().and_then(parse_timestamp),
            }
        }))
    }

    /// Returns the target playlist id and whether this call created it.
    async fn target_playlist(&self) -> Result<(String, bool)> {
        if let Some(existing) = self.playlist_id.get() {
            return Ok((existing.clone(), false));
        }
        let created = self
            .playlist_id
            .get_or_try_init(|| self.create_configured_playlist())
            .await?;
        Ok((created.clone(), true))
    }

    async fn create_configured_playlist(&self) -> Result<String> {
        let now = Utc::now();
        let title = non_blank(self.new_playlist.title.as_deref())
            .map_or_else(|| format!("News Feed {}", now.format("%Y-%m-%d")), ToString::to_string);
        let description = non_blank(self.new_playlist.description.as_deref()).map_or_else(
            || {
                format!(
                    "Auto-generated news playlist created on {}",
                    now.format("%Y-%m-%d %H:%M:%S")
                )
            },
            ToString::to_string,
        );

        let playlist_id = self
            .create_playlist(&title, &description, self.new_playlist.privacy)
            .await?;
        if let Some(path) = &self.playlist_id_file {
            if let Err(error) = write_playlist_id(path, &playlist_id).await {
                warn!(error = %format!("{error:#}"), playlist_id = %playlist_id, "could not save playlist id");
            }
        }
        Ok(playlist_id)
    }

    async fn delete_playlist_item(&self, item_id: &str) -> Result<()> {
        let url = self.endpoint("playlistItems", &[("id", item_id)])?;
        let request = self.with_bearer(self.client.delete(url))?;
        send_checked(request, "delete playlist item").await?;
        Ok(())
    }

    async fn insert_playlist_item(
        &self,
        playlist_id: &str,
        video_id: &str,
        position: usize,
    ) -> Result<()> {
        let url = self.endpoint("playlistItems", &[("part", "snippet")])?;
        let body = json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video_id,
                },
                "position": position,
            }
        });
        let request = self.with_bearer(self.client.post(url).json(&body))?;
        send_checked(request, "insert playlist item")
            .await
            .with_context(|| format!("failed to insert video {video_id} at {position}"))?;
        Ok(())
    }

    fn endpoint(&self, resource: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(resource)
            .with_context(|| format!("failed to build {resource} URL"))?;
        {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in params {
                query_pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// 読み取り系リクエスト。API キーがあればクエリに付与し、無ければ Bearer トークンを使う。
    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let mut url = self.endpoint(resource, params)?;
        let request = if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
            self.client.get(url)
        } else {
            self.with_bearer(self.client.get(url))?
        };

        send_checked(request, resource)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("failed to deserialize {resource} response"))
    }

    fn with_bearer(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| anyhow!("YouTube access token is not configured"))?;
        Ok(request.bearer_auth(token))
    }
}

async fn send_checked(request: RequestBuilder, operation: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .with_context(|| format!("YouTube {operation} request failed"))?;
    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        bail!("YouTube {operation} returned error status {status}: {error_body}");
    }
    Ok(response)
}

fn upload_to_video(item: PlaylistItem) -> Option<VideoMetadata> {
    let details = item.content_details?;
    let snippet = item.snippet.unwrap_or_default();
    let published_at = details
        .video_published_at
        .as_deref()
        .or(snippet.published_at.as_deref())
        .and_then(parse_timestamp);

    Some(VideoMetadata {
        id: details.video_id,
        channel_id: snippet.channel_id,
        channel_title: snippet.channel_title,
        title: snippet.title,
        description: snippet.description,
        published_at,
        ..VideoMetadata::default()
    })
}

fn merge_details(video: &mut VideoMetadata, item: VideoItem) {
    if let Some(snippet) = item.snippet {
        if !snippet.description.is_empty() {
            video.description = snippet.description;
        }
        video.tags = snippet.tags;
        if video.published_at.is_none() {
            video.published_at = snippet.published_at.as_deref().and_then(parse_timestamp);
        }
    }
    if let Some(details) = item.content_details {
        video.duration_seconds = parse_iso8601_duration(&details.duration);
    }
    let statistics = item.statistics.unwrap_or_default();
    video.view_count = parse_count(statistics.view_count.as_deref());
    video.like_count = parse_count(statistics.like_count.as_deref());
    video.comment_count = parse_count(statistics.comment_count.as_deref());
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

async fn write_playlist_id(path: &Path, playlist_id: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    tokio::fs::write(path, format!("{playlist_id}\n"))
        .await
        .with_context(|| format!("failed to write playlist id to {}", path.display()))?;
    info!(path = %path.display(), playlist_id, "saved playlist id");
    Ok(())
}

fn parse_count(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0)
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn fetch_candidates(&self, request: &FetchRequest) -> Result<Vec<VideoMetadata>> {
        let mut videos = Vec::new();

        for channel_id in &request.channel_ids {
            let Some(uploads) = self.uploads_playlist_id(channel_id).await? else {
                warn!(channel_id = %channel_id, "skipping channel without uploads playlist");
                continue;
            };
            let recent = self
                .recent_uploads(&uploads, request.published_after, request.per_channel_cap)
                .await?;
            info!(
                channel_id = %channel_id,
                videos = recent.len(),
                "fetched recent uploads"
            );
            videos.extend(recent);
        }

        if !videos.is_empty() {
            self.attach_details(&mut videos).await?;
        }
        Ok(videos)
    }
}

#[async_trait]
impl PlaylistPublisher for YouTubeClient {
    async fn publish(&self, video_ids: &[String]) -> Result<PublishReport> {
        let (playlist_id, created) = self.target_playlist().await?;
        let playlist_id = playlist_id.as_str();

        let existing = if created {
            Vec::new()
        } else {
            self.playlist_item_ids(playlist_id).await?
        };
        for item_id in &existing {
            self.delete_playlist_item(item_id).await?;
        }
        info!(playlist_id, removed = existing.len(), "cleared playlist");

        for (position, video_id) in video_ids.iter().enumerate() {
            self.insert_playlist_item(playlist_id, video_id, position)
                .await?;
            debug!(playlist_id, position, video_id = %video_id, "inserted playlist item");
        }
        info!(playlist_id, inserted = video_ids.len(), "published playlist");

        let playlist = match self.playlist_info(playlist_id).await {
            Ok(Some(info)) => {
                info!(
                    playlist_id,
                    title = %info.title,
                    item_count = info.item_count,
                    url = %info.url,
                    "playlist status"
                );
                Some(info)
            }
            Ok(None) => {
                warn!(playlist_id, "published playlist not found when reading status");
                None
            }
            Err(error) => {
                warn!(playlist_id, error = %format!("{error:#}"), "failed to read playlist status");
                None
            }
        };

        Ok(PublishReport {
            playlist_id: Some(playlist_id.to_string()),
            created,
            removed: existing.len(),
            inserted: video_ids.len(),
            dry_run: false,
            playlist,
        })
    }
}
