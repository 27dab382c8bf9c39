use std::sync::OnceLock;

use anyhow::{Error, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LogLevel};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Tracing サブスクライバを一度だけ初期化する。
///
/// `RUST_LOG` が設定されていればそれを優先し、無ければ `level` を使う。
/// 2回目以降の呼び出しは何もしない。
///
/// # Errors
/// 別のグローバルサブスクライバが既に登録されている場合はエラーを返す。
pub fn init(level: LogLevel, format: LogFormat) -> Result<()> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let (json_layer, text_layer) = match format {
        LogFormat::Json => (Some(fmt::layer().with_target(false).json()), None),
        LogFormat::Text => (None, Some(fmt::layer().with_target(false).compact())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;

    let _ = TRACING_INIT.set(());
    info!(
        level = level.as_directive(),
        format = ?format,
        "tracing initialized"
    );
    Ok(())
}
