// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media download with backpressure: size ceiling, rate-limited reads, and
//! bounded retries.
//!
//! Reads start at the configured cap and drop to the throttled rate once
//! the 1 MiB threshold is crossed, bounding memory and bandwidth pressure
//! from large attachments. Stream acquisition is retried with linearly
//! increasing backoff before failing permanently.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::time::{sleep, Instant};
use tracing::warn;

use atendo_config::model::MediaConfig;
use atendo_core::types::{MediaKind, MediaRef};
use atendo_core::{AtendoError, Transport};

/// Downloaded media bytes plus naming metadata.
pub struct DownloadedMedia {
    pub data: Vec<u8>,
    pub mimetype: String,
    pub filename: String,
}

/// Media class tag for a mimetype: audio, video, image, or document
/// (the default for unrecognized types).
pub fn media_kind(mimetype: &str) -> MediaKind {
    match mimetype.split('/').next().unwrap_or_default() {
        "audio" => MediaKind::Audio,
        "video" => MediaKind::Video,
        "image" => MediaKind::Image,
        _ => MediaKind::Document,
    }
}

/// Thumbnail class tag for a mimetype, defaulting to document.
pub fn thumbnail_kind(mimetype: &str) -> MediaKind {
    match mimetype.split('/').next().unwrap_or_default() {
        "video" => MediaKind::ThumbnailVideo,
        "image" => MediaKind::ThumbnailImage,
        _ => MediaKind::ThumbnailDocument,
    }
}

/// The plain media-type column value for a mimetype ("image", "audio", ...).
pub fn media_type_tag(mimetype: &str) -> String {
    mimetype
        .split('/')
        .next()
        .unwrap_or("document")
        .to_string()
}

/// The read rate allowed after `total` downloaded bytes.
fn rate_for(total: u64, config: &MediaConfig) -> u64 {
    if total > config.throttle_threshold_bytes {
        config.throttle_rate_bps
    } else {
        config.max_rate_bps
    }
}

/// Read a media stream fully, pacing reads to the configured rates.
async fn read_throttled(
    mut stream: atendo_core::traits::transport::MediaStream,
    config: &MediaConfig,
) -> Result<Vec<u8>, AtendoError> {
    let started = Instant::now();
    let mut buffer = Vec::new();
    let mut total: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        buffer.extend_from_slice(&chunk);

        let rate = rate_for(total, config);
        let expected = Duration::from_secs_f64(total as f64 / rate as f64);
        let elapsed = started.elapsed();
        if expected > elapsed {
            sleep(expected - elapsed).await;
        }
    }

    Ok(buffer)
}

/// Download a media payload through the transport.
///
/// Stream acquisition is retried up to the configured attempt budget with
/// linearly increasing backoff (attempt x 2s); a download that never yields
/// a stream fails permanently with a retryable domain error.
pub async fn download_media(
    transport: &dyn Transport,
    media: &MediaRef,
    kind: MediaKind,
    config: &MediaConfig,
) -> Result<DownloadedMedia, AtendoError> {
    let mut attempt: u32 = 0;
    let stream = loop {
        match transport.download_media(media, kind).await {
            Ok(stream) => break stream,
            Err(e) => {
                attempt += 1;
                if attempt >= config.download_attempts {
                    return Err(AtendoError::MediaDownload { attempts: attempt });
                }
                warn!(attempt, error = %e, "media download attempt failed");
                sleep(Duration::from_secs(2 * u64::from(attempt))).await;
            }
        }
    };

    let data = read_throttled(stream, config).await?;
    let filename = media
        .file_name
        .clone()
        .unwrap_or_else(|| generated_filename(&media.mimetype));

    Ok(DownloadedMedia {
        data,
        mimetype: media.mimetype.clone(),
        filename,
    })
}

/// Best-effort thumbnail download; requires both a direct path and a key.
pub async fn download_thumbnail(
    transport: &dyn Transport,
    media: &MediaRef,
    config: &MediaConfig,
) -> Option<DownloadedMedia> {
    if media.thumbnail_direct_path.is_none() || media.media_key.is_none() {
        return None;
    }

    let kind = thumbnail_kind(&media.mimetype);
    match download_media(transport, media, kind, config).await {
        Ok(mut downloaded) => {
            downloaded.mimetype = "image/jpeg".to_string();
            downloaded.filename = format!("thumbnail-{}", generated_filename("image/jpeg"));
            Some(downloaded)
        }
        Err(e) => {
            // Thumbnails must never abort the primary message save.
            warn!(error = %e, "thumbnail download failed");
            None
        }
    }
}

/// `{random5}-{timestamp}.{ext}` for media without an upstream filename.
fn generated_filename(mimetype: &str) -> String {
    let ext = mimetype
        .split('/')
        .nth(1)
        .unwrap_or("bin")
        .split(';')
        .next()
        .unwrap_or("bin");
    let tag: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{tag}-{timestamp}.{ext}")
}

/// Write downloaded media under `{media_dir}/{tenant_id}/` and return the
/// stored relative path.
pub async fn save_media(
    media_dir: &str,
    tenant_id: i64,
    media: &DownloadedMedia,
) -> Result<String, AtendoError> {
    let dir = Path::new(media_dir).join(tenant_id.to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AtendoError::Internal(format!("cannot create media dir: {e}")))?;

    let path = dir.join(&media.filename);
    tokio::fs::write(&path, &media.data)
        .await
        .map_err(|e| AtendoError::Internal(format!("cannot write media file: {e}")))?;

    Ok(format!("{tenant_id}/{}", media.filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atendo_test_utils::MockTransport;

    #[test]
    fn kinds_default_to_document() {
        assert_eq!(media_kind("audio/ogg"), MediaKind::Audio);
        assert_eq!(media_kind("video/mp4"), MediaKind::Video);
        assert_eq!(media_kind("image/jpeg"), MediaKind::Image);
        assert_eq!(media_kind("application/pdf"), MediaKind::Document);
        assert_eq!(media_kind("weird"), MediaKind::Document);

        assert_eq!(thumbnail_kind("video/mp4"), MediaKind::ThumbnailVideo);
        assert_eq!(thumbnail_kind("image/png"), MediaKind::ThumbnailImage);
        assert_eq!(thumbnail_kind("application/pdf"), MediaKind::ThumbnailDocument);
    }

    #[test]
    fn rate_drops_after_threshold() {
        let config = MediaConfig::default();
        assert_eq!(rate_for(1024, &config), config.max_rate_bps);
        assert_eq!(
            rate_for(config.throttle_threshold_bytes + 1, &config),
            config.throttle_rate_bps
        );
    }

    fn media_ref() -> MediaRef {
        MediaRef {
            mimetype: "image/jpeg".into(),
            url: Some("https://example.invalid/media".into()),
            ..Default::default()
        }
    }

    fn fast_config() -> MediaConfig {
        MediaConfig {
            // high rates keep the throttle sleeps negligible in tests
            max_rate_bps: u64::MAX / 4,
            throttle_rate_bps: u64::MAX / 4,
            download_attempts: 3,
            ..MediaConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn download_concatenates_chunks() {
        let transport = MockTransport::new();
        transport.set_media_chunks(vec![vec![1, 2], vec![3, 4, 5]]);

        let media = download_media(&transport, &media_ref(), MediaKind::Image, &fast_config())
            .await
            .unwrap();
        assert_eq!(media.data, vec![1, 2, 3, 4, 5]);
        assert_eq!(media.mimetype, "image/jpeg");
        assert!(media.filename.ends_with(".jpeg"));
    }

    #[tokio::test(start_paused = true)]
    async fn download_retries_with_backoff_then_succeeds() {
        let transport = MockTransport::new();
        transport.set_media_chunks(vec![vec![9]]);
        transport.fail_downloads(4);

        let media = download_media(&transport, &media_ref(), MediaKind::Image, &fast_config())
            .await;
        // 3-attempt budget exhausted by 4 failures
        assert!(matches!(media, Err(AtendoError::MediaDownload { attempts: 3 })));

        let transport = MockTransport::new();
        transport.set_media_chunks(vec![vec![9]]);
        transport.fail_downloads(2);
        let media = download_media(&transport, &media_ref(), MediaKind::Image, &fast_config())
            .await
            .unwrap();
        assert_eq!(media.data, vec![9]);
        assert_eq!(transport.download_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn thumbnail_needs_path_and_key() {
        let transport = MockTransport::new();
        transport.set_media_chunks(vec![vec![7]]);

        // no thumbnail metadata: skipped entirely
        assert!(download_thumbnail(&transport, &media_ref(), &fast_config())
            .await
            .is_none());

        let media = MediaRef {
            thumbnail_direct_path: Some("/t/abc".into()),
            media_key: Some(vec![1]),
            ..media_ref()
        };
        let thumb = download_thumbnail(&transport, &media, &fast_config())
            .await
            .expect("thumbnail");
        assert_eq!(thumb.mimetype, "image/jpeg");
        assert!(thumb.filename.starts_with("thumbnail-"));
    }

    #[tokio::test(start_paused = true)]
    async fn thumbnail_failure_is_swallowed() {
        let transport = MockTransport::new();
        transport.fail_downloads(u32::MAX);
        let media = MediaRef {
            thumbnail_direct_path: Some("/t/abc".into()),
            media_key: Some(vec![1]),
            ..media_ref()
        };
        assert!(download_thumbnail(&transport, &media, &fast_config())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn save_media_writes_under_tenant_dir() {
        let dir = tempfile::tempdir().unwrap();
        let media = DownloadedMedia {
            data: vec![1, 2, 3],
            mimetype: "image/jpeg".into(),
            filename: "pic.jpeg".into(),
        };
        let rel = save_media(dir.path().to_str().unwrap(), 1, &media)
            .await
            .unwrap();
        assert_eq!(rel, "1/pic.jpeg");
        let stored = std::fs::read(dir.path().join("1/pic.jpeg")).unwrap();
        assert_eq!(stored, vec![1, 2, 3]);
    }
}
