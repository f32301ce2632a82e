//! `media-catalog publish`: add an entry to a running catalog.
//!
//! With `--link` the URL is published as-is. With `--file` the file is first
//! uploaded through the server's gateway and the resulting location becomes
//! the record's `mediaUrl`. Ctrl-C cancels and aborts the upload; any other
//! failure leaves a resume token in `--resume-file` for the next attempt.

use crate::{
    config::PublishArgs,
    models::media::{MediaRecord, NewMediaRecord},
    uploader::{
        FileSource, GatewayClient, HttpTransport, MIB, ResumeToken, UploadConfig, UploadManager,
        UploadSource, UploadStatus,
    },
};
use anyhow::{Context, Result, bail};
use std::{path::Path, sync::Arc};
use tokio::fs;
use tracing::{info, warn};

/// Creates catalog records over HTTP.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CatalogClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn create(&self, record: &NewMediaRecord) -> Result<MediaRecord> {
        let resp = self
            .http
            .post(format!("{}/media", self.base_url))
            .bearer_auth(&self.token)
            .json(record)
            .send()
            .await
            .context("sending catalog insert")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("catalog insert failed ({}): {}", status, body);
        }
        resp.json::<MediaRecord>()
            .await
            .context("decoding catalog record")
    }
}

pub async fn run(args: PublishArgs) -> Result<MediaRecord> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("media-catalog/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let server = args.server.trim_end_matches('/').to_string();

    let media_url = match (&args.link, &args.file) {
        (Some(link), _) => link.trim().to_string(),
        (None, Some(path)) => upload_file(&http, &server, &args, path).await?,
        (None, None) => bail!("either --link or --file is required"),
    };

    let catalog = CatalogClient::new(http, &server, &args.token);
    let record = catalog
        .create(&NewMediaRecord {
            title: args.title.clone(),
            description: args.description.clone(),
            cover_url: args.cover_url.clone(),
            media_url,
            category: args.category.clone(),
        })
        .await?;

    info!(id = %record.id, title = %record.title, "published");
    Ok(record)
}

async fn upload_file(
    http: &reqwest::Client,
    server: &str,
    args: &PublishArgs,
    path: &Path,
) -> Result<String> {
    let source = FileSource::open(path, args.content_type.clone())
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    info!(
        file = %source.file_name(),
        content_type = %source.content_type(),
        bytes = source.size(),
        "uploading"
    );

    let gateway = GatewayClient::new(http.clone(), format!("{}/s3-multipart", server), &args.token);
    let manager = UploadManager::new(
        Arc::new(gateway),
        Arc::new(HttpTransport::new(http.clone())),
        UploadConfig {
            part_size: args.part_size_mib * MIB,
            concurrency: args.concurrency.max(1),
            ..UploadConfig::default()
        },
    );

    if let Some(resume_file) = args.resume_file.as_deref() {
        if let Some(token) = read_resume_token(resume_file).await? {
            manager.restore(token);
        }
    }

    let mut progress = manager.watch();
    let reporter = tokio::spawn(async move {
        let mut last_decile = None;
        while progress.changed().await.is_ok() {
            let snap = progress.borrow_and_update().clone();
            let decile = (snap.progress_percent() / 10.0) as u32;
            if snap.status == UploadStatus::Uploading && last_decile != Some(decile) {
                last_decile = Some(decile);
                info!(
                    percent = %format_args!("{:.1}", snap.progress_percent()),
                    parts_completed = snap.parts_completed,
                    parts_total = snap.parts_total,
                    "upload progress"
                );
            }
        }
    });

    let upload = manager.upload(Arc::new(source));
    tokio::pin!(upload);
    let result = tokio::select! {
        res = &mut upload => res,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, cancelling upload");
            manager.cancel().await?;
            upload.await
        }
    };
    reporter.abort();

    match result {
        Ok(outcome) => {
            if let Some(resume_file) = args.resume_file.as_deref() {
                remove_resume_token(resume_file).await?;
            }
            info!(
                location = %outcome.location,
                parts = outcome.parts,
                resumed = outcome.resumed_parts,
                "upload complete"
            );
            Ok(outcome.location)
        }
        Err(err) => {
            match (args.resume_file.as_deref(), manager.resume_token()) {
                (Some(resume_file), Some(token)) => {
                    fs::write(resume_file, token.encode()?)
                        .await
                        .with_context(|| format!("writing {}", resume_file.display()))?;
                    warn!(file = %resume_file.display(), "resume token saved");
                }
                (Some(resume_file), None) => remove_resume_token(resume_file).await?,
                (None, _) => {}
            }
            Err(err).context("upload failed")
        }
    }
}

async fn read_resume_token(path: &Path) -> Result<Option<ResumeToken>> {
    match fs::read_to_string(path).await {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => match ResumeToken::decode(&text) {
            Ok(token) => Ok(Some(token)),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "ignoring unreadable resume token");
                Ok(None)
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

async fn remove_resume_token(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resume_token_files_tolerate_missing_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume");

        assert!(read_resume_token(&path).await.unwrap().is_none());

        fs::write(&path, "not a token").await.unwrap();
        assert!(read_resume_token(&path).await.unwrap().is_none());

        remove_resume_token(&path).await.unwrap();
        remove_resume_token(&path).await.unwrap();
        assert!(!path.exists());
    }
}
