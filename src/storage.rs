use async_trait::async_trait;
use log::{error, info, warn};
use rand::Rng;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::config::{AppConfig, MediaBackend};
use crate::forms::ImageUpload;

/// Directory (key prefix) post images are uploaded to.
pub const UPLOAD_DIR: &str = "posts";
/// URL prefix media paths are served under.
pub const MEDIA_URL: &str = "/media/";

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Opaque blob storage addressed by relative path (`posts/cat.gif`).
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Fails with `Duplicate` when `path` is already taken.
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), MediaStoreError>;
    async fn load(&self, path: &str) -> Result<(Vec<u8>, String), MediaStoreError>;
    async fn delete(&self, path: &str) -> Result<(), MediaStoreError>;
}

pub fn media_url(path: &str) -> String {
    format!("{MEDIA_URL}{path}")
}

pub fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

/// Relative, traversal-free media path or `None`.
fn checked_path(path: &str) -> Option<&Path> {
    let p = Path::new(path);
    let ok = !path.is_empty() && p.components().all(|c| matches!(c, Component::Normal(_)));
    ok.then_some(p)
}

/// Base file name reduced to `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() { "upload".into() } else { cleaned }
}

fn with_suffix(file_name: &str, suffix: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{file_name}_{suffix}"),
    }
}

fn random_suffix() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..7).map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char).collect()
}

/// Stores an uploaded image under `posts/<name>`, picking a free name when the
/// plain one is taken. Returns the stored path.
pub async fn store_upload(store: &dyn MediaStore, image: &ImageUpload) -> Result<String, MediaStoreError> {
    let name = sanitize_filename(&image.filename);
    let mut path = format!("{UPLOAD_DIR}/{name}");
    for _ in 0..8 {
        match store.save(&path, &image.bytes).await {
            Ok(()) => return Ok(path),
            Err(MediaStoreError::Duplicate) => {
                path = format!("{UPLOAD_DIR}/{}", with_suffix(&name, &random_suffix()));
            }
            Err(e) => return Err(e),
        }
    }
    Err(MediaStoreError::Other(format!("no free name for '{name}'")))
}

// ---------------- Filesystem implementation ----------------
#[derive(Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, MediaStoreError> {
        checked_path(path).map(|p| self.root.join(p)).ok_or(MediaStoreError::NotFound)
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        let full = checked_path(path)
            .map(|p| self.root.join(p))
            .ok_or_else(|| MediaStoreError::Other(format!("invalid media path '{path}'")))?;
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| MediaStoreError::Other(e.to_string()))?;
        }
        // create_new makes the existence check and the write one step
        let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&full).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(MediaStoreError::Duplicate),
            Err(e) => return Err(MediaStoreError::Other(e.to_string())),
        };
        file.write_all(bytes).await.map_err(|e| MediaStoreError::Other(e.to_string()))?;
        file.flush().await.map_err(|e| MediaStoreError::Other(e.to_string()))
    }

    async fn load(&self, path: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => {
                let mime = sniff_mime(&bytes);
                Ok((bytes, mime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaStoreError::NotFound),
            Err(e) => Err(MediaStoreError::Other(e.to_string())),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), MediaStoreError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MediaStoreError::Other(e.to_string())),
        }
    }
}

// ---------------- S3 implementation (MinIO compatible) ----------------
pub struct S3MediaStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
}

impl S3MediaStore {
    pub async fn new(cfg: &crate::config::S3Config) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("S3_ENDPOINT must be set for MEDIA_BACKEND=s3"))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()))
            .endpoint_url(endpoint);
        if let (Some(access), Some(secret)) = (&cfg.access_key, &cfg.secret_key) {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // path-style addressing: MinIO/local endpoints have no wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf).force_path_style(true).build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized S3 media client for bucket '{}'", cfg.bucket);

        if let Err(e) = client.head_bucket().bucket(&cfg.bucket).send().await {
            warn!("head_bucket failed for '{}' (creating): {e:?}", cfg.bucket);
            client
                .create_bucket()
                .bucket(&cfg.bucket)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("failed to ensure bucket '{}': {e}", cfg.bucket))?;
        }

        Ok(Self { bucket: cfg.bucket.clone(), client, prefix: "media".into() })
    }

    fn key_for(&self, path: &str) -> String {
        format!("{}/{}", self.prefix, path)
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        if checked_path(path).is_none() {
            return Err(MediaStoreError::Other(format!("invalid media path '{path}'")));
        }
        let key = self.key_for(path);
        if self.client.head_object().bucket(&self.bucket).key(&key).send().await.is_ok() {
            return Err(MediaStoreError::Duplicate);
        }
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(sniff_mime(bytes))
            .send()
            .await
            .map_err(|e| {
                error!("put_object failed key={key} bucket={} err={e:?}", self.bucket);
                MediaStoreError::Other(e.to_string())
            })?;
        Ok(())
    }

    async fn load(&self, path: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        if checked_path(path).is_none() {
            return Err(MediaStoreError::NotFound);
        }
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key_for(path))
            .send()
            .await
            .map_err(|_| MediaStoreError::NotFound)?;
        let data = obj.body.collect().await.map_err(|e| MediaStoreError::Other(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }

    async fn delete(&self, path: &str) -> Result<(), MediaStoreError> {
        // not-found is success
        let _ = self.client.delete_object().bucket(&self.bucket).key(self.key_for(path)).send().await;
        Ok(())
    }
}

pub async fn build_media_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn MediaStore>> {
    Ok(match cfg.media_backend {
        MediaBackend::Fs => {
            info!("serving media from '{}'", cfg.media_root.display());
            Arc::new(FsMediaStore::new(cfg.media_root.clone()))
        }
        MediaBackend::S3 => Arc::new(S3MediaStore::new(&cfg.s3).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_reduced_to_safe_base_names() {
        assert_eq!(sanitize_filename("small.gif"), "small.gif");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\pics\\my cat.png"), "my_cat.png");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn traversal_paths_are_refused() {
        assert!(checked_path("posts/a.gif").is_some());
        assert!(checked_path("../secret").is_none());
        assert!(checked_path("/etc/passwd").is_none());
        assert!(checked_path("posts/../../x").is_none());
        assert!(checked_path("").is_none());
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(with_suffix("cat.gif", "Ab3dE9x"), "cat_Ab3dE9x.gif");
        assert_eq!(with_suffix("README", "Ab3dE9x"), "README_Ab3dE9x");
    }

    #[actix_web::test]
    async fn fs_store_keeps_existing_files_and_renames_new_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsMediaStore::new(dir.path());
        let gif = ImageUpload { filename: "small.gif".into(), bytes: b"GIF89a-one".to_vec(), mime: "image/gif".into() };
        let first = store_upload(&store, &gif).await.unwrap();
        assert_eq!(first, "posts/small.gif");

        let again = ImageUpload { bytes: b"GIF89a-two".to_vec(), ..gif };
        let second = store_upload(&store, &again).await.unwrap();
        assert_ne!(second, first);
        assert!(second.starts_with("posts/small_") && second.ends_with(".gif"));

        assert_eq!(store.load(&first).await.unwrap().0, b"GIF89a-one");
        assert_eq!(store.load(&second).await.unwrap().0, b"GIF89a-two");
        assert!(matches!(store.load("../outside").await, Err(MediaStoreError::NotFound)));

        store.delete(&first).await.unwrap();
        assert!(matches!(store.load(&first).await, Err(MediaStoreError::NotFound)));
    }
}
