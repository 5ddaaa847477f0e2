//! Where datasets come from and where results go.
//!
//! Loading supports `http(s)://` URLs, `s3://bucket/key` URIs and local
//! paths. Uploads go through any [`ObjectStore`]; [`ObjectStoreSink::s3`]
//! builds an authenticated S3 store with credentials from the environment.

use crate::error::{AugmentError, Result};
use crate::types::Dataset;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;

/// Source of the input table.
pub trait DatasetLoader: Send + Sync {
    fn load(&self, locator: &str) -> impl Future<Output = Result<Dataset>> + Send;
}

/// Durable destination for the rendered output.
pub trait ResultSink: Send + Sync {
    /// Persist `body` under `key` and return a URL for it.
    fn upload(&self, key: &str, body: Vec<u8>) -> impl Future<Output = Result<String>> + Send;
}

/// Parse an S3 URI into bucket and key components.
///
/// Accepts URIs in the format `s3://bucket/key/path`.
pub fn parse_s3_uri(uri: &str) -> Result<(&str, &str)> {
    let without_scheme = uri.strip_prefix("s3://").ok_or_else(|| {
        AugmentError::Load(format!("Invalid S3 URI: expected 's3://' prefix in '{}'", uri))
    })?;

    match without_scheme.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(AugmentError::Load(format!(
            "Invalid S3 URI: expected 's3://bucket/key' format in '{}'",
            uri
        ))),
    }
}

/// Parse CSV bytes whose first record is the header.
///
/// Records may be shorter or longer than the header; a row missing the
/// prompt column fails on its own when it is processed.
pub fn parse_csv(bytes: &[u8]) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns = reader.headers()?.iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|record| -> Result<Vec<String>> {
            Ok(record?.iter().map(String::from).collect())
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Dataset::new(columns, rows))
}

/// Loads CSV datasets over HTTP, from S3, or from disk.
#[derive(Debug, Clone, Default)]
pub struct CsvLoader {
    http: Client,
}

impl CsvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            let resp = self.http.get(locator).send().await?.error_for_status()?;
            Ok(resp.bytes().await?.to_vec())
        } else if locator.starts_with("s3://") {
            let (bucket, key) = parse_s3_uri(locator)?;
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()?;
            let object = store.get(&Path::from(key)).await?;
            Ok(object.bytes().await?.to_vec())
        } else {
            Ok(tokio::fs::read(locator).await?)
        }
    }
}

impl DatasetLoader for CsvLoader {
    async fn load(&self, locator: &str) -> Result<Dataset> {
        tracing::info!("Starting CSV processing from: {}", locator);
        let bytes = self.fetch(locator).await?;
        parse_csv(&bytes)
    }
}

/// Uploads results to an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    url_prefix: String,
}

impl ObjectStoreSink {
    /// `url_prefix` is joined with the key to form the returned location.
    pub fn new(store: Arc<dyn ObjectStore>, url_prefix: impl Into<String>) -> Self {
        Self {
            store,
            url_prefix: url_prefix.into(),
        }
    }

    /// Authenticated S3 sink for `bucket`.
    ///
    /// Credentials and region are loaded from the environment
    /// (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`, ...).
    pub fn s3(bucket: &str) -> Result<Self> {
        tracing::info!("Creating authenticated S3 client for bucket: {}", bucket);
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        Ok(Self::new(
            Arc::new(store),
            format!("https://{}.s3.amazonaws.com", bucket),
        ))
    }

    /// S3 sink for the bucket named by `AWS_S3_BUCKET`.
    pub fn from_env() -> Result<Self> {
        let bucket = std::env::var("AWS_S3_BUCKET").map_err(|_| {
            AugmentError::InvalidConfig("AWS_S3_BUCKET is not set".to_string())
        })?;
        Self::s3(&bucket)
    }

    fn location(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix.trim_end_matches('/'), key)
    }
}

impl ResultSink for ObjectStoreSink {
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<String> {
        tracing::info!("Uploading {} bytes under key: {}", body.len(), key);
        self.store
            .put(&Path::from(key), PutPayload::from(body))
            .await?;
        Ok(self.location(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_parse_s3_uri() {
        let (bucket, key) = assert_ok!(parse_s3_uri("s3://my-bucket/path/to/file.csv"));
        assert_eq!(bucket, "my-bucket");
        assert_eq!(key, "path/to/file.csv");
    }

    #[test]
    fn test_parse_s3_uri_invalid() {
        assert_err!(parse_s3_uri("bucket/key"));
        assert_err!(parse_s3_uri("http://bucket/key"));
        assert_err!(parse_s3_uri("s3://bucket"));
        assert_err!(parse_s3_uri("s3:///key"));
    }

    #[test]
    fn test_parse_csv() {
        let data = b"id,name,text\n1,a,\"hello, world\"\n2,b,bye\n";
        let ds = parse_csv(data).unwrap();
        assert_eq!(ds.columns(), &["id", "name", "text"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.row(0).unwrap()[2], "hello, world");
    }

    #[test]
    fn test_parse_csv_header_only() {
        let ds = parse_csv(b"a,b\n").unwrap();
        assert_eq!(ds.columns().len(), 2);
        assert!(ds.is_empty());
    }

    #[test]
    fn test_parse_csv_keeps_ragged_rows() {
        let ds = assert_ok!(parse_csv(b"id,text\n0,hello\n1\n2,bye\n"));
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.row(1).unwrap(), &["1".to_string()]);
        assert_eq!(ds.row(2).unwrap()[1], "bye");
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "id,text\n0,zero\n1,one\n").unwrap();

        let ds = CsvLoader::new()
            .load(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.row(1).unwrap()[1], "one");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = CsvLoader::new().load("/definitely/not/here.csv").await;
        assert!(matches!(result, Err(AugmentError::Io(_))));
    }

    #[tokio::test]
    async fn test_sink_upload_roundtrip() {
        let store = Arc::new(InMemory::new());
        let sink = ObjectStoreSink::new(store.clone(), "memory://results/");

        let url = sink
            .upload("out_final.csv", b"a,b\n1,2\n".to_vec())
            .await
            .unwrap();
        assert_eq!(url, "memory://results/out_final.csv");

        let stored = store
            .get(&Path::from("out_final.csv"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&stored[..], b"a,b\n1,2\n");
    }
}
