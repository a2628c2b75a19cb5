use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::config::UploadConfig;
use crate::errors::{BenchError, BenchResult};
use crate::services::traits::ImageUploader;

/// Multipart upload to the OSS gateway.
pub struct OssUploader {
    api_url: String,
    client: reqwest::Client,
}

impl OssUploader {
    pub fn new(config: &UploadConfig, client: reqwest::Client) -> Self {
        Self {
            api_url: config.api_url.clone(),
            client,
        }
    }
}

#[async_trait]
impl ImageUploader for OssUploader {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> BenchResult<String> {
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            let err_body = response.text().await.unwrap_or_default();
            return Err(BenchError::Upload(format!("{}: {}", status, err_body)));
        }

        let json: serde_json::Value = response.json().await?;
        let url = read_url(&json)?;
        tracing::info!(file = %file_name, size, url = %url, "upload complete");
        Ok(url)
    }
}

/// Interpret the gateway reply: success is `success: true` or a `code` of
/// 0 or 200, and the public URL lives at `data.readUrl`.
pub fn read_url(json: &serde_json::Value) -> BenchResult<String> {
    let ok = json["success"].as_bool() == Some(true)
        || matches!(json["code"].as_i64(), Some(0) | Some(200));
    if !ok {
        let message = json["message"].as_str().unwrap_or("unknown error");
        return Err(BenchError::Upload(format!("rejected: {message}")));
    }
    json["data"]["readUrl"]
        .as_str()
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BenchError::Upload("reply has no data.readUrl".into()))
}

/// Upload a local file under its own name.
pub async fn upload_path(uploader: &dyn ImageUploader, path: &Path) -> BenchResult<String> {
    if !path.is_file() {
        return Err(BenchError::Upload(format!("file {} does not exist", path.display())));
    }
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".into());
    uploader.upload(&name, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[test]
    fn accepts_success_flag_or_code() {
        let by_flag = json!({"success": true, "data": {"readUrl": "https://oss/a.png"}});
        let by_code = json!({"code": 200, "data": {"readUrl": "https://oss/b.png"}});
        let by_zero = json!({"code": 0, "data": {"readUrl": "https://oss/c.png"}});
        assert_eq!(read_url(&by_flag).unwrap(), "https://oss/a.png");
        assert_eq!(read_url(&by_code).unwrap(), "https://oss/b.png");
        assert_eq!(read_url(&by_zero).unwrap(), "https://oss/c.png");
    }

    #[test]
    fn rejected_or_urlless_replies_are_errors() {
        let rejected = json!({"success": false, "code": 500, "message": "quota"});
        match read_url(&rejected) {
            Err(BenchError::Upload(msg)) => assert!(msg.contains("quota")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(read_url(&json!({"success": true, "data": {}})).is_err());
    }

    struct Recording(Mutex<Vec<(String, usize)>>);

    #[async_trait]
    impl ImageUploader for Recording {
        async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> BenchResult<String> {
            self.0.lock().unwrap().push((file_name.to_string(), bytes.len()));
            Ok(format!("https://oss/{file_name}"))
        }
    }

    #[tokio::test]
    async fn upload_path_uses_the_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let rec = Recording(Mutex::new(Vec::new()));
        let url = upload_path(&rec, &path).await.unwrap();
        assert_eq!(url, "https://oss/shot.png");
        assert_eq!(rec.0.lock().unwrap().as_slice(), &[("shot.png".to_string(), 3)]);

        let missing = dir.path().join("absent.png");
        assert!(matches!(upload_path(&rec, &missing).await, Err(BenchError::Upload(_))));
    }
}
