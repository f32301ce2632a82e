//! Where upload bytes come from.

use super::plan::PartSpec;
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// A selected file: immutable name, type and size plus random access to its bytes.
#[async_trait]
pub trait UploadSource: Send + Sync {
    fn file_name(&self) -> &str;
    fn content_type(&self) -> &str;
    fn size(&self) -> u64;
    async fn read_part(&self, part: &PartSpec) -> io::Result<Bytes>;
}

/// A file on local disk, reopened for every part so parts can be read concurrently.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    file_name: String,
    content_type: String,
    size: u64,
}

impl FileSource {
    /// Stat the file; the content type is guessed from the extension unless given.
    pub async fn open(path: impl AsRef<Path>, content_type: Option<String>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let content_type = content_type.unwrap_or_else(|| guess_content_type(&file_name).into());

        Ok(Self {
            path,
            file_name,
            content_type,
            size: meta.len(),
        })
    }
}

#[async_trait]
impl UploadSource for FileSource {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_part(&self, part: &PartSpec) -> io::Result<Bytes> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(part.offset)).await?;
        let mut buf = vec![0u8; part.len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// An in-memory payload.
#[derive(Debug, Clone)]
pub struct BytesSource {
    file_name: String,
    content_type: String,
    data: Bytes,
}

impl BytesSource {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl UploadSource for BytesSource {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_part(&self, part: &PartSpec) -> io::Result<Bytes> {
        let range = part.range();
        if range.end > self.size() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "part extends past the end of the payload",
            ));
        }
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}

pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn file_source_reads_exact_ranges() {
        let mut tmp = tempfile::Builder::new().suffix(".webm").tempfile().unwrap();
        tmp.write_all(b"0123456789abcdef").unwrap();

        let source = FileSource::open(tmp.path(), None).await.unwrap();
        assert_eq!(source.size(), 16);
        assert_eq!(source.content_type(), "video/webm");

        let part = PartSpec {
            part_number: 2,
            offset: 10,
            len: 6,
        };
        assert_eq!(source.read_part(&part).await.unwrap(), Bytes::from("abcdef"));
    }

    #[tokio::test]
    async fn bytes_source_rejects_out_of_range_parts() {
        let source = BytesSource::new("a.bin", "application/octet-stream", &b"abc"[..]);
        let part = PartSpec {
            part_number: 1,
            offset: 2,
            len: 5,
        };
        assert!(source.read_part(&part).await.is_err());
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(guess_content_type("Film.MOV"), "video/quicktime");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
