//! Archive-based file transfer between host and container.
//!
//! The container engine exposes file I/O as tar streams, so every
//! operation packs or unpacks an archive. Archive work runs on the
//! blocking pool; every container path is resolved through the path
//! policy first.

use std::io::Read;
use std::path::{Path, PathBuf};

use bollard::container::{DownloadFromContainerOptions, UploadToContainerOptions};
use bollard::Docker;
use futures::StreamExt;

use isobox_core::path_policy::resolve_container_path;
use isobox_core::{Error, Result};

use crate::container::exec_capture;

/// File ingress/egress for one container.
pub struct FileTransfer {
    docker: Docker,
    container_id: String,
    work_dir: String,
}

impl FileTransfer {
    pub fn new(
        docker: Docker,
        container_id: impl Into<String>,
        work_dir: impl Into<String>,
    ) -> Self {
        Self {
            docker,
            container_id: container_id.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Read a single file from the container as UTF-8 text.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let resolved = resolve_container_path(&self.work_dir, path)?;
        let archive = self.download_archive(&resolved, path).await?;
        let bytes = tokio::task::spawn_blocking(move || first_entry(&archive))
            .await
            .map_err(|e| Error::io(format!("Archive task failed: {}", e)))??;
        String::from_utf8(bytes).map_err(|e| Error::io(format!("File is not valid UTF-8: {}", e)))
    }

    /// Write `content` to a file in the container, creating parent
    /// directories as needed.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let resolved = resolve_container_path(&self.work_dir, path)?;
        let parent = parent_dir(&resolved);
        if !parent.is_empty() {
            self.mkdir(&parent).await?;
        }

        let name = file_name(&resolved)?;
        let data = content.as_bytes().to_vec();
        let archive = tokio::task::spawn_blocking(move || single_entry_archive(&name, &data))
            .await
            .map_err(|e| Error::io(format!("Archive task failed: {}", e)))??;

        let dest = if parent.is_empty() { "/" } else { parent.as_str() };
        self.upload_archive(dest, archive).await
    }

    /// Upload a host file or directory tree into the container.
    ///
    /// Directory structure is preserved relative to the destination
    /// basename. The upload is verified afterwards because a failed
    /// extraction leaves no trace otherwise.
    pub async fn copy_to(&self, src_path: &str, dst_path: &str) -> Result<()> {
        let src = PathBuf::from(src_path);
        if !src.exists() {
            return Err(Error::not_found(format!(
                "Source file not found: {}",
                src_path
            )));
        }

        let resolved_dst = resolve_container_path(&self.work_dir, dst_path)?;
        let parent = parent_dir(&resolved_dst);
        if !parent.is_empty() {
            self.mkdir(&parent).await?;
        }

        let arcname = file_name(&resolved_dst)?;
        let archive = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut builder = tar::Builder::new(Vec::new());
            if src.is_dir() {
                builder.append_dir_all(&arcname, &src)?;
            } else {
                builder.append_path_with_name(&src, &arcname)?;
            }
            Ok(builder.into_inner()?)
        })
        .await
        .map_err(|e| Error::io(format!("Archive task failed: {}", e)))??;

        let dest = if parent.is_empty() { "/" } else { parent.as_str() };
        self.upload_archive(dest, archive).await?;

        let (exit_code, _) = exec_capture(
            &self.docker,
            &self.container_id,
            &format!("test -e {}", resolved_dst),
        )
        .await?;
        if exit_code != 0 {
            return Err(Error::io(format!(
                "Failed to verify file creation: {}",
                dst_path
            )));
        }
        Ok(())
    }

    /// Download a container file or directory to the host.
    ///
    /// A directory destination receives the whole archive with relative
    /// structure preserved; a file destination requires a single-member
    /// archive.
    pub async fn copy_from(&self, src_path: &str, dst_path: &str) -> Result<()> {
        let dst = PathBuf::from(dst_path);
        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let resolved_src = resolve_container_path(&self.work_dir, src_path)?;
        let archive = self.download_archive(&resolved_src, src_path).await?;

        let src_label = src_path.to_string();
        tokio::task::spawn_blocking(move || unpack_archive(&archive, &dst, &src_label))
            .await
            .map_err(|e| Error::io(format!("Archive task failed: {}", e)))?
    }

    async fn download_archive(&self, resolved: &str, original: &str) -> Result<Vec<u8>> {
        let mut stream = self.docker.download_from_container(
            &self.container_id,
            Some(DownloadFromContainerOptions {
                path: resolved.to_string(),
            }),
        );

        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => {
                    return Err(Error::not_found(format!("File not found: {}", original)))
                }
                Err(e) => return Err(Error::io(format!("Failed to download archive: {}", e))),
            }
        }
        Ok(data)
    }

    async fn upload_archive(&self, dest_dir: &str, archive: Vec<u8>) -> Result<()> {
        self.docker
            .upload_to_container(
                &self.container_id,
                Some(UploadToContainerOptions {
                    path: dest_dir.to_string(),
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .map_err(|e| Error::io(format!("Failed to upload archive: {}", e)))
    }

    async fn mkdir(&self, dir: &str) -> Result<()> {
        let (exit_code, output) = exec_capture(
            &self.docker,
            &self.container_id,
            &format!("mkdir -p {}", dir),
        )
        .await?;
        if exit_code != 0 {
            return Err(Error::io(format!(
                "Failed to create directory {}: {}",
                dir, output
            )));
        }
        Ok(())
    }
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

fn file_name(path: &str) -> Result<String> {
    let name = path.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        return Err(Error::path_safety(format!(
            "Path has no file name: {}",
            path
        )));
    }
    Ok(name.to_string())
}

/// Pack content as a single-entry tar archive.
fn single_entry_archive(name: &str, content: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, content)?;
    Ok(builder.into_inner()?)
}

/// Read the first entry of a tar archive into memory.
fn first_entry(archive: &[u8]) -> Result<Vec<u8>> {
    let mut ar = tar::Archive::new(archive);
    let mut entries = ar.entries()?;
    let mut entry = entries
        .next()
        .ok_or_else(|| Error::io("Empty tar archive"))??;
    let mut content = Vec::new();
    entry.read_to_end(&mut content)?;
    Ok(content)
}

/// Unpack a downloaded archive onto the host.
fn unpack_archive(archive: &[u8], dst: &Path, src_label: &str) -> Result<()> {
    let mut ar = tar::Archive::new(archive);

    if dst.is_dir() {
        ar.unpack(dst)?;
        return Ok(());
    }

    let mut entries = ar.entries()?;
    let mut content = Vec::new();
    match entries.next() {
        None => {
            return Err(Error::not_found(format!(
                "Source file is empty: {}",
                src_label
            )))
        }
        Some(entry) => {
            entry?.read_to_end(&mut content)?;
        }
    }
    if entries.next().is_some() {
        return Err(Error::io(format!(
            "Source path is a directory but destination is a file: {}",
            src_label
        )));
    }

    std::fs::write(dst, content)?;
    Ok(())
}
