//! `local_file`: a file on the local disk
//!
//! Attributes: `filename` (required, relative to the provider root) and
//! `content` (string, defaults to empty). Outputs: `filename`,
//! `content_hash` (blake3) and `size`. The resource id is the filename.

use crate::error::{LocalProviderError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use skyflow_core::Attributes;
use skyflow_engine::{Created, ProviderContext, ProviderResult, ResourceProvider};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub const KIND: &str = "local_file";

#[derive(Debug, Clone)]
pub struct LocalFileProvider {
    root: PathBuf,
}

impl LocalFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf> {
        let relative = Path::new(filename);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if filename.is_empty() || escapes {
            return Err(LocalProviderError::PathEscapesRoot(filename.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn write(&self, attributes: &Attributes) -> Result<(String, Attributes)> {
        let filename = filename(attributes)?;
        let content = content(attributes)?;
        let path = self.path_for(filename)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content.as_bytes()).await?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote file");

        Ok((filename.to_string(), outputs(filename, content.as_bytes())))
    }
}

fn filename(attributes: &Attributes) -> Result<&str> {
    match attributes.get("filename") {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(LocalProviderError::InvalidAttribute {
            name: "filename",
            reason: "must be a string".to_string(),
        }),
        None => Err(LocalProviderError::MissingAttribute("filename")),
    }
}

fn content(attributes: &Attributes) -> Result<String> {
    match attributes.get("content") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(LocalProviderError::InvalidAttribute {
            name: "content",
            reason: format!("must be a string, got {}", other),
        }),
    }
}

fn outputs(filename: &str, bytes: &[u8]) -> Attributes {
    let mut outputs = Attributes::new();
    outputs.insert("filename".into(), json!(filename));
    outputs.insert(
        "content_hash".into(),
        json!(blake3::hash(bytes).to_hex().to_string()),
    );
    outputs.insert("size".into(), json!(bytes.len()));
    outputs
}

#[async_trait]
impl ResourceProvider for LocalFileProvider {
    fn name(&self) -> &str {
        KIND
    }

    async fn create(&self, ctx: &ProviderContext, attributes: &Attributes) -> ProviderResult<Created> {
        let (id, outputs) = self.write(attributes).await?;
        info!(address = %ctx.address, id = %id, "Created local file");
        Ok(Created::new(id, outputs))
    }

    async fn read(&self, _ctx: &ProviderContext, id: &str) -> ProviderResult<Option<Attributes>> {
        let path = self.path_for(id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(outputs(id, &bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LocalProviderError::from(e).into()),
        }
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        id: &str,
        _old: &Attributes,
        new: &Attributes,
    ) -> ProviderResult<Attributes> {
        let (filename, outputs) = self.write(new).await?;
        if filename != id {
            // Normally a replacement, but don't leave the old file behind.
            let old_path = self.path_for(id)?;
            match fs::remove_file(&old_path).await {
                Ok(()) => debug!(path = %old_path.display(), "Removed renamed file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LocalProviderError::from(e).into()),
            }
        }
        info!(address = %ctx.address, id = %filename, "Updated local file");
        Ok(outputs)
    }

    async fn destroy(&self, ctx: &ProviderContext, id: &str) -> ProviderResult<()> {
        let path = self.path_for(id)?;
        fs::remove_file(&path)
            .await
            .map_err(LocalProviderError::from)?;
        info!(address = %ctx.address, id, "Removed local file");
        Ok(())
    }

    fn requires_replacement(&self, _ctx: &ProviderContext, old: &Attributes, new: &Attributes) -> bool {
        old.get("filename") != new.get("filename")
    }
}
