use super::{LockedFile, Sidecar};
use crate::error::{Error, Result};
use crate::record::{MetaKind, Metadata};
use serde_json::Value;
use std::path::Path;

/// Downloader `.info.json` style sidecar: one top-level object.
pub struct JsonSidecar {
    file: LockedFile,
    out: Vec<u8>,
}

impl JsonSidecar {
    pub fn new(file: LockedFile) -> Self {
        Self {
            file,
            out: Vec::new(),
        }
    }
}

impl Sidecar for JsonSidecar {
    fn path(&self) -> &Path {
        self.file.path()
    }

    fn kind(&self) -> MetaKind {
        MetaKind::Json
    }

    fn decode(&mut self) -> Result<Metadata> {
        let value: Value = serde_json::from_slice(self.file.bytes())
            .map_err(|e| Error::format(self.file.path(), e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(Error::format(
                self.file.path(),
                format!("top level is {} instead of an object", json_type_name(&other)),
            )),
        }
    }

    fn refresh(&mut self) -> Result<Metadata> {
        self.file.reload()?;
        self.decode()
    }

    fn write(&mut self, meta: &Metadata) -> Result<()> {
        self.out.clear();
        serde_json::to_writer_pretty(&mut self.out, meta)
            .map_err(|e| Error::format(self.file.path(), e.to_string()))?;
        self.out.push(b'\n');
        self.file.replace(&self.out)
    }

    fn rollback(&mut self) -> Result<()> {
        self.file.restore_original()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
