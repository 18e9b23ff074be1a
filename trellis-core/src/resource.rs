//! 资源包
//!
//! 资源以 `"<包名>:<路径>"` 寻址。同名的 [`ResourceSource`] 会被合并，路径冲突时报错。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};

/// 只读文件集合
pub trait AssetFiles: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// 内存中的文件集合
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: BTreeMap<String, Arc<[u8]>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: impl Into<String>, content: impl AsRef<[u8]>) -> Self {
        self.files.insert(path.into(), Arc::from(content.as_ref()));
        self
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

impl AssetFiles for MemoryAssets {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.files.get(path) {
            Some(content) => Ok(Box::new(Cursor::new(content.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("asset '{}' not found", path),
            )),
        }
    }
}

/// 以某个目录为根的文件集合
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 根目录下所有文件的相对路径（`/` 分隔）
    pub fn paths(&self) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        walk(&self.root, "", &mut out)?;
        out.sort();
        Ok(out)
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("asset path '{}' escapes the resource root", path),
            ));
        }
        Ok(self.root.join(relative))
    }
}

fn walk(dir: &Path, prefix: &str, out: &mut Vec<String>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        if entry.file_type()?.is_dir() {
            walk(&entry.path(), &relative, out)?;
        } else {
            out.push(relative);
        }
    }
    Ok(())
}

impl AssetFiles for DirAssets {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = std::fs::File::open(self.resolve(path)?)?;
        Ok(Box::new(file))
    }
}

/// 扫描时传入的资源包
#[derive(Clone)]
pub struct ResourceSource {
    pub name: String,
    pub asset_names: Vec<String>,
    pub files: Arc<dyn AssetFiles>,
}

impl ResourceSource {
    pub fn new(
        name: impl Into<String>,
        asset_names: Vec<String>,
        files: Arc<dyn AssetFiles>,
    ) -> Self {
        Self {
            name: name.into(),
            asset_names,
            files,
        }
    }

    pub fn memory(name: impl Into<String>, assets: MemoryAssets) -> Self {
        let asset_names = assets.paths();
        Self::new(name, asset_names, Arc::new(assets))
    }

    /// 目录资源包，资源名为目录下的全部文件
    pub fn directory(name: impl Into<String>, root: impl Into<PathBuf>) -> io::Result<Self> {
        let assets = DirAssets::new(root);
        let asset_names = assets.paths()?;
        Ok(Self::new(name, asset_names, Arc::new(assets)))
    }
}

impl fmt::Debug for ResourceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSource")
            .field("name", &self.name)
            .field("asset_names", &self.asset_names)
            .finish()
    }
}

/// 单个资源
#[derive(Clone)]
pub struct Resource {
    path: String,
    files: Arc<dyn AssetFiles>,
}

impl Resource {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        self.files.open(&self.path)
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        let mut out = String::new();
        self.open()?.read_to_string(&mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({})", self.path)
    }
}

/// 同名资源包合并后的索引
#[derive(Default)]
pub(crate) struct ResourceBundle {
    resources: HashMap<String, Resource>,
}

impl ResourceBundle {
    pub(crate) fn merge(&mut self, source: &ResourceSource) -> Result<()> {
        if let Some(conflict) = source
            .asset_names
            .iter()
            .find(|name| self.resources.contains_key(name.as_str()))
        {
            return Err(Error::Resource(format!(
                "resource '{}' already exist in context for resource source '{}'",
                conflict, source.name
            )));
        }
        for name in &source.asset_names {
            self.resources.insert(
                name.clone(),
                Resource {
                    path: name.clone(),
                    files: source.files.clone(),
                },
            );
        }
        Ok(())
    }

    pub(crate) fn get(&self, path: &str) -> Option<Resource> {
        self.resources.get(path).cloned()
    }
}

/// 拆分 `"<包名>:<路径>"`
pub(crate) fn split_resource_path(path: &str) -> Option<(&str, &str)> {
    path.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_assets() {
        let assets = MemoryAssets::new().file("a.txt", "hello").file("b/c.txt", "world");
        assert_eq!(assets.paths(), vec!["a.txt", "b/c.txt"]);
        let mut s = String::new();
        assets.open("a.txt").unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(
            assets.open("missing").err().map(|e| e.kind()),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_bundle_merge_conflict() {
        let mut bundle = ResourceBundle::default();
        bundle
            .merge(&ResourceSource::memory("res", MemoryAssets::new().file("a", "1")))
            .unwrap();
        bundle
            .merge(&ResourceSource::memory("res", MemoryAssets::new().file("b", "2")))
            .unwrap();
        assert_eq!(bundle.get("b").unwrap().read_to_string().unwrap(), "2");

        let err = bundle
            .merge(&ResourceSource::memory("res", MemoryAssets::new().file("a", "3")))
            .unwrap_err();
        assert!(err.to_string().contains("already exist"));
        assert_eq!(bundle.get("a").unwrap().read_to_string().unwrap(), "1");
    }

    #[test]
    fn test_dir_assets_reject_escape() {
        let assets = DirAssets::new("/tmp");
        let err = assets.open("../etc/passwd").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_resource_path("res:a/b.txt"), Some(("res", "a/b.txt")));
        assert_eq!(split_resource_path("plain"), None);
    }
}
