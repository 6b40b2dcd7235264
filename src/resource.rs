//! Loader registry and the set of loaded resources.

use std::any::Any;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::loader::Ply;
use crate::texture::Texture;

/// Payload produced by a loader.
pub type ResourceData = Arc<dyn Any + Send + Sync>;

/// Turns files with one extension into resources.
pub trait ResourceLoader: Send + Sync {
    /// File extension without the leading dot.
    fn ext(&self) -> &str;

    fn load(&self, path: &Path) -> anyhow::Result<ResourceData>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("no loader available for file extension '{0}'")]
    NoLoader(String),
    #[error("failed to load {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The resource loaded, but its name is taken. It is handed back so the
    /// caller can decide what to do with it.
    #[error("resource with file name '{}' exists already", resource.name)]
    Duplicate { resource: Box<Resource> },
    #[error("resource '{0}' not found")]
    NotFound(String),
    #[error("resource '{name}' is not of type {expected}")]
    WrongType { name: String, expected: &'static str },
    #[error("glyph '{glyph}' is invalid: {reason}")]
    InvalidGlyph { glyph: char, reason: String },
    #[error("unable to read directory {}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A loaded resource, named after its file.
#[derive(Clone)]
pub struct Resource {
    pub name: String,
    pub path: PathBuf,
    pub ext: String,
    data: ResourceData,
}

impl Resource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, ext: impl Into<String>, data: ResourceData) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ext: ext.into(),
            data,
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.data.is::<T>()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("ext", &self.ext)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct Resources {
    loaders: Vec<Box<dyn ResourceLoader>>,
    resources: Vec<Resource>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a loader. Returns false if its extension is already served.
    pub fn add_loader(&mut self, loader: Box<dyn ResourceLoader>) -> bool {
        if self.loader_by_ext(loader.ext()).is_some() {
            return false;
        }
        debug!("registered loader for .{}", loader.ext());
        self.loaders.push(loader);
        true
    }

    pub fn remove_loader_by_ext(&mut self, ext: &str) -> bool {
        match self
            .loaders
            .iter()
            .position(|loader| loader.ext().eq_ignore_ascii_case(ext))
        {
            Some(index) => {
                self.loaders.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn remove_all_loaders(&mut self) {
        self.loaders.clear();
    }

    pub fn loader_by_ext(&self, ext: &str) -> Option<&dyn ResourceLoader> {
        self.loaders
            .iter()
            .find(|loader| loader.ext().eq_ignore_ascii_case(ext))
            .map(|loader| loader.as_ref())
    }

    /// Typed access to a registered loader, e.g. to change PNG filtering.
    pub fn loader_mut<L: ResourceLoader + 'static>(&mut self) -> Option<&mut L> {
        self.loaders
            .iter_mut()
            .find_map(|loader| loader.as_any_mut().downcast_mut::<L>())
    }

    /// Loads a file with the loader matching its extension.
    ///
    /// The resource is named after the file name. If that name is taken the
    /// new resource is not stored and comes back inside
    /// [`ResourceError::Duplicate`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Resource, ResourceError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let loader = self
            .loader_by_ext(&ext)
            .ok_or_else(|| ResourceError::NoLoader(ext.clone()))?;
        let data = loader.load(path).map_err(|err| ResourceError::Load {
            path: path.to_path_buf(),
            source: err.into(),
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let resource = Resource::new(name, path, ext, data);

        if self.get_by_name(&resource.name).is_some() {
            return Err(ResourceError::Duplicate {
                resource: Box::new(resource),
            });
        }
        debug!("loaded resource {}", resource.name);
        self.resources.push(resource.clone());
        Ok(resource)
    }

    /// Loads every file directly inside `dir`, stopping at the first error.
    ///
    /// Resources loaded before the failure stay registered.
    pub fn load_folder(&mut self, dir: impl AsRef<Path>) -> Result<usize, ResourceError> {
        let dir = dir.as_ref();
        let read_dir = |source: std::io::Error| ResourceError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(read_dir)? {
            let entry = entry.map_err(read_dir)?;
            if entry.file_type().map_err(read_dir)?.is_dir() {
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();

        for path in &paths {
            self.load(path)?;
        }
        Ok(paths.len())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|res| res.name == name)
    }

    pub fn get_by_path(&self, path: impl AsRef<Path>) -> Option<&Resource> {
        let path = path.as_ref();
        self.resources.iter().find(|res| res.path == path)
    }

    pub fn remove_by_name(&mut self, name: &str) -> bool {
        self.remove_where(|res| res.name == name)
    }

    pub fn remove_by_path(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.remove_where(|res| res.path == path)
    }

    pub fn remove_all(&mut self) {
        self.resources.clear();
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn texture(&self, name: &str) -> Result<Arc<Texture>, ResourceError> {
        self.typed(name, "Texture")
    }

    pub fn ply(&self, name: &str) -> Result<Arc<Ply>, ResourceError> {
        self.typed(name, "Ply")
    }

    fn typed<T: Any + Send + Sync>(
        &self,
        name: &str,
        expected: &'static str,
    ) -> Result<Arc<T>, ResourceError> {
        let resource = self
            .get_by_name(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        resource.downcast::<T>().ok_or_else(|| ResourceError::WrongType {
            name: name.to_string(),
            expected,
        })
    }

    fn remove_where(&mut self, predicate: impl Fn(&Resource) -> bool) -> bool {
        match self.resources.iter().position(predicate) {
            Some(index) => {
                self.resources.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{PlyLoader, PngLoader};
    use crate::texture::TextureFilter;
    use anyhow::anyhow;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    struct TextLoader;

    impl ResourceLoader for TextLoader {
        fn ext(&self) -> &str {
            "TXT"
        }

        fn load(&self, path: &Path) -> anyhow::Result<ResourceData> {
            let contents = fs::read_to_string(path)?;
            if contents == "broken" {
                return Err(anyhow!("broken text"));
            }
            Ok(Arc::new(contents))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn write_png(path: &Path) {
        RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn loaders_are_unique_per_extension_ignoring_case() {
        let mut resources = Resources::new();
        assert!(resources.add_loader(Box::new(TextLoader)));
        assert!(!resources.add_loader(Box::new(TextLoader)));
        assert!(resources.loader_by_ext("txt").is_some());
        assert!(resources.remove_loader_by_ext("Txt"));
        assert!(resources.loader_by_ext("txt").is_none());
        assert!(!resources.remove_loader_by_ext("txt"));
    }

    #[test]
    fn loader_mut_changes_png_settings() {
        let mut resources = Resources::new();
        resources.add_loader(Box::new(PngLoader::default()));
        resources.add_loader(Box::new(PlyLoader));
        let png = resources.loader_mut::<PngLoader>().unwrap();
        png.keep_data = true;
        png.filter = TextureFilter::Nearest;

        let dir = tempdir().unwrap();
        let path = dir.path().join("red.png");
        write_png(&path);
        resources.load(&path).unwrap();
        let texture = resources.texture("red.png").unwrap();
        assert!(texture.keeps_data());
        assert_eq!(texture.filter(), TextureFilter::Nearest);
        assert_eq!(texture.size(), glam::Vec2::new(4.0, 2.0));
    }

    #[test]
    fn duplicate_names_return_the_resource() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a");
        fs::create_dir(&first).unwrap();
        let second = dir.path().join("b");
        fs::create_dir(&second).unwrap();
        fs::write(first.join("note.txt"), "one").unwrap();
        fs::write(second.join("note.txt"), "two").unwrap();

        let mut resources = Resources::new();
        resources.add_loader(Box::new(TextLoader));
        resources.load(first.join("note.txt")).unwrap();
        match resources.load(second.join("note.txt")) {
            Err(ResourceError::Duplicate { resource }) => {
                assert_eq!(resource.name, "note.txt");
                assert_eq!(*resource.downcast::<String>().unwrap(), "two");
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn unknown_extension_and_wrong_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, "x").unwrap();
        fs::write(dir.path().join("note.txt"), "hello").unwrap();

        let mut resources = Resources::new();
        resources.add_loader(Box::new(TextLoader));
        assert!(matches!(
            resources.load(&path),
            Err(ResourceError::NoLoader(ext)) if ext == "bin"
        ));
        resources.load(dir.path().join("note.txt")).unwrap();
        assert!(matches!(
            resources.texture("note.txt"),
            Err(ResourceError::WrongType { .. })
        ));
        assert!(matches!(
            resources.ply("missing.ply"),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn load_folder_skips_directories_and_stops_at_first_error() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("b.txt"), "broken").unwrap();
        fs::write(dir.path().join("c.txt"), "gamma").unwrap();

        let mut resources = Resources::new();
        resources.add_loader(Box::new(TextLoader));
        let err = resources.load_folder(dir.path()).unwrap_err();
        assert!(matches!(err, ResourceError::Load { .. }));
        assert!(resources.get_by_name("a.txt").is_some());
        assert!(resources.get_by_name("c.txt").is_none());

        fs::write(dir.path().join("b.txt"), "fixed").unwrap();
        resources.remove_all();
        assert_eq!(resources.load_folder(dir.path()).unwrap(), 3);
    }

    #[test]
    fn remove_by_name_and_path() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let mut resources = Resources::new();
        resources.add_loader(Box::new(TextLoader));
        resources.load(&a).unwrap();
        resources.load(&b).unwrap();
        assert!(resources.get_by_path(&b).is_some());
        assert!(resources.remove_by_path(&b));
        assert!(resources.remove_by_name("a.txt"));
        assert!(!resources.remove_by_name("a.txt"));
        assert!(resources.is_empty());
    }
}
