use indexmap::IndexMap;

/// File content as produced by the generator (text) or decoded from an attachment (binary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

impl FileContent {
    /// Raw bytes to upload. Text is UTF-8 encoded.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(s) => s.as_bytes(),
            FileContent::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named file. The name is a path relative to the artifact root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub name: String,
    pub content: FileContent,
}

impl File {
    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: FileContent::Text(content.into()),
        }
    }

    pub fn binary(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content: FileContent::Binary(content),
        }
    }
}

/// Ordered mapping from path to content.
///
/// Inserting a path that is already present replaces its content and keeps
/// its original position. Rounds insert generated files first, then
/// attachments, so an attachment wins over a generated file with the same path.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: IndexMap<String, FileContent>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge generated files with decoded attachments, attachments last.
    pub fn merge(generated: Vec<File>, attachments: Vec<File>) -> Self {
        let mut set = Self::new();
        set.extend(generated);
        set.extend(attachments);
        set
    }

    /// Insert a file, returning the content it replaced if the path was taken.
    pub fn insert(&mut self, file: File) -> Option<FileContent> {
        let replaced = self.files.insert(file.name.clone(), file.content);
        if replaced.is_some() {
            tracing::debug!(path = %file.name, "File replaced by a later entry");
        }
        replaced
    }

    pub fn extend(&mut self, files: impl IntoIterator<Item = File>) {
        for file in files {
            self.insert(file);
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileContent> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileContent)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }
}
