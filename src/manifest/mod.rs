//! Manifest loading, collection views, and write-back
//!
//! A [`Manifest`] owns the parsed tree of one manifest file plus the trees
//! of any `<include>`d files, hands out [`Element`] wrappers over individual
//! elements, and persists edits back to disk.
//!
//! Collection accessors re-scan the live tree on every call; nothing is
//! cached or indexed, so a view always reflects children added or removed
//! since the manifest was loaded.
//!
//! # Example Manifest
//!
//! ```xml
//! <manifest>
//!   <remote name="origin" fetch="https://git.example.com"/>
//!   <default revision="main" remote="origin"/>
//!
//!   <project path="build" name="tools/build.git">
//!     <annotation name="GIT_LOCK_STATUS" value="READ_ONLY"/>
//!   </project>
//!
//!   <post-sync path="post-sync.sh"/>
//! </manifest>
//! ```

mod element;

pub use element::{Element, Project, Remote};

use crate::dom::{Document, NodeId};
use crate::{ManifestError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct ManifestFile {
    /// Source path; empty for manifests parsed from a string
    path: PathBuf,
    doc: Document,
    root: NodeId,
}

/// A repo manifest: the entry file plus any included files, in resolution
/// order
///
/// Exclusively owns the parsed trees. All wrappers and views borrow from the
/// manifest and are valid for its lifetime only. Node storage uses interior
/// mutability, so the type is single-threaded; concurrent mutation requires
/// external locking.
#[derive(Debug)]
pub struct Manifest {
    files: Vec<ManifestFile>,
}

impl Manifest {
    /// Load a manifest from a file, resolving `<include>` elements
    /// relative to the including file's directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut files = Vec::new();
        let mut visited = HashSet::new();
        load_file(path, &mut files, &mut visited)?;
        tracing::debug!(path = %path.display(), file_count = files.len(), "Loaded manifest");
        Ok(Manifest { files })
    }

    /// Parse a manifest from a string
    ///
    /// `<include>` elements are left unresolved since there is no directory
    /// to resolve them against, and [`Manifest::write`] is unavailable (use
    /// [`Manifest::write_to`] or [`Manifest::serialize`]).
    pub fn parse(text: &str) -> Result<Self> {
        let doc = Document::parse(text)?;
        let Some(root) = doc.root_element() else {
            return Err(ManifestError::Parse(
                "Manifest has no root element".to_string(),
            ));
        };
        Ok(Manifest {
            files: vec![ManifestFile {
                path: PathBuf::new(),
                doc,
                root,
            }],
        })
    }

    /// Locate and load the manifest supplying an initialized checkout, given
    /// its metadata directory
    ///
    /// `<repo_root>/manifest.xml` either is a symlink to the real manifest
    /// (followed, relative targets resolved against `repo_root`) or is a
    /// pointer file whose single `<include>` names the real manifest under
    /// `<repo_root>/manifests/`.
    pub fn from_repo_root(repo_root: impl AsRef<Path>) -> Result<Self> {
        let repo_root = repo_root.as_ref();
        let pointer = repo_root.join("manifest.xml");
        let meta = fs::symlink_metadata(&pointer).map_err(|_| ManifestError::NotFound {
            path: pointer.clone(),
        })?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&pointer)?;
            let resolved = if target.is_absolute() {
                target
            } else {
                repo_root.join(target)
            };
            tracing::debug!(path = %resolved.display(), "Following manifest symlink");
            return Self::load(resolved);
        }

        let text = fs::read_to_string(&pointer)?;
        let doc = Document::parse(&text)?;
        let Some(root) = doc.root_element() else {
            return Err(ManifestError::Parse(format!(
                "{} has no root element",
                pointer.display()
            )));
        };
        let includes: Vec<NodeId> = doc
            .child_elements(root)
            .into_iter()
            .filter(|id| doc.tag(*id).as_deref() == Some("include"))
            .collect();
        if includes.len() != 1 {
            return Err(ManifestError::Parse(format!(
                "Incorrect number of included manifests in {}: should be one but is {}",
                pointer.display(),
                includes.len()
            )));
        }
        let Some(name) = doc.attr(includes[0], "name") else {
            return Err(ManifestError::Parse(format!(
                "Include element in {} missing name",
                pointer.display()
            )));
        };
        Self::load(repo_root.join("manifests").join(name))
    }

    /// Path the entry manifest was loaded from
    pub fn path(&self) -> &Path {
        &self.files[0].path
    }

    /// The entry manifest's root element
    pub fn root(&self) -> Element<'_> {
        let file = &self.files[0];
        Element::new(self, &file.doc, file.root)
    }

    /// All `<project>` elements across the entry manifest and its includes,
    /// in document order, with `<remove-project>` entries applied
    pub fn projects(&self) -> Vec<Project<'_>> {
        let mut projects: Vec<(Element<'_>, Option<String>, Option<String>)> = Vec::new();
        for file in &self.files {
            for id in file.doc.child_elements(file.root) {
                if file.doc.tag(id).as_deref() == Some("project") {
                    let name = file.doc.attr(id, "name");
                    let path = file.doc.attr(id, "path").or_else(|| name.clone());
                    projects.push((Element::new(self, &file.doc, id), name, path));
                }
            }
        }

        // Each <remove-project> entry drops the first project it matches
        for (rm_name, rm_path) in self.remove_project_rules() {
            let matched = projects.iter().position(|(_, name, path)| {
                (rm_name == *name && rm_path == *path)
                    || (rm_name == *name && rm_path.is_none())
                    || (rm_name.is_none() && rm_path == *path)
            });
            if let Some(pos) = matched {
                projects.remove(pos);
            }
        }

        projects
            .into_iter()
            .map(|(elem, _, _)| Project::new(elem))
            .collect()
    }

    /// All `<remote>` elements, in document order
    pub fn remotes(&self) -> Vec<Remote<'_>> {
        self.top_level("remote").into_iter().map(Remote::new).collect()
    }

    /// All `<default>` elements, in document order
    pub fn defaults(&self) -> Vec<Element<'_>> {
        self.top_level("default")
    }

    /// The first `<default>` element, if any
    pub fn default(&self) -> Option<Element<'_>> {
        self.top_level("default").into_iter().next()
    }

    /// All `<remove-project>` elements, in document order
    pub fn remove_projects(&self) -> Vec<Element<'_>> {
        self.top_level("remove-project")
    }

    /// All `<post-sync>` script elements, in document order
    pub fn post_sync_scripts(&self) -> Vec<Element<'_>> {
        self.top_level("post-sync")
    }

    /// The first `<git_flow>` element, if any
    pub fn git_flow(&self) -> Option<Element<'_>> {
        self.top_level("git_flow").into_iter().next()
    }

    /// First project whose name matches, if any
    pub fn project_by_name(&self, name: &str) -> Option<Project<'_>> {
        self.projects()
            .into_iter()
            .find(|p| p.name().is_ok_and(|n| n == name))
    }

    /// First project whose checkout path matches, if any
    pub fn project_by_path(&self, path: &str) -> Option<Project<'_>> {
        self.projects()
            .into_iter()
            .find(|p| p.path().is_ok_and(|pp| pp == path))
    }

    /// First remote whose name matches, if any
    pub fn remote_by_name(&self, name: &str) -> Option<Remote<'_>> {
        self.remotes()
            .into_iter()
            .find(|r| r.name().is_ok_and(|n| n == name))
    }

    /// Load each `<submanifest>` as its own manifest, resolving its `path`
    /// attribute relative to the entry manifest's directory
    pub fn submanifests(&self) -> Result<Vec<Manifest>> {
        let dir = self.files[0]
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut out = Vec::new();
        for sub in self.top_level("submanifest") {
            let path = sub.attr("path")?;
            out.push(Manifest::load(dir.join(path))?);
        }
        Ok(out)
    }

    /// Serialize every loaded file back to its source path
    ///
    /// Each file is written atomically: content goes to a temporary file in
    /// the same directory which is then renamed over the target, so a failed
    /// write leaves the previous file untouched. The in-memory tree is not
    /// altered; writing is repeatable.
    pub fn write(&self) -> Result<()> {
        for file in &self.files {
            if file.path.as_os_str().is_empty() {
                return Err(ManifestError::Write {
                    path: file.path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "manifest was parsed from a string; use write_to",
                    ),
                });
            }
            write_document(&file.doc, &file.path)?;
        }
        Ok(())
    }

    /// Serialize the entry manifest to the given path (atomically, like
    /// [`Manifest::write`]); included files are not written
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        write_document(&self.files[0].doc, path.as_ref())
    }

    /// Current XML text of the entry manifest
    pub fn serialize(&self) -> String {
        self.files[0].doc.serialize()
    }

    /// Attribute of the first `<default>` element, used as the read
    /// fallback for attributes missing on other elements
    pub(crate) fn default_value(&self, name: &str) -> Option<String> {
        for file in &self.files {
            for id in file.doc.child_elements(file.root) {
                if file.doc.tag(id).as_deref() == Some("default") {
                    return file.doc.attr(id, name);
                }
            }
        }
        None
    }

    fn top_level(&self, tag: &str) -> Vec<Element<'_>> {
        let mut out = Vec::new();
        for file in &self.files {
            for id in file.doc.child_elements(file.root) {
                if file.doc.tag(id).as_deref() == Some(tag) {
                    out.push(Element::new(self, &file.doc, id));
                }
            }
        }
        out
    }

    fn remove_project_rules(&self) -> Vec<(Option<String>, Option<String>)> {
        let mut rules = Vec::new();
        for file in &self.files {
            for id in file.doc.child_elements(file.root) {
                if file.doc.tag(id).as_deref() == Some("remove-project") {
                    rules.push((file.doc.attr(id, "name"), file.doc.attr(id, "path")));
                }
            }
        }
        rules
    }
}

fn load_file(
    path: &Path,
    files: &mut Vec<ManifestFile>,
    visited: &mut HashSet<PathBuf>,
) -> Result<()> {
    if !path.exists() {
        return Err(ManifestError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let canonical = path.canonicalize()?;
    if !visited.insert(canonical) {
        return Err(ManifestError::Parse(format!(
            "Include cycle detected at {}",
            path.display()
        )));
    }

    let text = fs::read_to_string(path)?;
    let doc = Document::parse(&text)?;
    let Some(root) = doc.root_element() else {
        return Err(ManifestError::Parse(format!(
            "{} has no root element",
            path.display()
        )));
    };
    tracing::debug!(path = %path.display(), "Parsed manifest file");

    let mut include_names = Vec::new();
    for child in doc.child_elements(root) {
        if doc.tag(child).as_deref() == Some("include") {
            match doc.attr(child, "name") {
                Some(name) => include_names.push(name),
                None => {
                    return Err(ManifestError::Parse(format!(
                        "Include element in manifest {} missing name",
                        path.display()
                    )));
                }
            }
        }
    }

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    files.push(ManifestFile {
        path: path.to_path_buf(),
        doc,
        root,
    });
    for name in include_names {
        load_file(&dir.join(name), files, visited)?;
    }
    Ok(())
}

fn write_document(doc: &Document, path: &Path) -> Result<()> {
    let content = doc.serialize();

    // Atomic replacement: temp file in the same directory, then rename
    let temp_path = path.with_extension("xml.tmp");
    fs::write(&temp_path, content.as_bytes()).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "Wrote manifest file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest>
  <remote name="external" fetch="ssh://git@team.example.com"/>
  <default revision="main" remote="external"/>
  <project name="test_repo/projecta.git" path="dira" revision="823a24794c1d980aaaa08fbd0a8dd95d1a1a8c39"/>
  <project name="test_repo/projectb.git" path="dirb"/>
  <post-sync path="post-sync.sh"/>
</manifest>
"#;

    #[test]
    fn test_collections() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.remotes().len(), 1);
        assert_eq!(manifest.projects().len(), 2);
        assert_eq!(manifest.defaults().len(), 1);
        assert_eq!(manifest.post_sync_scripts().len(), 1);
        assert!(manifest.default().is_some());
        assert!(manifest.git_flow().is_none());
        assert_eq!(
            manifest.post_sync_scripts()[0].attr("path").unwrap(),
            "post-sync.sh"
        );
    }

    #[test]
    fn test_collections_are_live() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        manifest
            .root()
            .add_child("project", &[("name", "new.git"), ("path", "new")])
            .unwrap();
        assert_eq!(manifest.projects().len(), 3);

        manifest.projects()[0].remove().unwrap();
        assert_eq!(manifest.projects().len(), 2);
    }

    #[test]
    fn test_add_then_find() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();
        project
            .add_child("annotation", &[("name", "FOO"), ("value", "BAR")])
            .unwrap();

        let matching = project.child_elements("annotation").unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].attr("name").unwrap(), "FOO");
        // New child is the last element child of the project
        let children = project.children().unwrap();
        assert_eq!(children.last().map(|c| c.tag()), Some("annotation".to_string()));
    }

    #[test]
    fn test_remove_then_gone_from_view() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();
        project.remove().unwrap();

        assert_eq!(manifest.projects().len(), 1);
        assert!(manifest.project_by_name("test_repo/projecta.git").is_none());
    }

    #[test]
    fn test_lookups() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert!(manifest.project_by_name("test_repo/projectb.git").is_some());
        assert!(manifest.project_by_name("nope").is_none());
        assert!(manifest.project_by_path("dirb").is_some());
        assert!(manifest.project_by_path("nope").is_none());
        assert!(manifest.remote_by_name("external").is_some());
        assert!(manifest.remote_by_name("nope").is_none());
    }

    #[test]
    fn test_remove_project_filtering() {
        let text = r#"<manifest>
  <project name="keep.git" path="keep"/>
  <project name="byname.git" path="p1"/>
  <project name="bypath.git" path="p2"/>
  <project name="byboth.git" path="p3"/>
  <remove-project name="byname.git"/>
  <remove-project path="p2"/>
  <remove-project name="byboth.git" path="p3"/>
  <remove-project name="byboth.git" path="wrong"/>
</manifest>
"#;
        let manifest = Manifest::parse(text).unwrap();
        let names: Vec<String> = manifest
            .projects()
            .iter()
            .map(|p| p.name().unwrap())
            .collect();
        assert_eq!(names, vec!["keep.git"]);
        assert_eq!(manifest.remove_projects().len(), 4);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Manifest::parse("<manifest><project></manifest>"),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            Manifest::parse("   "),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Manifest::load("/definitely/not/here/manifest.xml").unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
    }

    #[test]
    fn test_scenario_rename_and_serialize() {
        let text = "<manifest><project name=\"example.git\" path=\"ex_path\" revision=\"02c94033\"/></manifest>";
        let manifest = Manifest::parse(text).unwrap();

        let projects = manifest.projects();
        assert_eq!(projects.len(), 1);
        let project = &projects[0];
        assert_eq!(project.name().unwrap(), "example.git");
        assert_eq!(project.path().unwrap(), "ex_path");
        assert_eq!(project.attr("revision").unwrap(), "02c94033");

        project.set_attr("name", "new_name.git").unwrap();
        assert_eq!(
            manifest.serialize(),
            "<manifest><project name=\"new_name.git\" path=\"ex_path\" revision=\"02c94033\"/></manifest>"
        );
    }

    #[test]
    fn test_write_requires_a_backing_file() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert!(matches!(
            manifest.write(),
            Err(ManifestError::Write { .. })
        ));
    }

    #[test]
    fn test_serialize_is_repeatable() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        manifest.projects()[0].set_attr("groups", "g1").unwrap();
        let first = manifest.serialize();
        let second = manifest.serialize();
        assert_eq!(first, second);
    }
}
