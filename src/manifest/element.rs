//! Typed accessors over manifest tree nodes
//!
//! [`Element`] is the attribute proxy: it wraps one node and routes reads and
//! writes straight through to the tree, so every wrapper over the same node
//! observes the same data. [`Project`] and [`Remote`] layer kind-specific
//! convenience getters on top.
//!
//! Rust has no hook for intercepting arbitrary field access, so the dynamic
//! `element.name` style of the manifest vocabulary maps to explicit
//! `attr("name")` / `set_attr("name", ...)` / `remove_attr("name")` calls
//! plus the named getters below.

use crate::dom::{Document, NodeId};
use crate::manifest::Manifest;
use crate::{ManifestError, Result};
use std::ops::Deref;

/// A manifest element bound to one node of the parsed tree
///
/// Non-owning and cheap to copy. A wrapper stays usable only while its node
/// is attached to the tree; after [`Element::remove`] every operation on any
/// wrapper of that node fails with [`ManifestError::DetachedElement`].
#[derive(Debug, Clone, Copy)]
pub struct Element<'m> {
    manifest: &'m Manifest,
    doc: &'m Document,
    id: NodeId,
}

impl<'m> Element<'m> {
    pub(crate) fn new(manifest: &'m Manifest, doc: &'m Document, id: NodeId) -> Self {
        Self { manifest, doc, id }
    }

    /// Tag name of the wrapped element
    ///
    /// Still answers on a detached wrapper; the node data outlives its
    /// attachment.
    pub fn tag(&self) -> String {
        self.doc.tag(self.id).unwrap_or_default()
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.doc.is_attached(self.id) {
            Ok(())
        } else {
            Err(ManifestError::DetachedElement { tag: self.tag() })
        }
    }

    /// Attribute value, with fallback to the manifest's `<default>` element
    /// and then to the element kind's declared defaults
    ///
    /// Fails with [`ManifestError::MissingAttribute`] when no source has the
    /// attribute. Fallback values are read-only; they are never written onto
    /// the node.
    pub fn attr(&self, name: &str) -> Result<String> {
        self.attr_opt(name)?
            .ok_or_else(|| ManifestError::MissingAttribute {
                element: self.tag(),
                name: name.to_string(),
            })
    }

    /// Like [`Element::attr`] but `Ok(None)` when the attribute is absent
    /// everywhere
    pub fn attr_opt(&self, name: &str) -> Result<Option<String>> {
        self.ensure_attached()?;
        if let Some(value) = self.doc.attr(self.id, name) {
            return Ok(Some(value));
        }
        if let Some(value) = self.manifest.default_value(name) {
            return Ok(Some(value));
        }
        Ok(kind_default(&self.tag(), name).map(str::to_string))
    }

    /// Attribute value physically present on this element, without any
    /// `<default>` or kind fallback
    pub fn local_attr(&self, name: &str) -> Result<Option<String>> {
        self.ensure_attached()?;
        Ok(self.doc.attr(self.id, name))
    }

    /// All attributes physically present on this element, in document order
    pub fn attrs(&self) -> Result<Vec<(String, String)>> {
        self.ensure_attached()?;
        Ok(self.doc.attrs(self.id))
    }

    /// Set an attribute on the element, overwriting any existing value
    pub fn set_attr(&self, name: &str, value: &str) -> Result<()> {
        self.ensure_attached()?;
        self.doc.set_attr(self.id, name, value);
        Ok(())
    }

    /// Remove an attribute from the element
    ///
    /// Fails with [`ManifestError::MissingAttribute`] if the attribute is not
    /// physically present; a value visible only through `<default>`
    /// inheritance has nothing on the node to remove.
    pub fn remove_attr(&self, name: &str) -> Result<()> {
        self.ensure_attached()?;
        if self.doc.remove_attr(self.id, name) {
            Ok(())
        } else {
            Err(ManifestError::MissingAttribute {
                element: self.tag(),
                name: name.to_string(),
            })
        }
    }

    /// Element children, in document order
    pub fn children(&self) -> Result<Vec<Element<'m>>> {
        self.ensure_attached()?;
        Ok(self
            .doc
            .child_elements(self.id)
            .into_iter()
            .map(|id| Element::new(self.manifest, self.doc, id))
            .collect())
    }

    /// Element children with the given tag, in document order
    pub fn child_elements(&self, tag: &str) -> Result<Vec<Element<'m>>> {
        Ok(self
            .children()?
            .into_iter()
            .filter(|c| c.tag() == tag)
            .collect())
    }

    /// Create a child element with the given tag and attribute pairs and
    /// append it as the last child
    ///
    /// Attribute order follows the order of the slice. Any tag is accepted;
    /// semantic validation is the caller's concern.
    pub fn add_child(&self, tag: &str, attrs: &[(&str, &str)]) -> Result<Element<'m>> {
        self.ensure_attached()?;
        let id = self.doc.append_element(self.id, tag, attrs);
        Ok(Element::new(self.manifest, self.doc, id))
    }

    /// Detach this element from its parent
    ///
    /// Fails with [`ManifestError::DetachedElement`] if the element was
    /// already removed or is the document root. Wrappers held elsewhere for
    /// the same node discover the removal on their next access.
    pub fn remove(&self) -> Result<()> {
        self.ensure_attached()?;
        match self.doc.parent(self.id) {
            Some(parent) if parent != self.doc.root() => {
                self.doc.detach(self.id);
                Ok(())
            }
            _ => Err(ManifestError::DetachedElement { tag: self.tag() }),
        }
    }
}

/// Declared read defaults per element kind, consulted last during lookup
fn kind_default(tag: &str, name: &str) -> Option<&'static str> {
    match (tag, name) {
        ("default", "revision") => Some("refs/heads/master"),
        _ => None,
    }
}

/// A `<project>` element
#[derive(Debug, Clone, Copy)]
pub struct Project<'m> {
    elem: Element<'m>,
}

impl<'m> Deref for Project<'m> {
    type Target = Element<'m>;

    fn deref(&self) -> &Element<'m> {
        &self.elem
    }
}

impl<'m> Project<'m> {
    pub(crate) fn new(elem: Element<'m>) -> Self {
        Self { elem }
    }

    /// Repository name
    pub fn name(&self) -> Result<String> {
        self.elem.attr("name")
    }

    /// Checkout path, falling back to the repository name when no `path`
    /// attribute is set
    pub fn path(&self) -> Result<String> {
        if let Some(path) = self.elem.local_attr("path")? {
            return Ok(path);
        }
        if let Some(name) = self.elem.local_attr("name")? {
            return Ok(name);
        }
        Err(ManifestError::MissingAttribute {
            element: self.elem.tag(),
            name: "path".to_string(),
        })
    }

    /// Pinned revision, inherited from `<default>` when not set on the
    /// project itself
    pub fn revision(&self) -> Result<Option<String>> {
        self.elem.attr_opt("revision")
    }

    /// Group list, inherited from `<default>` when not set on the project
    pub fn groups(&self) -> Result<Option<String>> {
        self.elem.attr_opt("groups")
    }

    /// Value of the child `<annotation>` with the given name
    pub fn annotation(&self, name: &str) -> Result<Option<String>> {
        for a in self.elem.child_elements("annotation")? {
            if a.local_attr("name")?.as_deref() == Some(name) {
                return a.local_attr("value");
            }
        }
        Ok(None)
    }

    /// Value of the GIT_LOCK_STATUS annotation
    pub fn lock_status(&self) -> Result<Option<String>> {
        self.annotation("GIT_LOCK_STATUS")
    }

    /// Alternative name for the master branch (see [`Project::alternative_branch`])
    pub fn alternative_master(&self) -> Result<Option<String>> {
        self.alternative_branch("master")
    }

    /// Alternative name for the develop branch (see [`Project::alternative_branch`])
    pub fn alternative_develop(&self) -> Result<Option<String>> {
        self.alternative_branch("develop")
    }

    /// Alternative name for a branch, taken from the first matching
    /// annotation in document order: `GIT_FLOW_BRANCH_<BRANCH>` names the
    /// replacement outright, `GIT_FLOW_SUFFIX` derives `<branch>-<suffix>`
    pub fn alternative_branch(&self, branch: &str) -> Result<Option<String>> {
        let branch_annotation = format!("GIT_FLOW_BRANCH_{}", branch.to_uppercase());
        for a in self.elem.child_elements("annotation")? {
            match a.local_attr("name")?.as_deref() {
                Some(n) if n == branch_annotation => return a.local_attr("value"),
                Some("GIT_FLOW_SUFFIX") => {
                    if let Some(suffix) = a.local_attr("value")? {
                        return Ok(Some(format!("{}-{}", branch, suffix)));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

/// A `<remote>` element
#[derive(Debug, Clone, Copy)]
pub struct Remote<'m> {
    elem: Element<'m>,
}

impl<'m> Deref for Remote<'m> {
    type Target = Element<'m>;

    fn deref(&self) -> &Element<'m> {
        &self.elem
    }
}

impl<'m> Remote<'m> {
    pub(crate) fn new(elem: Element<'m>) -> Self {
        Self { elem }
    }

    /// Remote name (e.g. "origin")
    pub fn name(&self) -> Result<String> {
        self.elem.attr("name")
    }

    /// Fetch URL base
    pub fn fetch(&self) -> Result<String> {
        self.elem.attr("fetch")
    }

    /// Review URL, if configured
    pub fn review(&self) -> Result<Option<String>> {
        self.elem.attr_opt("review")
    }
}

#[cfg(test)]
mod tests {
    use crate::manifest::Manifest;
    use crate::ManifestError;

    const SAMPLE: &str = r#"<manifest>
  <remote name="external" fetch="ssh://git@team.example.com"/>
  <default revision="main" remote="external"/>
  <project name="test_repo/projecta.git" path="dira" groups="Group1">
    <annotation name="GIT_FLOW_BRANCH_MASTER" value="master-v2"/>
    <annotation name="GIT_FLOW_BRANCH_DEVELOP" value="develop-v2"/>
  </project>
  <project name="test_repo/projectb.git" path="dirb">
    <annotation name="GIT_FLOW_SUFFIX" value="2"/>
  </project>
  <project name="test_repo/projectc.git">
    <annotation name="GIT_LOCK_STATUS" value="READ_ONLY"/>
  </project>
</manifest>
"#;

    #[test]
    fn test_attr_set_get() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();
        project.set_attr("revision", "deadbeef").unwrap();
        assert_eq!(project.attr("revision").unwrap(), "deadbeef");
    }

    #[test]
    fn test_attr_inherits_from_default_element() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();
        // No revision on the project itself; <default> supplies one
        assert_eq!(project.attr("revision").unwrap(), "main");
        assert_eq!(project.local_attr("revision").unwrap(), None);
    }

    #[test]
    fn test_default_revision_sentinel() {
        let manifest =
            Manifest::parse("<manifest><default remote=\"origin\"/></manifest>").unwrap();
        let default = manifest.default().unwrap();
        assert_eq!(default.attr("revision").unwrap(), "refs/heads/master");
    }

    #[test]
    fn test_missing_attr_is_an_error() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();
        let err = project.attr("no-such-attribute").unwrap_err();
        assert!(matches!(err, ManifestError::MissingAttribute { .. }));
    }

    #[test]
    fn test_remove_attr_requires_physical_presence() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();

        // Inherited via <default>, readable but not removable
        assert_eq!(project.attr("revision").unwrap(), "main");
        let err = project.remove_attr("revision").unwrap_err();
        assert!(matches!(err, ManifestError::MissingAttribute { .. }));

        project.remove_attr("groups").unwrap();
        assert_eq!(project.local_attr("groups").unwrap(), None);
    }

    #[test]
    fn test_delete_then_get_falls_back_to_default() {
        let manifest = Manifest::parse(
            "<manifest><default revision=\"main\"/><project name=\"a\" revision=\"pinned\"/></manifest>",
        )
        .unwrap();
        let project = manifest.project_by_name("a").unwrap();
        project.remove_attr("revision").unwrap();
        // Never the deleted value: the inherited one shows through instead
        assert_eq!(project.attr("revision").unwrap(), "main");
    }

    #[test]
    fn test_path_falls_back_to_name() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let with_path = manifest.project_by_name("test_repo/projecta.git").unwrap();
        assert_eq!(with_path.path().unwrap(), "dira");
        let without_path = manifest.project_by_name("test_repo/projectc.git").unwrap();
        assert_eq!(without_path.path().unwrap(), "test_repo/projectc.git");
    }

    #[test]
    fn test_annotation_helpers() {
        let manifest = Manifest::parse(SAMPLE).unwrap();

        let a = manifest.project_by_name("test_repo/projecta.git").unwrap();
        assert_eq!(a.alternative_master().unwrap().as_deref(), Some("master-v2"));
        assert_eq!(
            a.alternative_develop().unwrap().as_deref(),
            Some("develop-v2")
        );
        assert_eq!(a.lock_status().unwrap(), None);

        let b = manifest.project_by_name("test_repo/projectb.git").unwrap();
        assert_eq!(b.alternative_master().unwrap().as_deref(), Some("master-2"));
        assert_eq!(
            b.alternative_develop().unwrap().as_deref(),
            Some("develop-2")
        );

        let c = manifest.project_by_name("test_repo/projectc.git").unwrap();
        assert_eq!(c.lock_status().unwrap().as_deref(), Some("READ_ONLY"));
        assert_eq!(c.alternative_master().unwrap(), None);
    }

    #[test]
    fn test_remote_accessors() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let remote = manifest.remote_by_name("external").unwrap();
        assert_eq!(remote.name().unwrap(), "external");
        assert_eq!(remote.fetch().unwrap(), "ssh://git@team.example.com");
        assert_eq!(remote.review().unwrap(), None);
    }

    #[test]
    fn test_wrappers_share_node_state() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let one = manifest.project_by_name("test_repo/projecta.git").unwrap();
        let two = manifest.project_by_name("test_repo/projecta.git").unwrap();
        one.set_attr("groups", "changed").unwrap();
        assert_eq!(two.attr("groups").unwrap(), "changed");
    }

    #[test]
    fn test_removed_element_wrappers_go_dead() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let held = manifest.project_by_name("test_repo/projecta.git").unwrap();
        let other = manifest.project_by_name("test_repo/projecta.git").unwrap();
        held.remove().unwrap();

        // Both wrappers fail on any further access, including the one that
        // did not perform the removal
        assert!(matches!(
            held.attr("name").unwrap_err(),
            ManifestError::DetachedElement { .. }
        ));
        assert!(matches!(
            other.set_attr("name", "x").unwrap_err(),
            ManifestError::DetachedElement { .. }
        ));
        assert!(matches!(
            held.remove().unwrap_err(),
            ManifestError::DetachedElement { .. }
        ));
    }

    #[test]
    fn test_removing_root_element_fails() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let root = manifest.root();
        let err = root.remove().unwrap_err();
        assert!(matches!(err, ManifestError::DetachedElement { .. }));
    }

    #[test]
    fn test_removal_invalidates_descendant_wrappers() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();
        let annotation = project.child_elements("annotation").unwrap()[0];
        project.remove().unwrap();
        assert!(matches!(
            annotation.attr("name").unwrap_err(),
            ManifestError::DetachedElement { .. }
        ));
    }

    #[test]
    fn test_add_child_permissive_tag() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let project = manifest.project_by_name("test_repo/projecta.git").unwrap();
        let child = project
            .add_child("linkfile", &[("src", "a"), ("dest", "b")])
            .unwrap();
        assert_eq!(child.tag(), "linkfile");
        assert_eq!(child.attr("src").unwrap(), "a");
        assert_eq!(project.child_elements("linkfile").unwrap().len(), 1);
    }
}
