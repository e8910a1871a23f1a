//! The cluster tree and its nested-object text form.
//!
//! A node serialises to a JSON object with the fields `name`, `preview`,
//! `size`, `x`, `y`, `bounds` and `children`, in that order. Unset fields are
//! left out, and `children` only appears on internal nodes. Nesting is
//! indented by two spaces per level.

use crate::error::Result;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether a node has sub-clusters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Branch {
    #[default]
    Leaf,
    /// Never empty; see [`ClusterNode::set_children`].
    Internal(Vec<ClusterNode>),
}

/// One cluster of the output tree.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "RawNode")]
pub struct ClusterNode {
    pub name: Option<String>,
    /// Path to a representative image.
    pub preview: Option<String>,
    /// Number of original items below this node.
    pub size: Option<usize>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// `[x, y, width, height]`
    pub bounds: Option<[f64; 4]>,
    branch: Branch,
}

impl ClusterNode {
    pub fn new(name: Option<String>, preview: Option<String>, size: Option<usize>) -> Self {
        Self {
            name,
            preview,
            size,
            x: None,
            y: None,
            bounds: None,
            branch: Branch::Leaf,
        }
    }

    /// Leaf for one original item: named by the file's basename, previewed
    /// by the file itself.
    pub fn leaf_for(path: &str) -> Self {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        Self::new(Some(name), Some(path.to_string()), Some(1))
    }

    /// Attach the full ordered child list. An empty list leaves the node a leaf.
    pub fn set_children(&mut self, children: Vec<ClusterNode>) {
        self.branch = if children.is_empty() {
            Branch::Leaf
        } else {
            Branch::Internal(children)
        };
    }

    pub(crate) fn push_child(&mut self, child: ClusterNode) {
        match &mut self.branch {
            Branch::Internal(children) => children.push(child),
            Branch::Leaf => self.branch = Branch::Internal(vec![child]),
        }
    }

    pub fn with_children(mut self, children: Vec<ClusterNode>) -> Self {
        self.set_children(children);
        self
    }

    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    pub fn children(&self) -> &[ClusterNode] {
        match &self.branch {
            Branch::Leaf => &[],
            Branch::Internal(children) => children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.branch, Branch::Leaf)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Every leaf has size 1 and every internal node's size is the sum of
    /// its children's sizes.
    pub fn sizes_consistent(&self) -> bool {
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match &node.branch {
                Branch::Leaf => {
                    if node.size != Some(1) {
                        return false;
                    }
                }
                Branch::Internal(children) => {
                    let total: Option<usize> = children.iter().map(|c| c.size).sum();
                    if total != node.size {
                        return false;
                    }
                    pending.extend(children.iter());
                }
            }
        }
        true
    }

    /// Leaves in left-to-right order.
    pub fn leaves(&self) -> Vec<&ClusterNode> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match &node.branch {
                Branch::Leaf => out.push(node),
                Branch::Internal(children) => pending.extend(children.iter().rev()),
            }
        }
        out
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"  ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Write the serialised tree next to `path` and rename it into place,
    /// so a failed run never leaves a partial file behind.
    pub fn write_atomic<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let mut text = self.to_json_string()?;
        text.push('\n');
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        log::info!("wrote cluster tree to {}", path.display());
        Ok(())
    }
}

// Merge-history trees can be as deep as they are wide; unlink children
// iteratively so dropping them does not recurse per level.
impl Drop for ClusterNode {
    fn drop(&mut self) {
        if let Branch::Internal(children) = &mut self.branch {
            let mut pending = std::mem::take(children);
            while let Some(mut node) = pending.pop() {
                if let Branch::Internal(grand) = &mut node.branch {
                    pending.append(grand);
                }
            }
        }
    }
}

fn field<S: SerializeStruct, T: Serialize>(
    state: &mut S,
    key: &'static str,
    value: &Option<T>,
) -> std::result::Result<(), S::Error> {
    match value {
        Some(v) => state.serialize_field(key, v),
        None => state.skip_field(key),
    }
}

impl Serialize for ClusterNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ClusterNode", 7)?;
        field(&mut state, "name", &self.name)?;
        field(&mut state, "preview", &self.preview)?;
        field(&mut state, "size", &self.size)?;
        field(&mut state, "x", &self.x)?;
        field(&mut state, "y", &self.y)?;
        field(&mut state, "bounds", &self.bounds)?;
        match &self.branch {
            Branch::Internal(children) => state.serialize_field("children", children)?,
            Branch::Leaf => state.skip_field("children")?,
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct RawNode {
    name: Option<String>,
    preview: Option<String>,
    size: Option<usize>,
    x: Option<f64>,
    y: Option<f64>,
    bounds: Option<[f64; 4]>,
    children: Option<Vec<ClusterNode>>,
}

impl From<RawNode> for ClusterNode {
    fn from(raw: RawNode) -> Self {
        let mut node = ClusterNode {
            name: raw.name,
            preview: raw.preview,
            size: raw.size,
            x: raw.x,
            y: raw.y,
            bounds: raw.bounds,
            branch: Branch::Leaf,
        };
        node.set_children(raw.children.unwrap_or_default());
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClusterNode {
        ClusterNode::new(Some("cluster 0".into()), Some("c/mean-0.png".into()), Some(2))
            .with_children(vec![
                ClusterNode::leaf_for("images/a.JPEG"),
                ClusterNode::leaf_for("images/b.JPEG"),
            ])
    }

    #[test]
    fn test_serialized_layout() {
        let expected = r#"{
  "name": "cluster 0",
  "preview": "c/mean-0.png",
  "size": 2,
  "children": [
    {
      "name": "a.JPEG",
      "preview": "images/a.JPEG",
      "size": 1
    },
    {
      "name": "b.JPEG",
      "preview": "images/b.JPEG",
      "size": 1
    }
  ]
}"#;
        assert_eq!(sample().to_json_string().unwrap(), expected);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let node = ClusterNode::new(None, None, Some(3));
        assert_eq!(node.to_json_string().unwrap(), "{\n  \"size\": 3\n}");
        assert_eq!(ClusterNode::default().to_json_string().unwrap(), "{}");
    }

    #[test]
    fn test_spatial_fields_before_children() {
        let mut node = sample();
        node.x = Some(1.5);
        node.bounds = Some([0.0, 0.0, 2.0, 3.0]);
        let text = node.to_json_string().unwrap();
        let x = text.find("\"x\"").unwrap();
        let bounds = text.find("\"bounds\"").unwrap();
        let children = text.find("\"children\"").unwrap();
        assert!(text.find("\"size\"").unwrap() < x);
        assert!(x < bounds && bounds < children);
        assert!(!text.contains("\"y\""));
    }

    #[test]
    fn test_empty_children_serialize_as_leaf() {
        let plain = ClusterNode::new(Some("n".into()), None, Some(1));
        let emptied = plain.clone().with_children(Vec::new());
        assert!(emptied.is_leaf());
        assert_eq!(
            plain.to_json_string().unwrap(),
            emptied.to_json_string().unwrap()
        );
        assert!(!emptied.to_json_string().unwrap().contains("children"));
    }

    #[test]
    fn test_output_is_well_formed_and_deterministic() {
        let tree = ClusterNode::new(Some("root".into()), None, Some(3)).with_children(vec![
            sample(),
            ClusterNode::leaf_for("images/c \"quoted\".JPEG"),
        ]);
        let first = tree.to_json_string().unwrap();
        assert_eq!(first, tree.to_json_string().unwrap());

        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["children"].as_array().unwrap().len(), 2);
        assert_eq!(value["children"][0]["children"][1]["name"], "b.JPEG");
        assert_eq!(value["children"][1]["name"], "c \"quoted\".JPEG");
    }

    #[test]
    fn test_from_json_restores_tree() {
        let tree = sample();
        let back = ClusterNode::from_json(&tree.to_json_string().unwrap()).unwrap();
        assert_eq!(back, tree);

        let with_empty = ClusterNode::from_json(r#"{"name": "x", "children": []}"#).unwrap();
        assert!(with_empty.is_leaf());
    }

    #[test]
    fn test_size_invariants() {
        let tree = sample();
        assert!(tree.sizes_consistent());
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.leaves().len(), 2);

        let mut broken = tree.clone();
        broken.size = Some(5);
        assert!(!broken.sizes_consistent());
    }

    #[test]
    fn test_deep_chain_traverses_and_drops() {
        let mut tree = ClusterNode::leaf_for("img/0.png");
        for i in 1..50_000 {
            tree = ClusterNode::new(None, None, Some(i + 1))
                .with_children(vec![tree, ClusterNode::leaf_for(&format!("img/{}.png", i))]);
        }
        assert_eq!(tree.leaf_count(), 50_000);
        assert!(tree.sizes_consistent());
        assert_eq!(tree.leaves()[0].name.as_deref(), Some("0.png"));
        drop(tree);
    }

    #[test]
    fn test_write_atomic() {
        let dir = std::env::temp_dir().join(format!("ict_tree_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tree.json");
        sample().write_atomic(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(!dir.join("tree.json.tmp").exists());
        assert_eq!(ClusterNode::from_json(&text).unwrap(), sample());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
