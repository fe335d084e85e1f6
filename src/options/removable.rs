// ABOUTME: Differential add/remove computation for cluster-backed options.
// ABOUTME: Structured paths into inspect documents and identity-based set subtraction.

/// One segment of a structured path into an inspect document. `Any` fans out
/// over every element of a list node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSeg {
    Key(&'static str),
    Any,
}

/// Collect every node addressed by `path`, fanning out at `Any` segments.
/// Missing keys yield no nodes rather than an error.
pub fn collect_path<'a>(
    doc: &'a serde_json::Value,
    path: &[PathSeg],
) -> Vec<&'a serde_json::Value> {
    let mut nodes = vec![doc];
    for seg in path {
        let mut next = Vec::new();
        for node in nodes {
            match seg {
                PathSeg::Key(key) => {
                    if let Some(child) = node.get(key) {
                        next.push(child);
                    }
                }
                PathSeg::Any => {
                    if let Some(items) = node.as_array() {
                        next.extend(items.iter());
                    }
                }
            }
        }
        nodes = next;
    }
    nodes
}

/// Diff behavior of one removable option.
///
/// The live spec and the desired spec can shape the same logical value
/// differently (a published port reported as `source:target/protocol`, an
/// env entry removed by bare key), so each removable option carries its own
/// normalization:
/// - `live_entries` extracts comparable entries from the nodes `path`
///   addresses in the inspect document;
/// - `add_identity` / `remove_identity` reduce one entry to the identities
///   used for set subtraction (a port range enumerates to many).
#[derive(Clone, Debug)]
pub struct RemovableDef {
    pub path: &'static [PathSeg],
    pub force_add: bool,
    pub force_remove: bool,
    pub add_identity: fn(&str) -> Vec<String>,
    pub remove_identity: fn(&str) -> Vec<String>,
    pub live_entries: fn(&serde_json::Value) -> Vec<String>,
}

impl RemovableDef {
    pub fn new(path: &'static [PathSeg]) -> Self {
        Self {
            path,
            force_add: false,
            force_remove: false,
            add_identity: identity,
            remove_identity: identity,
            live_entries: string_entries,
        }
    }

    pub fn force_add(mut self) -> Self {
        self.force_add = true;
        self
    }

    pub fn force_remove(mut self) -> Self {
        self.force_remove = true;
        self
    }

    pub fn add_identity(mut self, f: fn(&str) -> Vec<String>) -> Self {
        self.add_identity = f;
        self
    }

    pub fn remove_identity(mut self, f: fn(&str) -> Vec<String>) -> Self {
        self.remove_identity = f;
        self
    }

    pub fn live_entries(mut self, f: fn(&serde_json::Value) -> Vec<String>) -> Self {
        self.live_entries = f;
        self
    }

    /// Extract the live entries for this option from an inspect document.
    pub fn collect_live(&self, doc: &serde_json::Value) -> Vec<String> {
        collect_path(doc, self.path)
            .into_iter()
            .flat_map(|node| (self.live_entries)(node))
            .collect()
    }
}

fn identity(entry: &str) -> Vec<String> {
    vec![entry.to_string()]
}

fn string_entries(node: &serde_json::Value) -> Vec<String> {
    match node {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => vec![],
    }
}

/// Values to add and identities to remove for one differential update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovableDiff {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl RemovableDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Compute the differential update for one removable option.
///
/// Adds are the desired values not already present in the live spec (all of
/// them under force-add); removals are the live identities no desired value
/// covers (all of them under force-remove). Both preserve original relative
/// order.
pub fn diff(desired: &[String], live: &[String], def: &RemovableDef) -> RemovableDiff {
    let live_identities: Vec<String> = live
        .iter()
        .flat_map(|entry| (def.add_identity)(entry))
        .collect();

    let add: Vec<String> = desired
        .iter()
        .filter(|entry| {
            def.force_add
                || (def.add_identity)(entry)
                    .iter()
                    .any(|id| !live_identities.contains(id))
        })
        .cloned()
        .collect();

    let desired_identities: Vec<String> = desired
        .iter()
        .flat_map(|entry| (def.remove_identity)(entry))
        .collect();

    let mut remove = Vec::new();
    for entry in live {
        for id in (def.remove_identity)(entry) {
            if (def.force_remove || !desired_identities.contains(&id)) && !remove.contains(&id) {
                remove.push(id);
            }
        }
    }

    RemovableDiff { add, remove }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_diff_adds_new_and_removes_stale() {
        let def = RemovableDef::new(&[]);
        let diff = diff(
            &["B".to_string(), "C".to_string()],
            &["A".to_string(), "B".to_string()],
            &def,
        );
        assert_eq!(diff.add, ["C"]);
        assert_eq!(diff.remove, ["A"]);
    }

    #[test]
    fn force_add_includes_everything_desired() {
        let def = RemovableDef::new(&[]).force_add();
        let diff = diff(
            &["B".to_string(), "C".to_string()],
            &["A".to_string(), "B".to_string()],
            &def,
        );
        assert_eq!(diff.add, ["B", "C"]);
    }

    #[test]
    fn wildcard_path_fans_out_over_lists() {
        let doc = json!({
            "Spec": {
                "Ports": [
                    {"TargetPort": "80"},
                    {"TargetPort": "443"}
                ]
            }
        });
        let path = [
            PathSeg::Key("Spec"),
            PathSeg::Key("Ports"),
            PathSeg::Any,
            PathSeg::Key("TargetPort"),
        ];
        let nodes = collect_path(&doc, &path);
        let values: Vec<_> = nodes.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(values, ["80", "443"]);
    }

    #[test]
    fn missing_path_yields_no_nodes() {
        let doc = json!({"Spec": {}});
        let path = [PathSeg::Key("Spec"), PathSeg::Key("Ports"), PathSeg::Any];
        assert!(collect_path(&doc, &path).is_empty());
    }
}
