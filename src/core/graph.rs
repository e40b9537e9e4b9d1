//! The stack's resource graph.
//!
//! Holds declarations in declaration order and derives edges from the tokens
//! inside them. Topological order uses Kahn's algorithm with alphabetical
//! tie-breaking so the order is deterministic.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use super::types::{ConstructId, Declaration, ResourceKind};

/// Errors raised while declaring or ordering constructs.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("construct id must not be empty")]
    EmptyConstructId,

    #[error("construct id '{0}' must not contain '/'")]
    InvalidConstructId(String),

    #[error("construct '{0}' is already declared in this stack")]
    DuplicateConstruct(String),

    #[error("construct '{0}' is not declared in this stack")]
    UnknownConstruct(String),

    #[error("construct '{id}' is a {actual}, expected a {expected}")]
    KindMismatch {
        id: String,
        expected: ResourceKind,
        actual: ResourceKind,
    },

    #[error("'{from}' references unknown construct '{to}'")]
    DanglingReference { from: String, to: String },

    #[error("dependency cycle detected involving: {0}")]
    Cycle(String),
}

/// A directed edge: `from` needs `to` to exist first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub from: String,
    pub to: String,
}

/// A named collection of declarations synthesized and deployed as a unit.
#[derive(Debug, Clone)]
pub struct Stack {
    id: ConstructId,
    description: Option<String>,
    resources: IndexMap<String, Declaration>,
}

impl Stack {
    pub fn new(id: ConstructId) -> Self {
        Self {
            id,
            description: None,
            resources: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &ConstructId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Add a declaration. A logical id that is already present is rejected;
    /// the existing declaration is left untouched.
    pub fn insert(&mut self, decl: Declaration) -> Result<(), StackError> {
        if self.resources.contains_key(&decl.logical_id) {
            return Err(StackError::DuplicateConstruct(decl.path));
        }
        self.resources.insert(decl.logical_id.clone(), decl);
        Ok(())
    }

    pub fn get(&self, logical_id: &str) -> Option<&Declaration> {
        self.resources.get(logical_id)
    }

    pub(crate) fn get_mut(&mut self, logical_id: &str) -> Option<&mut Declaration> {
        self.resources.get_mut(logical_id)
    }

    /// Look up a declaration and check its kind.
    pub fn expect_kind(
        &self,
        logical_id: &str,
        expected: ResourceKind,
    ) -> Result<&Declaration, StackError> {
        let decl = self
            .get(logical_id)
            .ok_or_else(|| StackError::UnknownConstruct(logical_id.to_string()))?;
        if decl.kind() != expected {
            return Err(StackError::KindMismatch {
                id: logical_id.to_string(),
                expected,
                actual: decl.kind(),
            });
        }
        Ok(decl)
    }

    /// Declarations in declaration order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Declarations of one kind, in declaration order.
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Declaration> {
        self.resources.values().filter(move |d| d.kind() == kind)
    }

    /// All edges found in declaration tokens, including dangling ones.
    pub fn references(&self) -> Vec<Reference> {
        self.resources
            .values()
            .flat_map(|decl| {
                decl.dependencies().into_iter().map(|to| Reference {
                    from: decl.logical_id.clone(),
                    to,
                })
            })
            .collect()
    }

    /// Topological order of logical ids (dependencies first).
    pub fn execution_order(&self) -> Result<Vec<String>, StackError> {
        let references = self.references();
        if let Some(r) = references.iter().find(|r| !self.resources.contains_key(&r.to)) {
            return Err(StackError::DanglingReference {
                from: r.from.clone(),
                to: r.to.clone(),
            });
        }
        self.topo_sort(&references)
    }

    /// Members of a dependency cycle among the edges that resolve, if any.
    /// Dangling edges are ignored, so a cycle is found even when other
    /// references point at undeclared constructs.
    pub fn cycle(&self) -> Option<String> {
        match self.topo_sort(&self.references()) {
            Err(StackError::Cycle(members)) => Some(members),
            _ => None,
        }
    }

    /// Kahn's algorithm over `references`, skipping edges whose ends are not
    /// declared.
    fn topo_sort(&self, references: &[Reference]) -> Result<Vec<String>, StackError> {
        let ids: Vec<&String> = self.resources.keys().collect();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

        for id in &ids {
            in_degree.insert(id.as_str(), 0);
            adjacency.insert(id.as_str(), Vec::new());
        }

        for r in references {
            let Some((to, _)) = self.resources.get_key_value(&r.to) else {
                continue;
            };
            let Some((from, _)) = self.resources.get_key_value(&r.from) else {
                continue;
            };
            if let Some(next) = adjacency.get_mut(to.as_str()) {
                next.push(from.as_str());
            }
            if let Some(d) = in_degree.get_mut(from.as_str()) {
                *d += 1;
            }
        }

        let mut zero_degree: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| *id)
            .collect();
        zero_degree.sort_unstable();
        let mut queue: VecDeque<&str> = zero_degree.into_iter().collect();

        let mut order = Vec::with_capacity(ids.len());
        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());

            let mut next_ready: Vec<&str> = Vec::new();
            if let Some(neighbors) = adjacency.get(current) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            next_ready.push(neighbor);
                        }
                    }
                }
            }
            next_ready.sort_unstable();
            queue.extend(next_ready);
        }

        if order.len() != ids.len() {
            let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
            let mut members: Vec<&str> = ids
                .iter()
                .map(|s| s.as_str())
                .filter(|id| !ordered.contains(id))
                .collect();
            members.sort_unstable();
            return Err(StackError::Cycle(members.join(", ")));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BucketSpec, FrontDoorSpec, ResourceSpec, Value};

    fn bucket(id: &str) -> Declaration {
        Declaration {
            path: format!("{id}-path"),
            logical_id: id.to_string(),
            spec: ResourceSpec::Bucket(BucketSpec {
                bucket_name: id.to_lowercase(),
            }),
        }
    }

    fn front_door(id: &str, backend: &str) -> Declaration {
        Declaration {
            path: format!("{id}-path"),
            logical_id: id.to_string(),
            spec: ResourceSpec::FrontDoor(FrontDoorSpec {
                api_name: id.to_string(),
                backend: Value::GetAtt(backend.to_string(), "Arn"),
                stage_name: "prod".to_string(),
            }),
        }
    }

    fn stack() -> Stack {
        Stack::new(ConstructId::new("T").unwrap())
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut s = stack();
        s.insert(bucket("B")).unwrap();
        let mut dup = bucket("B");
        if let ResourceSpec::Bucket(ref mut b) = dup.spec {
            b.bucket_name = "changed".into();
        }
        assert!(matches!(s.insert(dup), Err(StackError::DuplicateConstruct(_))));
        // First declaration unchanged.
        match &s.get("B").unwrap().spec {
            ResourceSpec::Bucket(b) => assert_eq!(b.bucket_name, "b"),
            other => panic!("unexpected spec {other:?}"),
        }
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_expect_kind() {
        let mut s = stack();
        s.insert(bucket("B")).unwrap();
        assert!(s.expect_kind("B", ResourceKind::Bucket).is_ok());
        assert!(matches!(
            s.expect_kind("B", ResourceKind::Function),
            Err(StackError::KindMismatch { .. })
        ));
        assert!(matches!(
            s.expect_kind("Z", ResourceKind::Bucket),
            Err(StackError::UnknownConstruct(_))
        ));
    }

    #[test]
    fn test_order_dependencies_first() {
        let mut s = stack();
        s.insert(front_door("A", "Z")).unwrap();
        s.insert(bucket("Z")).unwrap();
        assert_eq!(s.execution_order().unwrap(), vec!["Z", "A"]);
    }

    #[test]
    fn test_order_alphabetical_tie_break() {
        let mut s = stack();
        s.insert(bucket("beta")).unwrap();
        s.insert(bucket("alpha")).unwrap();
        assert_eq!(s.execution_order().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_order_dangling_reference() {
        let mut s = stack();
        s.insert(front_door("A", "ghost")).unwrap();
        assert!(matches!(
            s.execution_order(),
            Err(StackError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_order_cycle() {
        let mut s = stack();
        s.insert(front_door("A", "B")).unwrap();
        s.insert(front_door("B", "A")).unwrap();
        s.insert(bucket("C")).unwrap();
        match s.execution_order() {
            Err(StackError::Cycle(members)) => assert_eq!(members, "A, B"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_found_next_to_dangling_reference() {
        let mut s = stack();
        s.insert(front_door("A", "B")).unwrap();
        s.insert(front_door("B", "A")).unwrap();
        s.insert(front_door("C", "Ghost")).unwrap();
        assert!(matches!(
            s.execution_order(),
            Err(StackError::DanglingReference { .. })
        ));
        assert_eq!(s.cycle().as_deref(), Some("A, B"));
    }

    #[test]
    fn test_no_cycle() {
        let mut s = stack();
        s.insert(bucket("B")).unwrap();
        s.insert(front_door("F", "B")).unwrap();
        assert_eq!(s.cycle(), None);
    }

    #[test]
    fn test_references() {
        let mut s = stack();
        s.insert(bucket("Z")).unwrap();
        s.insert(front_door("A", "Z")).unwrap();
        assert_eq!(
            s.references(),
            vec![Reference {
                from: "A".into(),
                to: "Z".into()
            }]
        );
    }
}
