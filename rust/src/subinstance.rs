//! Per-target sub-problems: the dependency closure of one target.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::interner::FileId;
use crate::models::{Instance, ModelError, Time};

/// Collect `target` and everything it transitively depends on, dependencies
/// first, each file once.
///
/// A file reached through several paths (diamonds) keeps its first
/// position. The walk is iterative so arbitrarily long chains are fine.
pub fn dependency_closure(instance: &Instance, target: &str) -> Result<Vec<FileId>, ModelError> {
    let root = instance
        .lookup(target)
        .ok_or_else(|| ModelError::UnknownFile(target.to_string()))?;
    Ok(closure_of(instance, root))
}

fn closure_of(instance: &Instance, root: FileId) -> Vec<FileId> {
    let mut order = Vec::new();
    let mut emitted: FxHashSet<FileId> = FxHashSet::default();
    // (file, index of the next dependency to descend into)
    let mut stack: Vec<(FileId, usize)> = vec![(root, 0)];

    while let Some(top) = stack.last_mut() {
        let file = top.0;
        let deps = &instance.file(file).dependencies;
        if top.1 < deps.len() {
            let dep = deps[top.1];
            top.1 += 1;
            if !emitted.contains(&dep) {
                stack.push((dep, 0));
            }
            continue;
        }
        stack.pop();
        if emitted.insert(file) {
            order.push(file);
        }
    }

    order
}

/// The scheduling problem restricted to one target's closure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubInstance {
    target: FileId,
    files: Vec<FileId>,
    index: FxHashMap<FileId, usize>,
    nservers: usize,
}

impl SubInstance {
    /// Package a dependency-first closure for `target`.
    pub fn new(files: Vec<FileId>, target: FileId, nservers: usize) -> Self {
        let index = files
            .iter()
            .enumerate()
            .map(|(position, &file)| (file, position))
            .collect();
        Self {
            target,
            files,
            index,
            nservers,
        }
    }

    /// Build the sub-instance of the target named `target`.
    pub fn for_target(instance: &Instance, target: &str) -> Result<Self, ModelError> {
        let root = instance
            .lookup(target)
            .ok_or_else(|| ModelError::UnknownFile(target.to_string()))?;
        Ok(Self::for_target_id(instance, root))
    }

    pub fn for_target_id(instance: &Instance, target: FileId) -> Self {
        Self::new(closure_of(instance, target), target, instance.nservers())
    }

    pub fn target(&self) -> FileId {
        self.target
    }

    /// Files in dependency-first order; the target is last.
    pub fn files(&self) -> &[FileId] {
        &self.files
    }

    #[inline]
    pub fn contains(&self, file: FileId) -> bool {
        self.index.contains_key(&file)
    }

    #[inline]
    pub fn position(&self, file: FileId) -> Option<usize> {
        self.index.get(&file).copied()
    }

    pub fn nservers(&self) -> usize {
        self.nservers
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn deadline(&self, instance: &Instance) -> Result<Time, ModelError> {
        self.check_target(instance)?;
        instance
            .file(self.target)
            .deadline
            .ok_or_else(|| ModelError::NotATarget(instance.name(self.target).to_string()))
    }

    pub fn points(&self, instance: &Instance) -> Result<i64, ModelError> {
        self.deadline(instance)?;
        Ok(instance.file(self.target).points)
    }

    fn check_target(&self, instance: &Instance) -> Result<(), ModelError> {
        if self.contains(self.target) {
            Ok(())
        } else {
            Err(ModelError::TargetNotIndexed(
                instance.name(self.target).to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileDecl, TargetDecl};

    fn diamond() -> Instance {
        Instance::new(
            vec![
                FileDecl::new("root", 1, 1, &[]),
                FileDecl::new("left", 1, 1, &["root"]),
                FileDecl::new("right", 1, 1, &["root"]),
                FileDecl::new("top", 1, 1, &["left", "right"]),
                FileDecl::new("other", 1, 1, &[]),
            ],
            vec![TargetDecl::new("top", 20, 7)],
            2,
        )
        .unwrap()
    }

    fn names(instance: &Instance, ids: &[FileId]) -> Vec<String> {
        ids.iter().map(|&id| instance.name(id).to_string()).collect()
    }

    #[test]
    fn test_closure_is_dependency_first_without_duplicates() {
        let instance = diamond();
        let closure = dependency_closure(&instance, "top").unwrap();
        assert_eq!(names(&instance, &closure), vec!["root", "left", "right", "top"]);
    }

    #[test]
    fn test_closure_of_unknown_target_fails() {
        let instance = diamond();
        assert_eq!(
            dependency_closure(&instance, "nope").unwrap_err(),
            ModelError::UnknownFile("nope".into())
        );
    }

    #[test]
    fn test_sub_instance_indexing_and_accessors() {
        let instance = diamond();
        let sub = SubInstance::for_target(&instance, "top").unwrap();
        assert_eq!(sub.len(), 4);
        assert_eq!(sub.nservers(), 2);
        assert_eq!(*sub.files().last().unwrap(), sub.target());
        assert!(sub.contains(instance.lookup("left").unwrap()));
        assert!(!sub.contains(instance.lookup("other").unwrap()));
        assert_eq!(sub.position(instance.lookup("root").unwrap()), Some(0));
        assert_eq!(sub.deadline(&instance), Ok(20));
        assert_eq!(sub.points(&instance), Ok(7));
    }

    #[test]
    fn test_accessors_reject_non_targets_and_unindexed_targets() {
        let instance = diamond();
        let other = SubInstance::for_target(&instance, "other").unwrap();
        assert_eq!(other.deadline(&instance), Err(ModelError::NotATarget("other".into())));

        let top = instance.lookup("top").unwrap();
        let left = instance.lookup("left").unwrap();
        let broken = SubInstance::new(vec![left], top, 2);
        assert_eq!(broken.points(&instance), Err(ModelError::TargetNotIndexed("top".into())));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let depth = 50_000;
        let mut decls = vec![FileDecl::new("f0", 1, 0, &[])];
        for i in 1..depth {
            let prev = format!("f{}", i - 1);
            decls.push(FileDecl::new(&format!("f{}", i), 1, 0, &[prev.as_str()]));
        }
        let last = format!("f{}", depth - 1);
        let instance = Instance::new(decls, vec![TargetDecl::new(&last, 1, 1)], 1).unwrap();
        let closure = dependency_closure(&instance, &last).unwrap();
        assert_eq!(closure.len(), depth);
        assert_eq!(instance.name(closure[0]), "f0");
    }
}
