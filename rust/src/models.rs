//! Core data types for the build farm: files, targets and the loaded instance.

use std::collections::VecDeque;

use thiserror::Error;

use crate::interner::{FileId, FileIdInterner};

/// Simulated time, in the same integer units as compile and replicate times.
pub type Time = i64;

/// Index of a server in `[0, nservers)`.
pub type ServerId = usize;

/// Largest server pool an instance may declare.
pub const MAX_SERVERS: usize = 100;

/// Errors raised while building or querying an instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Duplicate file name: {0}")]
    DuplicateFile(String),
    #[error("File {file} depends on unknown file {dependency}")]
    UnknownDependency { file: String, dependency: String },
    #[error("File {0} depends on itself")]
    SelfDependency(String),
    #[error("Circular dependency detected among {0} files")]
    CircularDependency(usize),
    #[error("File {0} has a negative compile or replicate time")]
    NegativeTime(String),
    #[error("Unknown file: {0}")]
    UnknownFile(String),
    #[error("File {0} is not a target")]
    NotATarget(String),
    #[error("Target {0} is not indexed by this sub-instance")]
    TargetNotIndexed(String),
    #[error("Server count {0} is outside [1, {max}]", max = MAX_SERVERS)]
    InvalidServerCount(usize),
}

/// A file as declared in the input, with dependencies still named.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDecl {
    pub name: String,
    pub ctime: Time,
    pub rtime: Time,
    pub dependencies: Vec<String>,
}

impl FileDecl {
    pub fn new(name: &str, ctime: Time, rtime: Time, dependencies: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            ctime,
            rtime,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// A target declaration: which file is scored, by when, and for how much.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetDecl {
    pub name: String,
    pub deadline: Time,
    pub points: i64,
}

impl TargetDecl {
    pub fn new(name: &str, deadline: Time, points: i64) -> Self {
        Self {
            name: name.to_string(),
            deadline,
            points,
        }
    }
}

/// A compilable file with resolved dependencies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFile {
    pub name: String,
    pub ctime: Time,
    pub rtime: Time,
    pub dependencies: Vec<FileId>,
    /// `None` unless the file is a target.
    pub deadline: Option<Time>,
    /// 0 unless the file is a target.
    pub points: i64,
}

impl CompiledFile {
    pub fn is_target(&self) -> bool {
        self.deadline.is_some()
    }

    /// Score earned if this file becomes available at `completion`.
    ///
    /// Non-targets and late targets earn nothing.
    pub fn score_at(&self, completion: Time) -> i64 {
        match self.deadline {
            Some(deadline) if self.points > 0 && completion <= deadline => {
                (deadline - completion).saturating_add(self.points)
            }
            _ => 0,
        }
    }
}

/// An immutable scheduling problem: files, targets and the server pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    files: Vec<CompiledFile>,
    names: FileIdInterner,
    targets: Vec<FileId>,
    nservers: usize,
}

impl Instance {
    /// Resolve and validate a set of declarations.
    ///
    /// Dependencies may reference files declared later. A file named by
    /// several target records keeps the last deadline and points and its
    /// first position in `targets`. Fails on duplicate names, unknown or
    /// self references, cycles, unknown targets, negative times and server
    /// counts outside `[1, 100]`.
    pub fn new(
        decls: Vec<FileDecl>,
        targets: Vec<TargetDecl>,
        nservers: usize,
    ) -> Result<Self, ModelError> {
        if nservers == 0 || nservers > MAX_SERVERS {
            return Err(ModelError::InvalidServerCount(nservers));
        }

        let mut names = FileIdInterner::with_capacity(decls.len());
        for decl in &decls {
            if !names.intern(&decl.name).1 {
                return Err(ModelError::DuplicateFile(decl.name.clone()));
            }
            if decl.ctime < 0 || decl.rtime < 0 {
                return Err(ModelError::NegativeTime(decl.name.clone()));
            }
        }

        let mut files = Vec::with_capacity(decls.len());
        for decl in decls {
            let mut dependencies = Vec::with_capacity(decl.dependencies.len());
            for dep in &decl.dependencies {
                if *dep == decl.name {
                    return Err(ModelError::SelfDependency(decl.name));
                }
                let id = names
                    .get(dep)
                    .ok_or_else(|| ModelError::UnknownDependency {
                        file: decl.name.clone(),
                        dependency: dep.clone(),
                    })?;
                dependencies.push(id);
            }
            files.push(CompiledFile {
                name: decl.name,
                ctime: decl.ctime,
                rtime: decl.rtime,
                dependencies,
                deadline: None,
                points: 0,
            });
        }

        let mut target_ids = Vec::with_capacity(targets.len());
        for target in targets {
            let id = names
                .get(&target.name)
                .ok_or_else(|| ModelError::UnknownFile(target.name.clone()))?;
            let file = &mut files[id as usize];
            if !file.is_target() {
                target_ids.push(id);
            }
            file.deadline = Some(target.deadline);
            file.points = target.points;
        }

        let instance = Self {
            files,
            names,
            targets: target_ids,
            nservers,
        };
        instance.check_acyclic()?;
        Ok(instance)
    }

    /// Kahn's algorithm over the dependency graph; leftovers mean a cycle.
    fn check_acyclic(&self) -> Result<(), ModelError> {
        let mut pending: Vec<usize> = self.files.iter().map(|f| f.dependencies.len()).collect();
        let mut dependents: Vec<Vec<FileId>> = vec![Vec::new(); self.files.len()];
        for (id, file) in self.files.iter().enumerate() {
            for &dep in &file.dependencies {
                dependents[dep as usize].push(id as FileId);
            }
        }

        let mut queue: VecDeque<FileId> = pending
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(id, _)| id as FileId)
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            for &dependent in &dependents[id as usize] {
                let count = &mut pending[dependent as usize];
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if visited != self.files.len() {
            return Err(ModelError::CircularDependency(self.files.len() - visited));
        }
        Ok(())
    }

    #[inline]
    pub fn file(&self, id: FileId) -> &CompiledFile {
        &self.files[id as usize]
    }

    pub fn files(&self) -> &[CompiledFile] {
        &self.files
    }

    #[inline]
    pub fn lookup(&self, name: &str) -> Option<FileId> {
        self.names.get(name)
    }

    /// Name of a file, for I/O and diagnostics.
    #[inline]
    pub fn name(&self, id: FileId) -> &str {
        &self.files[id as usize].name
    }

    pub fn targets(&self) -> &[FileId] {
        &self.targets
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
}
