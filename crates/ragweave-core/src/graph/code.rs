//! Code knowledge graph: files, classes, functions, packages.

use std::sync::Arc;

use super::node::{ClassNode, CodeFileNode, FunctionNode, PackageNode};
use super::{
    require, CodeRelation, Direction, Domain, DomainGraph, GraphStore, NodeSchema, Relationship,
    Traversal, Typed,
};
use crate::error::Result;
use crate::models::Metadata;

pub struct CodeGraph {
    store: Arc<dyn GraphStore>,
}

impl DomainGraph for CodeGraph {
    const DOMAIN: Domain = Domain::Code;

    fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }
}

impl CodeGraph {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn create_code_file(&self, file: Typed<CodeFileNode>) -> Result<Typed<CodeFileNode>> {
        self.create(file).await
    }

    /// Create a class and link it `CONTAINS_CLASS` from its file.
    pub async fn create_class(&self, class: Typed<ClassNode>) -> Result<Typed<ClassNode>> {
        let file_id = class.attrs.file_id.clone();
        require::<CodeFileNode>(self.store(), &file_id).await?;
        let created = self.create(class).await?;
        self.store
            .create_relationship(CodeRelation::ContainsClass.into(), &file_id, &created.id, Metadata::new())
            .await?;
        Ok(created)
    }

    /// Create a function and link it `CONTAINS_FUNCTION` from its file.
    pub async fn create_function(&self, function: Typed<FunctionNode>) -> Result<Typed<FunctionNode>> {
        let file_id = function.attrs.file_id.clone();
        require::<CodeFileNode>(self.store(), &file_id).await?;
        if let Some(class_id) = &function.attrs.class_id {
            require::<ClassNode>(self.store(), class_id).await?;
        }
        let created = self.create(function).await?;
        self.store
            .create_relationship(CodeRelation::ContainsFunction.into(), &file_id, &created.id, Metadata::new())
            .await?;
        Ok(created)
    }

    pub async fn create_package(&self, package: Typed<PackageNode>) -> Result<Typed<PackageNode>> {
        self.create(package).await
    }

    /// Files of a project ordered by path.
    pub async fn list_files_by_project(&self, project_id: &str) -> Result<Vec<Typed<CodeFileNode>>> {
        let nodes = self
            .store
            .find_nodes(CodeFileNode::LABEL, "project_id", &project_id.into())
            .await?;
        let mut files = nodes
            .into_iter()
            .map(Typed::<CodeFileNode>::from_node)
            .collect::<Result<Vec<_>>>()?;
        files.sort_by(|a, b| a.attrs.file_path.cmp(&b.attrs.file_path));
        Ok(files)
    }

    pub async fn add_inheritance(&self, child_id: &str, parent_id: &str) -> Result<Relationship> {
        self.link::<ClassNode, ClassNode>(CodeRelation::Inherits, child_id, parent_id).await
    }

    pub async fn add_implementation(&self, class_id: &str, interface_id: &str) -> Result<Relationship> {
        self.link::<ClassNode, ClassNode>(CodeRelation::Implements, class_id, interface_id).await
    }

    pub async fn add_call(&self, caller_id: &str, callee_id: &str) -> Result<Relationship> {
        self.link::<FunctionNode, FunctionNode>(CodeRelation::Calls, caller_id, callee_id).await
    }

    pub async fn add_package_dependency(&self, package_id: &str, dependency_id: &str) -> Result<Relationship> {
        self.link::<PackageNode, PackageNode>(CodeRelation::DependsOn, package_id, dependency_id).await
    }

    /// A file importing a package.
    pub async fn add_import(&self, file_id: &str, package_id: &str) -> Result<Relationship> {
        self.link::<CodeFileNode, PackageNode>(CodeRelation::Imports, file_id, package_id).await
    }

    /// Classes reachable over `INHERITS|IMPLEMENTS` within three hops.
    pub async fn class_dependencies(&self, class_id: &str) -> Result<Vec<Typed<ClassNode>>> {
        require::<ClassNode>(self.store(), class_id).await?;
        let traversal = Traversal::new(
            class_id,
            vec![CodeRelation::Inherits.into(), CodeRelation::Implements.into()],
        )
        .direction(Direction::Outgoing)
        .depth(1, 3)
        .target(ClassNode::LABEL);
        self.store
            .traverse(&traversal)
            .await?
            .into_iter()
            .map(Typed::<ClassNode>::from_node)
            .collect()
    }

    /// Functions called by `function_id`, directly or transitively up to `depth`.
    pub async fn call_graph(&self, function_id: &str, depth: u32) -> Result<Vec<Typed<FunctionNode>>> {
        require::<FunctionNode>(self.store(), function_id).await?;
        let traversal = Traversal::new(function_id, vec![CodeRelation::Calls.into()])
            .depth(1, depth.max(1))
            .target(FunctionNode::LABEL);
        self.store
            .traverse(&traversal)
            .await?
            .into_iter()
            .map(Typed::<FunctionNode>::from_node)
            .collect()
    }

    async fn link<F: NodeSchema, T: NodeSchema>(
        &self,
        relation: CodeRelation,
        from_id: &str,
        to_id: &str,
    ) -> Result<Relationship> {
        require::<F>(self.store(), from_id).await?;
        require::<T>(self.store(), to_id).await?;
        self.store
            .merge_relationship(relation.into(), from_id, to_id, Metadata::new())
            .await
    }
}
